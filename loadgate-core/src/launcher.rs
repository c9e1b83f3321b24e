use tokio::sync::{mpsc, oneshot};

use crate::aggregator::WorkerAssignment;
use crate::error::Result;
use crate::ipc::WorkerMessage;

mod in_process;
mod process;

pub use in_process::{InProcessLauncher, StopSignal, WorkerFuture, http_in_process_launcher};
pub use process::ProcessLauncher;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEventKind {
    Message(WorkerMessage),
    /// A line that could not be decoded as a [`WorkerMessage`].
    Corrupt(String),
    /// Always the last event of a worker. `None` when killed by a signal or aborted.
    Exited { code: Option<i32> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerEvent {
    pub worker_id: u32,
    pub kind: WorkerEventKind,
}

pub type EventSender = mpsc::UnboundedSender<WorkerEvent>;

/// Starts one worker whose events are delivered on `events`.
pub trait WorkerLauncher: Send + Sync {
    fn launch(&self, assignment: WorkerAssignment, events: EventSender) -> Result<WorkerHandle>;
}

impl<L: WorkerLauncher + ?Sized> WorkerLauncher for std::sync::Arc<L> {
    fn launch(&self, assignment: WorkerAssignment, events: EventSender) -> Result<WorkerHandle> {
        (**self).launch(assignment, events)
    }
}

/// The aggregator's side of a running worker.
#[derive(Debug)]
pub struct WorkerHandle {
    worker_id: u32,
    stop: Option<oneshot::Sender<()>>,
    kill: Option<oneshot::Sender<()>>,
}

/// The launcher's side of a running worker.
#[derive(Debug)]
pub struct WorkerControl {
    pub stop: oneshot::Receiver<()>,
    pub kill: oneshot::Receiver<()>,
}

impl WorkerHandle {
    pub fn new(worker_id: u32) -> (Self, WorkerControl) {
        let (stop_tx, stop_rx) = oneshot::channel();
        let (kill_tx, kill_rx) = oneshot::channel();
        (
            Self {
                worker_id,
                stop: Some(stop_tx),
                kill: Some(kill_tx),
            },
            WorkerControl {
                stop: stop_rx,
                kill: kill_rx,
            },
        )
    }

    pub fn worker_id(&self) -> u32 {
        self.worker_id
    }

    /// Asks the worker to stop issuing requests. Returns false if already asked.
    pub fn request_stop(&mut self) -> bool {
        match self.stop.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }

    /// Terminates the worker without waiting for its terminal report.
    pub fn kill(&mut self) -> bool {
        match self.kill.take() {
            Some(tx) => {
                let _ = tx.send(());
                true
            }
            None => false,
        }
    }
}

pub(crate) fn send_event(events: &EventSender, worker_id: u32, kind: WorkerEventKind) {
    if events.send(WorkerEvent { worker_id, kind }).is_err() {
        tracing::debug!(worker_id, "aggregator is gone; dropping worker event");
    }
}
