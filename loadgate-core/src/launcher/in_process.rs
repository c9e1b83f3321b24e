use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use loadgate_http::HttpClient;

use crate::aggregator::WorkerAssignment;
use crate::config::RunConfiguration;
use crate::error::Result;
use crate::worker::{ReportFn, WorkerPlan, http_request_fn, run_worker};

use super::{EventSender, WorkerEventKind, WorkerHandle, WorkerLauncher, send_event};

/// Resolves when the worker should stop issuing requests.
pub type StopSignal = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

pub type WorkerFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Runs each worker as a tokio task inside the current process.
///
/// The factory receives the assignment, the function its messages must be reported through,
/// and the stop signal. Returning without a `Terminal` message looks like a crash to the
/// aggregator. `kill` drops the worker future.
pub struct InProcessLauncher<F> {
    factory: F,
}

impl<F, Fut> InProcessLauncher<F>
where
    F: Fn(WorkerAssignment, ReportFn, StopSignal) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    pub fn new(factory: F) -> Self {
        Self { factory }
    }
}

/// Real HTTP workers sharing one connection pool.
pub fn http_in_process_launcher(
    config: &RunConfiguration,
) -> InProcessLauncher<
    impl Fn(WorkerAssignment, ReportFn, StopSignal) -> WorkerFuture + Send + Sync + use<>,
> {
    let client = HttpClient::default();
    let plan = config.worker_plan();
    let base_url: Arc<str> = config.target_base_url.as_str().into();
    let headers: Arc<[(String, String)]> = config.headers.clone().into();

    InProcessLauncher::new(
        move |assignment: WorkerAssignment, report: ReportFn, stop: StopSignal| {
            let issue = http_request_fn(client.clone(), base_url.clone(), headers.clone());
            let plan: WorkerPlan = plan.clone();
            Box::pin(async move {
                run_worker(assignment, plan, issue, report, stop).await;
            }) as WorkerFuture
        },
    )
}

impl<F, Fut> WorkerLauncher for InProcessLauncher<F>
where
    F: Fn(WorkerAssignment, ReportFn, StopSignal) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn launch(&self, assignment: WorkerAssignment, events: EventSender) -> Result<WorkerHandle> {
        let worker_id = assignment.worker_id;
        let (handle, control) = WorkerHandle::new(worker_id);

        let report_events = events.clone();
        let report: ReportFn = Arc::new(move |msg| {
            send_event(&report_events, worker_id, WorkerEventKind::Message(msg));
        });

        let stop_rx = control.stop;
        let stop: StopSignal = Box::pin(async move {
            let _ = stop_rx.await;
        });

        let run = (self.factory)(assignment, report, stop);
        let kill = control.kill;
        tokio::spawn(async move {
            let code = tokio::select! {
                _ = run => Some(0),
                Ok(()) = kill => {
                    tracing::debug!(worker_id, "in-process worker killed");
                    None
                }
            };
            send_event(&events, worker_id, WorkerEventKind::Exited { code });
        });

        Ok(handle)
    }
}
