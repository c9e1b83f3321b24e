use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::RunConfiguration;
use crate::error::Result;
use crate::ipc::WorkerMessage;
use crate::launcher::{WorkerEvent, WorkerEventKind, WorkerHandle, WorkerLauncher};
use crate::metrics::AggregateMetrics;

mod partition;
mod progress;
mod table;

pub use partition::{WorkerAssignment, partition};
pub use progress::{ProgressFn, ProgressUpdate};
pub use table::{Rejection, SnapshotTable, Totals};

use progress::ProgressTracker;
use table::ExitState;

/// Timing knobs of the control loop.
#[derive(Debug, Clone, Copy)]
pub struct AggregatorOptions {
    /// How often a [`ProgressUpdate`] is emitted.
    pub progress_interval: Duration,
    /// After the run timeout, how long a stopping worker may keep draining before it is killed.
    pub stop_grace: Duration,
    /// How long a killed worker may take to exit before it is abandoned.
    pub kill_grace: Duration,
    /// How long a worker may linger after its terminal report before it is killed.
    pub exit_grace: Duration,
    pub housekeeping_interval: Duration,
}

impl Default for AggregatorOptions {
    fn default() -> Self {
        Self {
            progress_interval: Duration::from_secs(1),
            stop_grace: Duration::from_secs(5),
            kill_grace: Duration::from_secs(5),
            exit_grace: Duration::from_secs(5),
            housekeeping_interval: Duration::from_millis(100),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running,
    /// Sent its terminal report; waiting for the process to exit.
    Reported { since: Instant },
    Stopping { since: Instant },
    Killing { since: Instant },
    Done,
}

struct Supervised {
    handle: WorkerHandle,
    phase: Phase,
}

/// Launches the workers of one run and merges their reports into [`AggregateMetrics`].
pub struct Aggregator<L> {
    config: Arc<RunConfiguration>,
    launcher: L,
    options: AggregatorOptions,
    progress: Option<ProgressFn>,
}

impl<L: WorkerLauncher> Aggregator<L> {
    pub fn new(config: Arc<RunConfiguration>, launcher: L) -> Self {
        Self {
            config,
            launcher,
            options: AggregatorOptions::default(),
            progress: None,
        }
    }

    #[must_use]
    pub fn with_options(mut self, options: AggregatorOptions) -> Self {
        self.options = options;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs every worker to completion (or escalation) and returns the frozen metrics.
    ///
    /// Fails only when the configuration is invalid or a worker cannot be launched; in the
    /// latter case every worker launched so far is killed first.
    pub async fn run(self) -> Result<AggregateMetrics> {
        self.config.validate()?;

        let assignments = self.config.assignments();
        let mut table = SnapshotTable::new(&assignments);
        let (tx, mut rx) = mpsc::unbounded_channel::<WorkerEvent>();

        let started = Instant::now();
        let deadline = started + self.config.run_timeout;

        let mut workers: BTreeMap<u32, Supervised> = BTreeMap::new();
        for assignment in assignments {
            let worker_id = assignment.worker_id;
            match self.launcher.launch(assignment, tx.clone()) {
                Ok(handle) => {
                    workers.insert(
                        worker_id,
                        Supervised {
                            handle,
                            phase: Phase::Running,
                        },
                    );
                }
                Err(err) => {
                    tracing::error!(worker_id, "failed to launch worker: {err}");
                    for w in workers.values_mut() {
                        w.handle.kill();
                    }
                    return Err(err);
                }
            }
        }
        drop(tx);

        tracing::info!(
            workers = workers.len(),
            requests = self.config.total_requests,
            concurrency = self.config.concurrency_per_worker,
            "all workers launched"
        );

        let workers_total = u32::try_from(workers.len()).unwrap_or(u32::MAX);
        let mut tracker = ProgressTracker::default();
        let mut next_progress = started + self.options.progress_interval;
        let mut timed_out = false;

        let mut housekeeping = tokio::time::interval(self.options.housekeeping_interval);
        housekeeping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while workers.values().any(|w| w.phase != Phase::Done) {
            tokio::select! {
                ev = rx.recv() => match ev {
                    Some(ev) => self.handle_event(ev, &mut table, &mut workers),
                    None => {
                        // Every launcher side is gone; nothing more can arrive.
                        for (worker_id, w) in workers.iter_mut().filter(|(_, w)| w.phase != Phase::Done) {
                            tracing::warn!(worker_id, "worker event stream closed without exit");
                            w.phase = Phase::Done;
                        }
                    }
                },

                _ = housekeeping.tick() => {
                    let now = Instant::now();
                    if !timed_out && now >= deadline {
                        timed_out = true;
                        tracing::warn!(
                            run_timeout_ms = self.config.run_timeout.as_millis() as u64,
                            "run timeout elapsed; stopping workers"
                        );
                    }
                    self.escalate(now, timed_out, &mut table, &mut workers);

                    if now >= next_progress {
                        next_progress = now + self.options.progress_interval;
                        self.emit_progress(&mut tracker, started, &table, &workers, workers_total);
                    }
                }
            }
        }

        self.emit_progress(&mut tracker, started, &table, &workers, workers_total);

        let wall_clock = started.elapsed();
        let metrics = table.freeze(wall_clock);

        tracing::info!(
            completed = metrics.total_completed,
            failed = metrics.total_failed,
            unreported = metrics.unreported,
            wall_clock_ms = wall_clock.as_millis() as u64,
            "run finished"
        );

        Ok(metrics)
    }

    fn handle_event(
        &self,
        ev: WorkerEvent,
        table: &mut SnapshotTable,
        workers: &mut BTreeMap<u32, Supervised>,
    ) {
        let worker_id = ev.worker_id;
        match ev.kind {
            WorkerEventKind::Message(msg) => {
                if msg.worker_id() != worker_id {
                    tracing::warn!(
                        worker_id,
                        claimed = msg.worker_id(),
                        "dropping message with a foreign worker id"
                    );
                    return;
                }
                match msg {
                    WorkerMessage::Progress(snapshot) => {
                        if let Err(rejection) = table.apply(snapshot) {
                            tracing::warn!(worker_id, "rejected progress snapshot: {rejection}");
                        }
                    }
                    WorkerMessage::Terminal(report) => {
                        if let Err(rejection) = table.apply_terminal(report) {
                            tracing::warn!(worker_id, "rejected terminal report: {rejection}");
                            return;
                        }
                        if let Some(w) = workers.get_mut(&worker_id)
                            && w.phase == Phase::Running
                        {
                            w.phase = Phase::Reported {
                                since: Instant::now(),
                            };
                        }
                    }
                    WorkerMessage::Fatal { message, .. } => {
                        tracing::error!(worker_id, "worker reported a fatal error: {message}");
                        table.mark_fatal(worker_id, message);
                    }
                }
            }
            WorkerEventKind::Corrupt(line) => {
                tracing::warn!(worker_id, "dropping undecodable worker output: {line}");
            }
            WorkerEventKind::Exited { code } => {
                let Some(w) = workers.get_mut(&worker_id) else {
                    return;
                };
                let escalated = matches!(w.phase, Phase::Killing { .. });
                if !table.has_terminal(worker_id) {
                    tracing::warn!(
                        worker_id,
                        code = ?code,
                        "worker exited without a terminal report; its remaining quota counts as failed"
                    );
                } else {
                    tracing::debug!(worker_id, code = ?code, "worker exited");
                }
                table.mark_exit(
                    worker_id,
                    if escalated {
                        ExitState::Escalated
                    } else {
                        ExitState::Exited { code }
                    },
                );
                w.phase = Phase::Done;
            }
        }
    }

    fn escalate(
        &self,
        now: Instant,
        timed_out: bool,
        table: &mut SnapshotTable,
        workers: &mut BTreeMap<u32, Supervised>,
    ) {
        let opts = &self.options;
        for (&worker_id, w) in workers.iter_mut() {
            w.phase = match w.phase {
                Phase::Running if timed_out => {
                    w.handle.request_stop();
                    Phase::Stopping { since: now }
                }
                Phase::Reported { since } if now.duration_since(since) >= opts.exit_grace => {
                    tracing::warn!(worker_id, "worker did not exit after its terminal report; killing it");
                    w.handle.kill();
                    Phase::Killing { since: now }
                }
                Phase::Stopping { since } if now.duration_since(since) >= opts.stop_grace => {
                    tracing::warn!(worker_id, "worker did not stop in time; killing it");
                    w.handle.kill();
                    Phase::Killing { since: now }
                }
                Phase::Killing { since } if now.duration_since(since) >= opts.kill_grace => {
                    tracing::error!(worker_id, "worker did not exit after kill; abandoning it");
                    table.mark_exit(worker_id, ExitState::Escalated);
                    Phase::Done
                }
                phase => phase,
            };
        }
    }

    fn emit_progress(
        &self,
        tracker: &mut ProgressTracker,
        started: Instant,
        table: &SnapshotTable,
        workers: &BTreeMap<u32, Supervised>,
        workers_total: u32,
    ) {
        let Some(progress) = &self.progress else {
            return;
        };
        let workers_done = workers.values().filter(|w| w.phase == Phase::Done).count();
        let update = tracker.update(
            started.elapsed(),
            table.totals(),
            self.config.total_requests,
            u32::try_from(workers_done).unwrap_or(u32::MAX),
            workers_total,
        );
        progress(update);
    }
}
