use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::aggregator::WorkerAssignment;
use crate::config::Endpoint;
use crate::ipc::{ProgressSnapshot, StatusClass, WorkerMessage};

mod counters;
mod http;

pub use counters::WorkerCounters;
pub use http::http_request_fn;

/// Result of one request, as seen by the worker that issued it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestOutcome {
    pub endpoint_name: Arc<str>,
    pub success: bool,
    pub duration_micros: u64,
    pub status_class: StatusClass,
}

impl RequestOutcome {
    pub fn new(endpoint_name: Arc<str>, status_class: StatusClass, duration_micros: u64) -> Self {
        Self {
            endpoint_name,
            success: status_class.is_success(),
            duration_micros,
            status_class,
        }
    }
}

pub type IssueFuture = Pin<Box<dyn Future<Output = RequestOutcome> + Send + 'static>>;

pub type ReportFn = Arc<dyn Fn(WorkerMessage) + Send + Sync + 'static>;

/// Run parameters shared by every worker of a run.
#[derive(Debug, Clone)]
pub struct WorkerPlan {
    pub endpoints: Arc<[Arc<Endpoint>]>,
    pub request_timeout: Duration,
    pub progress_every: u64,
}

impl WorkerPlan {
    pub fn new(endpoints: Vec<Endpoint>, request_timeout: Duration, progress_every: u64) -> Self {
        Self {
            endpoints: endpoints.into_iter().map(Arc::new).collect(),
            request_timeout,
            progress_every: progress_every.max(1),
        }
    }
}

#[derive(Debug, Clone)]
pub struct WorkerTally {
    pub snapshot: ProgressSnapshot,
    /// Highest number of requests observed in flight at once.
    pub max_in_flight: u32,
    /// True when a stop request cut the assignment short.
    pub stopped: bool,
}

struct InFlight {
    current: AtomicU32,
    max: AtomicU32,
}

impl InFlight {
    fn enter(self: &Arc<Self>) -> InFlightGuard {
        let now = self.current.fetch_add(1, Ordering::AcqRel) + 1;
        self.max.fetch_max(now, Ordering::AcqRel);
        InFlightGuard(self.clone())
    }
}

struct InFlightGuard(Arc<InFlight>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Issues exactly `requests_to_process` requests with at most `concurrency_limit` in flight.
///
/// Emits a `Progress` message every `progress_every` completions and on the last one, then a
/// single `Terminal` message. Once `stop` resolves no new request is issued; requests already
/// in flight are drained before the terminal message.
pub async fn run_worker<F, S>(
    assignment: WorkerAssignment,
    plan: WorkerPlan,
    issue: F,
    report: ReportFn,
    stop: S,
) -> WorkerTally
where
    F: Fn(Arc<Endpoint>) -> IssueFuture + Send + Sync + 'static,
    S: Future<Output = ()>,
{
    // Nothing can be issued without a target.
    let total = if plan.endpoints.is_empty() {
        0
    } else {
        assignment.requests_to_process
    };
    let limit = assignment.concurrency_limit.max(1);
    let semaphore = Arc::new(Semaphore::new(limit as usize));
    let in_flight = Arc::new(InFlight {
        current: AtomicU32::new(0),
        max: AtomicU32::new(0),
    });

    let mut counters = WorkerCounters::new(assignment.worker_id);
    let mut tasks: JoinSet<RequestOutcome> = JoinSet::new();
    let mut issued = 0u64;
    let mut stopping = false;
    let mut last_reported = 0u64;

    tracing::debug!(
        worker_id = assignment.worker_id,
        requests = total,
        concurrency = limit,
        "worker started"
    );

    let started = Instant::now();
    tokio::pin!(stop);

    loop {
        let can_issue = !stopping && issued < total;
        if !can_issue && tasks.is_empty() {
            break;
        }

        tokio::select! {
            biased;

            _ = &mut stop, if !stopping => {
                stopping = true;
                tracing::debug!(
                    worker_id = assignment.worker_id,
                    issued,
                    "stop requested; draining in-flight requests"
                );
            }

            Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                match joined {
                    Ok(outcome) => {
                        if !outcome.success {
                            tracing::trace!(
                                endpoint = %outcome.endpoint_name,
                                class = %outcome.status_class,
                                "request failed"
                            );
                        }
                        counters.record(&outcome);
                    }
                    Err(err) => {
                        tracing::warn!(worker_id = assignment.worker_id, "request task failed: {err}");
                        counters.record_class(StatusClass::NetworkError, 0);
                    }
                }

                let completed = counters.completed();
                if completed % plan.progress_every == 0 || completed == total {
                    last_reported = completed;
                    report(WorkerMessage::Progress(counters.snapshot()));
                }
            }

            permit = semaphore.clone().acquire_owned(), if can_issue => {
                let Ok(permit) = permit else {
                    stopping = true;
                    continue;
                };

                let endpoint = plan.endpoints[(issued % plan.endpoints.len() as u64) as usize].clone();
                issued += 1;

                let request = issue(endpoint.clone());
                let timeout = plan.request_timeout;
                let in_flight = in_flight.clone();
                tasks.spawn(async move {
                    let _permit = permit;
                    let _guard = in_flight.enter();
                    let start = Instant::now();
                    match tokio::time::timeout(timeout, request).await {
                        Ok(outcome) => outcome,
                        Err(_) => RequestOutcome::new(
                            endpoint.name.as_str().into(),
                            StatusClass::Timeout,
                            start.elapsed().as_micros() as u64,
                        ),
                    }
                });
            }
        }
    }

    if counters.completed() != last_reported {
        report(WorkerMessage::Progress(counters.snapshot()));
    }

    let max_in_flight = in_flight.max.load(Ordering::Acquire);
    report(WorkerMessage::Terminal(counters.terminal_report(max_in_flight)));

    tracing::debug!(
        worker_id = assignment.worker_id,
        completed = counters.completed(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "worker finished"
    );

    WorkerTally {
        snapshot: counters.snapshot(),
        max_in_flight,
        stopped: stopping && counters.completed() < total,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    fn assignment(requests: u64, concurrency: u32) -> WorkerAssignment {
        WorkerAssignment {
            worker_id: 7,
            requests_to_process: requests,
            concurrency_limit: concurrency,
        }
    }

    fn plan(timeout: Duration, every: u64) -> WorkerPlan {
        WorkerPlan::new(
            vec![Endpoint::new("a", "/a"), Endpoint::new("b", "/b")],
            timeout,
            every,
        )
    }

    fn collecting() -> (ReportFn, Arc<Mutex<Vec<WorkerMessage>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let report: ReportFn = Arc::new(move |msg| {
            sink.lock().unwrap_or_else(|e| e.into_inner()).push(msg);
        });
        (report, seen)
    }

    fn sleeping(delay: Duration, class: StatusClass) -> impl Fn(Arc<Endpoint>) -> IssueFuture {
        move |endpoint: Arc<Endpoint>| {
            Box::pin(async move {
                tokio::time::sleep(delay).await;
                RequestOutcome::new(
                    endpoint.name.as_str().into(),
                    class,
                    delay.as_micros() as u64,
                )
            }) as IssueFuture
        }
    }

    #[tokio::test]
    async fn issues_exactly_the_assigned_requests() {
        let (report, seen) = collecting();
        let tally = run_worker(
            assignment(25, 4),
            plan(Duration::from_secs(5), 10),
            sleeping(Duration::from_millis(1), StatusClass::Ok),
            report,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(tally.snapshot.completed, 25);
        assert_eq!(tally.snapshot.successful, 25);
        assert!(!tally.stopped);

        let seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        let progress: Vec<u64> = seen
            .iter()
            .filter_map(|m| match m {
                WorkerMessage::Progress(s) => Some(s.completed),
                _ => None,
            })
            .collect();
        assert_eq!(progress, vec![10, 20, 25]);

        match seen.last() {
            Some(WorkerMessage::Terminal(t)) => {
                assert_eq!(t.snapshot.completed, 25);
                assert_eq!(t.latency.total_count(), 25);
            }
            other => panic!("expected terminal message last, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn never_exceeds_the_concurrency_limit() {
        let (report, _seen) = collecting();
        let tally = run_worker(
            assignment(40, 3),
            plan(Duration::from_secs(5), 100),
            sleeping(Duration::from_millis(5), StatusClass::Ok),
            report,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(tally.snapshot.completed, 40);
        assert!(tally.max_in_flight <= 3, "max_in_flight={}", tally.max_in_flight);
        assert!(tally.max_in_flight >= 1);
    }

    #[tokio::test]
    async fn single_permit_serializes_requests() {
        let (report, _seen) = collecting();
        let delay = Duration::from_millis(10);
        let started = Instant::now();
        let tally = run_worker(
            assignment(5, 1),
            plan(Duration::from_secs(5), 100),
            sleeping(delay, StatusClass::Ok),
            report,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(tally.max_in_flight, 1);
        assert!(started.elapsed() >= delay * 5);
    }

    #[tokio::test]
    async fn slow_requests_become_timeouts() {
        let (report, _seen) = collecting();
        let tally = run_worker(
            assignment(4, 4),
            plan(Duration::from_millis(20), 100),
            sleeping(Duration::from_secs(30), StatusClass::Ok),
            report,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(tally.snapshot.completed, 4);
        assert_eq!(tally.snapshot.successful, 0);
        assert_eq!(tally.snapshot.failures.timeout, 4);
    }

    #[tokio::test]
    async fn endpoints_are_used_round_robin() {
        let (report, _seen) = collecting();
        let hits = Arc::new(Mutex::new(Vec::new()));
        let log = hits.clone();
        let issue = move |endpoint: Arc<Endpoint>| {
            log.lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(endpoint.name.clone());
            Box::pin(async move {
                RequestOutcome::new(endpoint.name.as_str().into(), StatusClass::Ok, 10)
            }) as IssueFuture
        };

        run_worker(
            assignment(4, 1),
            plan(Duration::from_secs(1), 100),
            issue,
            report,
            std::future::pending::<()>(),
        )
        .await;

        let hits = hits.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(*hits, vec!["a", "b", "a", "b"]);
    }

    #[tokio::test]
    async fn stop_halts_issuance_and_still_reports_terminal() {
        let (report, seen) = collecting();
        let tally = run_worker(
            assignment(1_000, 2),
            plan(Duration::from_secs(5), 1_000),
            sleeping(Duration::from_millis(5), StatusClass::Ok),
            report,
            tokio::time::sleep(Duration::from_millis(30)),
        )
        .await;

        assert!(tally.stopped);
        assert!(tally.snapshot.completed < 1_000);
        let seen = seen.lock().unwrap_or_else(|e| e.into_inner());
        assert!(matches!(seen.last(), Some(WorkerMessage::Terminal(_))));
    }

    #[tokio::test]
    async fn failures_are_classified() {
        let (report, _seen) = collecting();
        let tally = run_worker(
            assignment(6, 2),
            plan(Duration::from_secs(1), 100),
            sleeping(Duration::from_millis(1), StatusClass::ServerError),
            report,
            std::future::pending::<()>(),
        )
        .await;

        assert_eq!(tally.snapshot.failed(), 6);
        assert_eq!(tally.snapshot.failures.server_error, 6);
    }
}
