use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use serde::Deserialize;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::{Duration, sleep};

pub const PATH_OK: &str = "/ok";
pub const PATH_SLOW: &str = "/slow";
pub const PATH_FAIL: &str = "/fail";
pub const PATH_MISSING: &str = "/missing";
pub const PATH_AUTH: &str = "/auth";

/// Bearer token accepted by [`PATH_AUTH`].
pub const AUTH_TOKEN: &str = "Bearer loadgate-test";

const DEFAULT_SLOW_MS: u64 = 50;

#[derive(Debug, Clone, Default)]
pub struct TestServerStats {
    requests_total: Arc<AtomicU64>,
    in_flight: Arc<AtomicU64>,
    max_in_flight: Arc<AtomicU64>,
}

impl TestServerStats {
    fn enter(&self) -> InFlightGuard {
        self.requests_total.fetch_add(1, Ordering::Relaxed);
        let now = self.in_flight.fetch_add(1, Ordering::AcqRel) + 1;
        self.max_in_flight.fetch_max(now, Ordering::AcqRel);
        InFlightGuard {
            in_flight: self.in_flight.clone(),
        }
    }

    pub fn requests_total(&self) -> u64 {
        self.requests_total.load(Ordering::Relaxed)
    }

    /// Highest number of requests observed in flight at the same time.
    pub fn max_in_flight(&self) -> u64 {
        self.max_in_flight.load(Ordering::Acquire)
    }
}

struct InFlightGuard {
    in_flight: Arc<AtomicU64>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

#[derive(Debug, Deserialize)]
struct SlowQuery {
    ms: Option<u64>,
}

async fn handle_ok(State(stats): State<TestServerStats>) -> &'static str {
    let _guard = stats.enter();
    "ok"
}

async fn handle_slow(
    State(stats): State<TestServerStats>,
    Query(query): Query<SlowQuery>,
) -> &'static str {
    let _guard = stats.enter();
    sleep(Duration::from_millis(query.ms.unwrap_or(DEFAULT_SLOW_MS))).await;
    "slow"
}

async fn handle_fail(State(stats): State<TestServerStats>) -> (StatusCode, &'static str) {
    let _guard = stats.enter();
    (StatusCode::INTERNAL_SERVER_ERROR, "boom")
}

async fn handle_auth(State(stats): State<TestServerStats>, headers: HeaderMap) -> StatusCode {
    let _guard = stats.enter();
    if headers.get("authorization").and_then(|v| v.to_str().ok()) == Some(AUTH_TOKEN) {
        StatusCode::OK
    } else {
        StatusCode::UNAUTHORIZED
    }
}

pub fn router(stats: TestServerStats) -> Router {
    // Anything unrouted (e.g. PATH_MISSING) falls through to axum's 404.
    Router::new()
        .route(PATH_OK, get(handle_ok))
        .route(PATH_SLOW, get(handle_slow))
        .route(PATH_FAIL, get(handle_fail))
        .route(PATH_AUTH, get(handle_auth))
        .with_state(stats)
}

/// In-process HTTP target on an ephemeral loopback port.
pub struct TestServer {
    base_url: String,
    stats: TestServerStats,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: Option<tokio::task::JoinHandle<()>>,
}

impl TestServer {
    pub async fn start() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;

        let stats = TestServerStats::default();

        let app = router(stats.clone());

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            });
            let _ = serve.await;
        });

        Ok(Self {
            base_url: format!("http://{addr}"),
            stats,
            shutdown_tx: Some(shutdown_tx),
            task: Some(task),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn stats(&self) -> &TestServerStats {
        &self.stats
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if self.shutdown_tx.is_some()
            && let Some(task) = self.task.take()
        {
            task.abort();
        }
    }
}
