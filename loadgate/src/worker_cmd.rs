use std::io::Write as _;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::AsyncReadExt as _;

use loadgate_core::worker::{ReportFn, http_request_fn, run_worker};
use loadgate_core::{WorkerMessage, WorkerSpec};
use loadgate_http::HttpClient;

use crate::cli::WorkerArgs;
use crate::exit_codes::ExitCode;

const MAX_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Entry point of a worker process: NDJSON messages on stdout, stdin EOF means stop.
pub(crate) async fn worker(args: WorkerArgs) -> ExitCode {
    let spec = match WorkerSpec::from_json(&args.spec) {
        Ok(spec) => spec,
        Err(err) => {
            tracing::error!("undecodable worker spec: {err}");
            return ExitCode::InvalidInput;
        }
    };
    let worker_id = spec.assignment.worker_id;

    if let Err(err) = spec.validate() {
        tracing::error!(worker_id, "invalid worker spec: {err}");
        emit(&WorkerMessage::Fatal {
            worker_id,
            message: err.to_string(),
        });
        return ExitCode::InvalidInput;
    }

    let plan = spec.plan();
    let client = HttpClient::new(Some(plan.request_timeout.min(MAX_CONNECT_TIMEOUT)));
    let issue = http_request_fn(client, spec.target_base_url.as_str().into(), spec.headers());
    let report: ReportFn = Arc::new(|msg| emit(&msg));

    let tally = run_worker(spec.assignment, plan, issue, report, stop_signal(worker_id)).await;

    tracing::debug!(
        worker_id,
        completed = tally.snapshot.completed,
        successful = tally.snapshot.successful,
        max_in_flight = tally.max_in_flight,
        stopped = tally.stopped,
        "worker done"
    );
    ExitCode::Success
}

fn emit(msg: &WorkerMessage) {
    let line = match msg.to_line() {
        Ok(line) => line,
        Err(err) => {
            tracing::error!("failed to encode worker message: {err}");
            return;
        }
    };
    let mut out = std::io::stdout().lock();
    if writeln!(out, "{line}").and_then(|()| out.flush()).is_err() {
        // The master is gone; keep draining so the process still exits cleanly.
        tracing::debug!("stdout closed; dropping worker message");
    }
}

/// Resolves on stdin EOF (the master's stop request) or Ctrl-C.
async fn stop_signal(worker_id: u32) {
    let eof = async {
        let mut stdin = tokio::io::stdin();
        let mut buf = [0u8; 256];
        loop {
            match stdin.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => {}
            }
        }
    };

    tokio::select! {
        () = eof => tracing::debug!(worker_id, "stdin closed; stopping"),
        _ = tokio::signal::ctrl_c() => tracing::debug!(worker_id, "interrupted; stopping"),
    }
}
