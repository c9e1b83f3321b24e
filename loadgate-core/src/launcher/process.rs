use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt as _, BufReader};
use tokio::process::Command;

use crate::aggregator::WorkerAssignment;
use crate::config::{Endpoint, RunConfiguration};
use crate::error::{Error, Result};
use crate::ipc::{WorkerMessage, WorkerSpec};

use super::{EventSender, WorkerControl, WorkerEventKind, WorkerHandle, WorkerLauncher, send_event};

/// Runs each worker as `<exe> worker --spec <json>`, one OS process per worker.
///
/// Workers write NDJSON [`WorkerMessage`]s on stdout and treat stdin EOF as a stop request.
/// Their stderr is inherited so worker logs reach the terminal.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    exe: PathBuf,
    target_base_url: String,
    endpoints: Vec<Endpoint>,
    headers: Vec<(String, String)>,
    request_timeout_ms: u64,
    progress_every: u64,
    env: Vec<(String, String)>,
}

impl ProcessLauncher {
    pub fn new(exe: impl Into<PathBuf>, config: &RunConfiguration) -> Self {
        Self {
            exe: exe.into(),
            target_base_url: config.target_base_url.clone(),
            endpoints: config.endpoints.clone(),
            headers: config.headers.clone(),
            request_timeout_ms: u64::try_from(config.request_timeout.as_millis())
                .unwrap_or(u64::MAX)
                .max(1),
            progress_every: config.progress_every,
            env: Vec::new(),
        }
    }

    /// Extra environment for every worker process (e.g. a log filter).
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn spec_for(&self, assignment: WorkerAssignment) -> WorkerSpec {
        WorkerSpec {
            assignment,
            target_base_url: self.target_base_url.clone(),
            endpoints: self.endpoints.clone(),
            headers: self.headers.clone(),
            request_timeout_ms: self.request_timeout_ms,
            progress_every: self.progress_every,
        }
    }
}

impl WorkerLauncher for ProcessLauncher {
    fn launch(&self, assignment: WorkerAssignment, events: EventSender) -> Result<WorkerHandle> {
        let worker_id = assignment.worker_id;
        let spec = self.spec_for(assignment).to_json()?;

        let mut cmd = Command::new(&self.exe);
        cmd.arg("worker")
            .arg("--spec")
            .arg(spec)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        for (k, v) in &self.env {
            cmd.env(k, v);
        }

        let mut child = cmd
            .spawn()
            .map_err(|source| Error::Spawn { worker_id, source })?;

        let stdin = child.stdin.take();
        let stdout = child.stdout.take().ok_or_else(|| Error::Spawn {
            worker_id,
            source: std::io::Error::other("worker stdout was not captured"),
        })?;

        tracing::debug!(worker_id, pid = child.id(), "worker process spawned");

        let (handle, control) = WorkerHandle::new(worker_id);
        tokio::spawn(supervise(worker_id, child, stdin, stdout, control, events));
        Ok(handle)
    }
}

async fn supervise(
    worker_id: u32,
    mut child: tokio::process::Child,
    mut stdin: Option<tokio::process::ChildStdin>,
    stdout: tokio::process::ChildStdout,
    control: WorkerControl,
    events: EventSender,
) {
    let WorkerControl {
        stop: mut stop_rx,
        kill: mut kill_rx,
    } = control;
    let mut stop_seen = false;
    let mut kill_seen = false;
    let mut lines = BufReader::new(stdout).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    let kind = match WorkerMessage::from_line(&line) {
                        Ok(msg) => WorkerEventKind::Message(msg),
                        Err(err) => WorkerEventKind::Corrupt(format!("{err}: {line}")),
                    };
                    send_event(&events, worker_id, kind);
                }
                Ok(None) => break,
                Err(err) => {
                    send_event(&events, worker_id, WorkerEventKind::Corrupt(err.to_string()));
                    break;
                }
            },

            res = &mut stop_rx, if !stop_seen => {
                stop_seen = true;
                if res.is_ok() {
                    // Closing stdin is the worker's stop signal.
                    drop(stdin.take());
                }
            }

            res = &mut kill_rx, if !kill_seen => {
                kill_seen = true;
                if res.is_ok()
                    && let Err(err) = child.start_kill()
                {
                    tracing::warn!(worker_id, "failed to kill worker: {err}");
                }
            }
        }
    }

    let status = loop {
        tokio::select! {
            status = child.wait() => break status,

            res = &mut kill_rx, if !kill_seen => {
                kill_seen = true;
                if res.is_ok()
                    && let Err(err) = child.start_kill()
                {
                    tracing::warn!(worker_id, "failed to kill worker: {err}");
                }
            }
        }
    };

    let code = match status {
        Ok(status) => status.code(),
        Err(err) => {
            tracing::warn!(worker_id, "failed to wait for worker: {err}");
            None
        }
    };
    send_event(&events, worker_id, WorkerEventKind::Exited { code });
}
