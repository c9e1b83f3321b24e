use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::HistoricalRun;

/// Finished runs stored as `<dir>/<profile>/<timestamp>.json`.
#[derive(Debug, Clone)]
pub struct BaselineStore {
    dir: PathBuf,
}

impl BaselineStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn profile_dir(&self, profile: &str) -> PathBuf {
        self.dir.join(sanitize(profile))
    }

    /// The newest readable run of `profile`, by its recorded timestamp.
    ///
    /// A missing directory is not an error. Unreadable or corrupt files are skipped.
    pub fn latest(&self, profile: &str) -> Result<Option<HistoricalRun>> {
        let dir = self.profile_dir(profile);
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                return Err(Error::Baseline {
                    path: dir,
                    message: err.to_string(),
                });
            }
        };

        let mut newest: Option<HistoricalRun> = None;
        for entry in entries {
            let path = match entry {
                Ok(entry) => entry.path(),
                Err(err) => {
                    tracing::warn!(dir = %dir.display(), "skipping unreadable baseline entry: {err}");
                    continue;
                }
            };
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let run = match read_run(&path) {
                Ok(run) => run,
                Err(err) => {
                    tracing::warn!(path = %path.display(), "skipping corrupt baseline: {err}");
                    continue;
                }
            };
            if run.profile != profile {
                tracing::warn!(
                    path = %path.display(),
                    recorded = %run.profile,
                    "skipping baseline recorded for another profile"
                );
                continue;
            }
            if newest.as_ref().is_none_or(|n| run.timestamp > n.timestamp) {
                newest = Some(run);
            }
        }

        Ok(newest)
    }

    /// Persists `run` as a new file and returns its path.
    pub fn record(&self, run: &HistoricalRun) -> Result<PathBuf> {
        let dir = self.profile_dir(&run.profile);
        fs::create_dir_all(&dir).map_err(|err| Error::Baseline {
            path: dir.clone(),
            message: err.to_string(),
        })?;

        let stem = run.timestamp.format("%Y%m%dT%H%M%S%.3fZ").to_string();
        let json = serde_json::to_vec_pretty(run)?;

        let mut suffix = 0u32;
        loop {
            let name = if suffix == 0 {
                format!("{stem}.json")
            } else {
                format!("{stem}-{suffix}.json")
            };
            let path = dir.join(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
            {
                Ok(mut file) => {
                    io::Write::write_all(&mut file, &json).map_err(|err| Error::Baseline {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                    tracing::debug!(path = %path.display(), "baseline recorded");
                    return Ok(path);
                }
                Err(err) if err.kind() == io::ErrorKind::AlreadyExists => suffix += 1,
                Err(err) => {
                    return Err(Error::Baseline {
                        path,
                        message: err.to_string(),
                    });
                }
            }
        }
    }
}

fn read_run(path: &Path) -> Result<HistoricalRun> {
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

fn sanitize(profile: &str) -> String {
    let s: String = profile
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    if s.is_empty() { "_".to_string() } else { s }
}
