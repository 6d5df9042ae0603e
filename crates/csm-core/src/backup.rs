// ── Backup artifacts ──
//
// Write-once JSON snapshots under the run's backup directory, named
// `<name>-<run timestamp>.json`. Payloads use the services' own schema so
// any file can be hand-edited and resubmitted.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::info;

use crate::error::CoreError;

/// `strftime` format of the run timestamp.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S";

/// Format a run timestamp.
pub fn run_timestamp(at: DateTime<Local>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Writes the backup artifacts of one run.
#[derive(Debug)]
pub struct BackupWriter {
    dir: PathBuf,
    timestamp: String,
    written: Vec<PathBuf>,
}

impl BackupWriter {
    pub fn new(dir: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            timestamp: timestamp.into(),
            written: Vec::new(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Paths written so far, in write order.
    pub fn written(&self) -> &[PathBuf] {
        &self.written
    }

    pub fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}-{}.json", self.timestamp))
    }

    /// Serialize `payload` as pretty JSON to a new file.
    ///
    /// Fails if the file already exists; artifacts are never overwritten.
    pub fn write<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        payload: &T,
    ) -> Result<PathBuf, CoreError> {
        let path = self.path_for(name);
        let io_err = |source| CoreError::Backup {
            path: path.display().to_string(),
            source,
        };

        let mut body =
            serde_json::to_vec_pretty(payload).map_err(|source| CoreError::BackupEncode {
                name: name.into(),
                source,
            })?;
        body.push(b'\n');

        fs::create_dir_all(&self.dir).map_err(io_err)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .map_err(io_err)?;
        file.write_all(&body).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        info!(path = %path.display(), "wrote backup");
        self.written.push(path.clone());
        Ok(path)
    }
}
