//! Append-only recognition event log: one `"<timestamp> - <identity>\n"` line per match.

use chrono::Local;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

/// Local time, microsecond precision, no offset.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6f";

#[derive(Error, Debug)]
#[error("event log {path}: {source}")]
pub struct EventLogError {
    path: PathBuf,
    source: std::io::Error,
}

pub struct EventLog {
    path: PathBuf,
    /// Serialises appends so concurrent requests never interleave partial lines.
    writer: Mutex<()>,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            writer: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event for `identity`, timestamped now.
    pub async fn append(&self, identity: &str) -> Result<(), EventLogError> {
        let line = format!("{} - {identity}\n", Local::now().format(TIMESTAMP_FORMAT));

        let _guard = self.writer.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|e| self.error(e))?;
        file.write_all(line.as_bytes()).await.map_err(|e| self.error(e))?;
        file.flush().await.map_err(|e| self.error(e))?;

        tracing::debug!(identity, "event logged");
        Ok(())
    }

    /// Every line in file order, each keeping its trailing newline.
    ///
    /// A log that does not exist yet reads as empty.
    pub async fn read_all(&self) -> Result<Vec<String>, EventLogError> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(self.error(e)),
        };
        Ok(text.split_inclusive('\n').map(str::to_owned).collect())
    }

    fn error(&self, source: std::io::Error) -> EventLogError {
        EventLogError {
            path: self.path.clone(),
            source,
        }
    }
}
