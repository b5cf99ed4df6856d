//! Recognition pipeline: data URL → probe file → engine → event log → names.

use crate::engine::{EngineCallError, EngineHandle};
use crate::events::{EventLog, EventLogError};
use facegate_core::{decode_data_url, identity_label, ProbeError, ProbeFile};
use serde::Serialize;
use std::path::Path;
use thiserror::Error;

/// Returned as the only name when the probe matched nobody.
pub const UNRECOGNIZED: &str = "Неизвестен";

#[derive(Error, Debug)]
pub enum RecognizeError {
    #[error(transparent)]
    Probe(#[from] ProbeError),
    #[error(transparent)]
    Engine(#[from] EngineCallError),
    #[error(transparent)]
    EventLog(#[from] EventLogError),
    #[error("probe decoding task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Recognition {
    /// Number of raw match rows returned by the engine.
    pub faces_detected: usize,
    /// One label per match row, or `[UNRECOGNIZED]`.
    pub names: Vec<String>,
}

/// Recognize the face(s) in `data_url` against the store at `reference_dir`.
///
/// Every match is appended to `events` before the result is returned.
pub async fn recognize(
    data_url: String,
    engine: &EngineHandle,
    reference_dir: &Path,
    events: &EventLog,
) -> Result<Recognition, RecognizeError> {
    // Held until the engine replies; dropping it removes the temp file.
    let probe = tokio::task::spawn_blocking(move || -> Result<ProbeFile, ProbeError> {
        let image = decode_data_url(&data_url)?;
        tracing::debug!(width = image.width(), height = image.height(), "probe decoded");
        ProbeFile::create(&image)
    })
    .await??;

    let rows = engine
        .find(probe.path().to_path_buf(), reference_dir.to_path_buf())
        .await?;
    drop(probe);

    if rows.is_empty() {
        tracing::info!("no identity recognized");
        return Ok(Recognition {
            faces_detected: 0,
            names: vec![UNRECOGNIZED.to_string()],
        });
    }

    let mut names = Vec::with_capacity(rows.len());
    for row in &rows {
        let name = identity_label(&row.reference_path).unwrap_or_else(|| row.identity.clone());
        events.append(&name).await?;
        names.push(name);
    }
    tracing::info!(?names, "recognized");

    Ok(Recognition {
        faces_detected: rows.len(),
        names,
    })
}
