//! Startup check for the ONNX model files.
//!
//! Missing models are fetched with `curl` when a base URL is configured;
//! the daemon then exits and must be restarted to load them.

use crate::config::Config;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;

const MODEL_FILES: [&str; 2] = [facegate_core::SCRFD_MODEL_FILE, facegate_core::ARCFACE_MODEL_FILE];

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("model files missing from {dir}: {files:?} (set FACEGATE_MODEL_BASE_URL to fetch them)")]
    Missing { dir: PathBuf, files: Vec<&'static str> },
    #[error("failed to run curl for {url}: {source}")]
    Spawn { url: String, source: std::io::Error },
    #[error("curl exited with {status} fetching {url}")]
    Fetch { url: String, status: std::process::ExitStatus },
    #[error("failed to move downloaded model into {path}: {source}")]
    Install { path: PathBuf, source: std::io::Error },
}

#[derive(Debug, PartialEq, Eq)]
pub enum ModelStatus {
    /// All model files are present.
    Ready,
    /// Missing files were downloaded; a restart is required.
    Installed,
}

/// Model files not present in `dir`.
pub fn missing_models(dir: &Path) -> Vec<&'static str> {
    MODEL_FILES
        .into_iter()
        .filter(|file| !dir.join(file).is_file())
        .collect()
}

/// Verify the model files, fetching any that are missing.
pub fn ensure_models(config: &Config) -> Result<ModelStatus, ModelError> {
    let missing = missing_models(&config.model_dir);
    if missing.is_empty() {
        return Ok(ModelStatus::Ready);
    }

    let Some(base_url) = config.model_base_url.as_deref() else {
        return Err(ModelError::Missing {
            dir: config.model_dir.clone(),
            files: missing,
        });
    };

    for file in missing {
        let url = format!("{}/{file}", base_url.trim_end_matches('/'));
        let dest = config.model_dir.join(file);
        tracing::info!(%url, dest = %dest.display(), "model file not found; fetching");
        fetch(&url, &dest)?;
    }

    tracing::info!("model installation complete; restart facegated to continue");
    Ok(ModelStatus::Installed)
}

/// Partial download target; renamed onto `dest` once curl succeeds.
fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.file_name().unwrap_or_default().to_os_string();
    name.push(".part");
    dest.with_file_name(name)
}

fn fetch(url: &str, dest: &Path) -> Result<(), ModelError> {
    let part = part_path(dest);
    let status = Command::new("curl")
        .args(["-fL", "--create-dirs", "-o"])
        .arg(&part)
        .arg(url)
        .status()
        .map_err(|source| ModelError::Spawn {
            url: url.to_string(),
            source,
        })?;

    if !status.success() {
        let _ = std::fs::remove_file(&part);
        return Err(ModelError::Fetch {
            url: url.to_string(),
            status,
        });
    }

    std::fs::rename(&part, dest).map_err(|source| ModelError::Install {
        path: dest.to_path_buf(),
        source,
    })
}
