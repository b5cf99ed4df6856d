use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Daemon configuration.
///
/// Defaults, optionally overlaid by a TOML file named in `FACEGATE_CONFIG`,
/// then by `FACEGATE_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Listen address for the HTTP API.
    pub bind_addr: String,
    /// Reference store: one `<identity>.<ext>` image per identity.
    pub store_dir: PathBuf,
    /// Append-only recognition event log.
    pub log_file: PathBuf,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    /// Base URL the missing model files are fetched from at startup.
    pub model_base_url: Option<String>,
    /// Cosine similarity threshold for a positive match.
    pub similarity_threshold: f32,
    /// Capacity of the engine request queue.
    pub engine_queue: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8000".to_string(),
            store_dir: PathBuf::from("known_faces"),
            log_file: PathBuf::from("events.log"),
            model_dir: PathBuf::from("models"),
            model_base_url: None,
            similarity_threshold: 0.40,
            engine_queue: 4,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl Config {
    /// Load configuration from `FACEGATE_CONFIG` (if set) and `FACEGATE_*` variables.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match std::env::var("FACEGATE_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        Ok(base.with_env())
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    fn with_env(self) -> Self {
        self.with_overrides(|key| std::env::var(key).ok())
    }

    fn with_overrides(self, var: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            bind_addr: var("FACEGATE_BIND_ADDR").unwrap_or(self.bind_addr),
            store_dir: var("FACEGATE_STORE_DIR").map(PathBuf::from).unwrap_or(self.store_dir),
            log_file: var("FACEGATE_LOG_FILE").map(PathBuf::from).unwrap_or(self.log_file),
            model_dir: var("FACEGATE_MODEL_DIR").map(PathBuf::from).unwrap_or(self.model_dir),
            model_base_url: var("FACEGATE_MODEL_BASE_URL").or(self.model_base_url),
            similarity_threshold: parsed(&var, "FACEGATE_SIMILARITY_THRESHOLD")
                .unwrap_or(self.similarity_threshold),
            engine_queue: parsed(&var, "FACEGATE_ENGINE_QUEUE").unwrap_or(self.engine_queue),
        }
    }

    /// Path to the SCRFD detection model.
    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(facegate_core::SCRFD_MODEL_FILE)
    }

    /// Path to the ArcFace recognition model.
    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(facegate_core::ARCFACE_MODEL_FILE)
    }
}

fn parsed<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.parse().ok())
}
