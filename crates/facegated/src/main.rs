use std::sync::Arc;

use anyhow::Result;
use facegate_core::OnnxEngine;
use tracing_subscriber::EnvFilter;

mod api;
mod config;
mod engine;
mod events;
mod models;
mod recognize;
mod registry;
#[cfg(test)]
mod testutil;

use config::Config;
use models::ModelStatus;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let config = Config::load()?;
    tracing::info!(?config, "facegated starting");

    if models::ensure_models(&config)? == ModelStatus::Installed {
        return Ok(());
    }

    let onnx = OnnxEngine::load(
        &config.scrfd_model_path().to_string_lossy(),
        &config.arcface_model_path().to_string_lossy(),
        config.similarity_threshold,
    )?;
    let engine = engine::spawn_engine(onnx, config.engine_queue);

    let registry = Arc::new(registry::Registry::open(&config.store_dir)?);
    tracing::info!(
        dir = %registry.dir().display(),
        identities = registry.list_identities().len(),
        "reference store loaded"
    );

    let state = api::AppState {
        engine,
        registry,
        events: Arc::new(events::EventLog::new(&config.log_file)),
    };

    api::serve(&config.bind_addr, state).await
}
