use facegate_core::{Candidate, EngineError, RecognitionEngine};
use std::path::PathBuf;
use tokio::sync::{mpsc, oneshot};

#[derive(thiserror::Error, Debug)]
pub enum EngineCallError {
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
struct FindRequest {
    probe: PathBuf,
    reference_dir: PathBuf,
    reply: oneshot::Sender<Result<Vec<Candidate>, EngineError>>,
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<FindRequest>,
}

impl EngineHandle {
    /// Match the probe image at `probe` against every image in `reference_dir`.
    pub async fn find(
        &self,
        probe: PathBuf,
        reference_dir: PathBuf,
    ) -> Result<Vec<Candidate>, EngineCallError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(FindRequest {
                probe,
                reference_dir,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineCallError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineCallError::ChannelClosed)??)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// The engine owns its inference sessions; requests are processed one at a
/// time in arrival order.
pub fn spawn_engine<E>(mut engine: E, queue: usize) -> EngineHandle
where
    E: RecognitionEngine + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<FindRequest>(queue.max(1));

    std::thread::Builder::new()
        .name("facegate-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                let started = std::time::Instant::now();
                let result = engine.find(&req.probe, &req.reference_dir);
                match &result {
                    Ok(candidates) => tracing::debug!(
                        candidates = candidates.len(),
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "find complete"
                    ),
                    Err(err) => tracing::warn!(error = %err, "find failed"),
                }
                let _ = req.reply.send(result);
            }
            tracing::info!("engine thread exiting");
        })
        .expect("failed to spawn engine thread");

    EngineHandle { tx }
}
