use async_trait::async_trait;
use clockface_core::{EmbeddingExtractor, EmbeddingSource, Embedding, ExtractError, ModelLoader};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("face model failed to load at startup: {0}")]
    Preload(#[source] ExtractError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Messages sent from request handlers to the engine thread.
enum EngineRequest {
    Extract {
        image: Vec<u8>,
        reply: oneshot::Sender<Result<Embedding, ExtractError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
    loaded: Arc<AtomicBool>,
}

impl EngineHandle {
    /// Decode `image` and describe its most prominent face on the engine thread.
    pub async fn extract(&self, image: Vec<u8>) -> Result<Embedding, ExtractError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Extract {
                image,
                reply: reply_tx,
            })
            .await
            .map_err(|_| engine_gone())?;
        reply_rx.await.map_err(|_| engine_gone())?
    }
}

fn engine_gone() -> ExtractError {
    ExtractError::ModelUnavailable("engine thread exited".into())
}

#[async_trait]
impl EmbeddingSource for EngineHandle {
    async fn extract(&self, image: Vec<u8>) -> Result<Embedding, ExtractError> {
        EngineHandle::extract(self, image).await
    }

    fn is_ready(&self) -> bool {
        self.loaded.load(Ordering::Relaxed)
    }
}

/// Spawn the engine on a dedicated OS thread.
///
/// Unless `lazy` is set the model is loaded before the thread starts and a
/// load failure is returned to the caller. Image decoding and inference both
/// run on the engine thread, one request at a time.
pub fn spawn_engine<L>(extractor: EmbeddingExtractor<L>, lazy: bool) -> Result<EngineHandle, EngineError>
where
    L: ModelLoader + 'static,
{
    if lazy {
        tracing::info!("face model will load on first use");
    } else {
        extractor.preload().map_err(EngineError::Preload)?;
    }

    let loaded = Arc::new(AtomicBool::new(extractor.is_loaded()));
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(16);

    let thread_loaded = loaded.clone();
    std::thread::Builder::new()
        .name("clockface-engine".into())
        .spawn(move || {
            tracing::info!(dim = extractor.dim(), "engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Extract { image, reply } => {
                        let started = Instant::now();
                        let result = extractor.extract(&image);
                        thread_loaded.store(extractor.is_loaded(), Ordering::Relaxed);
                        tracing::debug!(
                            bytes = image.len(),
                            ok = result.is_ok(),
                            elapsed_ms = started.elapsed().as_millis() as u64,
                            "extract finished"
                        );
                        // The requester may have timed out; the result is then dropped.
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })?;

    Ok(EngineHandle { tx, loaded })
}
