use anyhow::{Context, Result};
use clockface_core::{EmbeddingExtractor, OnnxModelLoader};
use clockface_store::Store;
use clockfaced::engine::spawn_engine;
use clockfaced::{AppState, Config};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "clockfaced starting");

    let config = Config::from_env().context("loading configuration")?;

    let store = Store::open(&config.db_path)
        .await
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    let loader = OnnxModelLoader {
        detector_path: config.detector_path(),
        recognizer_path: config.recognizer_path(),
        min_confidence: config.min_face_confidence,
        dim: config.embedding_dim,
    };
    tracing::info!(
        detector = %loader.detector_path.display(),
        recognizer = %loader.recognizer_path.display(),
        lazy = config.lazy_model_load,
        "face model configured"
    );
    let engine = spawn_engine(
        EmbeddingExtractor::new(loader, config.embedding_dim),
        config.lazy_model_load,
    )
    .context("starting face engine")?;

    let state = AppState::new(store, Arc::new(engine), config.clone());
    clockfaced::server::serve(state, &config).await
}
