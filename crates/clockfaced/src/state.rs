use crate::config::Config;
use chrono::NaiveDateTime;
use clockface_core::{EmbeddingSource, FaceAuth};
use clockface_store::Store;
use std::sync::Arc;

/// Local wall-clock time used to stamp attendance.
pub type Clock = Arc<dyn Fn() -> NaiveDateTime + Send + Sync>;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub store: Store,
    pub faces: FaceAuth,
    pub config: Arc<Config>,
    pub clock: Clock,
}

impl AppState {
    pub fn new(store: Store, source: Arc<dyn EmbeddingSource>, config: Config) -> Self {
        let faces = FaceAuth::new(
            source,
            Arc::new(store.clone()),
            config.match_threshold,
            config.embedding_dim,
        );
        Self {
            store,
            faces,
            config: Arc::new(config),
            clock: Arc::new(|| chrono::Local::now().naive_local()),
        }
    }

    /// Replace the clock, e.g. to pin time in tests.
    pub fn with_clock(mut self, clock: impl Fn() -> NaiveDateTime + Send + Sync + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    pub fn now(&self) -> NaiveDateTime {
        (self.clock)()
    }
}
