// src/state.rs

use std::sync::Arc;

use axum::extract::FromRef;

use crate::{config::Config, engine::AttemptEngine, store::Store};

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<AttemptEngine>,
    pub store: Arc<dyn Store>,
    pub config: Config,
}

impl AppState {
    /// Wires the engine onto `store` with the system clock and default certificate codes.
    pub fn new(store: Arc<dyn Store>, config: Config) -> Self {
        Self::from_engine(AttemptEngine::with_defaults(store), config)
    }

    pub fn from_engine(engine: AttemptEngine, config: Config) -> Self {
        Self {
            store: engine.store(),
            engine: Arc::new(engine),
            config,
        }
    }
}

impl FromRef<AppState> for Arc<AttemptEngine> {
    fn from_ref(state: &AppState) -> Self {
        state.engine.clone()
    }
}

impl FromRef<AppState> for Arc<dyn Store> {
    fn from_ref(state: &AppState) -> Self {
        state.store.clone()
    }
}

impl FromRef<AppState> for Config {
    fn from_ref(state: &AppState) -> Self {
        state.config.clone()
    }
}
