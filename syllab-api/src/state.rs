//! Shared application state for Axum routers.

use std::sync::Arc;
use syllab_core::EngineConfig;
use syllab_engine::{Dispatcher, Pipeline};
use syllab_gen::GeneratorSet;
use syllab_store::BuildStore;

use crate::config::ApiConfig;

/// Application-wide state shared across all routes.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn BuildStore>,
    pub dispatcher: Dispatcher,
    pub engine_config: EngineConfig,
    pub api_config: ApiConfig,
}

impl AppState {
    pub fn new(
        store: Arc<dyn BuildStore>,
        generators: GeneratorSet,
        engine_config: EngineConfig,
        api_config: ApiConfig,
    ) -> Self {
        let pipeline = Pipeline::new(store.clone(), generators, engine_config.clone());
        Self {
            store,
            dispatcher: Dispatcher::new(pipeline),
            engine_config,
            api_config,
        }
    }
}
