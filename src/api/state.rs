use std::sync::Arc;

use crate::services::RankingEngine;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<RankingEngine>,
}

impl AppState {
    pub fn new(engine: RankingEngine) -> Self {
        Self {
            engine: Arc::new(engine),
        }
    }
}
