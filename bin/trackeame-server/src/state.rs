//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use trackeame_core::{Pipeline, SqliteStore};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Registration entry point and queue; also owns the store.
    pub pipeline: Arc<Pipeline<SqliteStore>>,
}

impl AppState {
    pub fn store(&self) -> &SqliteStore {
        self.pipeline.store()
    }
}
