//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use soulene_core::PipelineOrchestrator;

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// The safety pipeline and the conversation history it owns.
    pub pipeline: Arc<PipelineOrchestrator>,
}
