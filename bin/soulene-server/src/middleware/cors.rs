use std::sync::Arc;

use axum::http::HeaderValue;
use tower_http::cors::{Any, CorsLayer};

use crate::state::AppState;

pub fn cors_layer(state: &Arc<AppState>) -> CorsLayer {
    let cors = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    let origins = state
        .config
        .cors_allowed_origins
        .as_deref()
        .map(parse_origins)
        .unwrap_or_default();

    if origins.is_empty() {
        // Wildcard; set SOULENE_CORS_ORIGINS in production.
        cors.allow_origin(Any)
    } else {
        cors.allow_origin(origins)
    }
}

/// Comma-separated origins; blank and unparsable entries are skipped.
fn parse_origins(list: &str) -> Vec<HeaderValue> {
    list.split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| origin.parse().ok())
        .collect()
}
