//! Health / heartbeat and service-info endpoints.

use std::sync::Arc;

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

/// Register health-check and root routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/health", get(get_health))
        .route("/", get(get_root))
}

/// Heartbeat endpoint.
///
/// Returns `{"status": "ok", "version": "...", "timestamp": "..."}` with
/// HTTP 200 and touches no session state.
pub async fn get_health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let health = state.pipeline.health();
    Json(json!({
        "status":    health.status,
        "version":   env!("CARGO_PKG_VERSION"),
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

pub async fn get_root() -> Json<Value> {
    Json(json!({
        "status":  "ok",
        "message": "Soulene server - use /chat (POST) for interactions",
        "endpoints": {
            "health": "/health",
            "chat":   "/chat",
            "clear":  "/chat/clear",
        },
    }))
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn root_lists_endpoints() {
        let Json(body) = get_root().await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["endpoints"]["clear"], "/chat/clear");
    }
}
