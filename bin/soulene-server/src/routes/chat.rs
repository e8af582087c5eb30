//! Chat routes: one safety-pipeline transaction per `POST /chat`.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tracing::info;

use crate::error::ServerError;
use crate::schemas::chat::{ChatRequest, ChatResponse, ClearRequest, ClearResponse};
use crate::state::AppState;

/// Register chat routes.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/chat", get(describe_chat).post(post_chat))
        .route("/chat/clear", post(clear_chat))
}

/// Usage hint for clients that `GET /chat`.
pub async fn describe_chat() -> Json<Value> {
    Json(json!({
        "message":         "This endpoint accepts POST requests",
        "required_fields": ["message"],
        "optional_fields": ["session_id"],
    }))
}

/// Run one message through the pipeline (`POST /chat`).
///
/// The body is read as JSON whatever its `Content-Type`. A missing or blank
/// `message` is a 400; every stage failure past that point degrades inside
/// the pipeline, so a reply is always returned.
pub async fn post_chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<ChatResponse>, ServerError> {
    let req: ChatRequest = serde_json::from_slice(&body)?;
    if req.message.trim().is_empty() {
        return Err(ServerError::BadRequest("No message provided".into()));
    }

    let session_id = req.session_id();
    info!(session_id, message_len = req.message.len(), "processing chat message");
    let outcome = state.pipeline.process_message(session_id, &req.message).await?;
    Ok(Json(outcome.into()))
}

/// Forget a session's history and memoized location (`POST /chat/clear`).
///
/// The body is optional; without one the default session is cleared.
pub async fn clear_chat(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<ClearResponse> {
    let req: ClearRequest = serde_json::from_slice(&body).unwrap_or_default();
    let cleared = state.pipeline.clear_session(req.session_id()).await;
    Json(ClearResponse {
        status: "cleared".to_owned(),
        session_id: cleared.session_id,
    })
}
