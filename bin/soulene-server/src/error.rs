//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors are converted to a JSON body
//! `{"error": "..."}` with an appropriate status code.
//!
//! Internal errors are logged with full detail but only a generic message is
//! returned to the caller.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use soulene_core::PipelineError;
use thiserror::Error;
use tracing::{error, warn};

/// All errors that can occur in the soulene-server request lifecycle.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Propagated from the safety pipeline.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// The caller sent an invalid or malformed request.
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl From<serde_json::Error> for ServerError {
    fn from(e: serde_json::Error) -> Self {
        ServerError::BadRequest(format!("invalid JSON body: {e}"))
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Pipeline(PipelineError::InvalidMessage(m)) => {
                (StatusCode::BAD_REQUEST, m.clone())
            }
            ServerError::Pipeline(e) => {
                if e.is_recoverable() {
                    warn!(error = %e, "pipeline error");
                } else {
                    error!(error = %e, "pipeline error");
                }
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use http_body_util::BodyExt;
    use serde_json::Value;

    use super::*;

    async fn body_of(err: ServerError) -> (StatusCode, Value) {
        let response = err.into_response();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn invalid_message_is_a_client_error() {
        let (status, body) = body_of(PipelineError::InvalidMessage("message is empty".into()).into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "message is empty");
    }

    #[tokio::test]
    async fn malformed_json_names_the_problem() {
        let err = serde_json::from_slice::<Value>(b"{not json").unwrap_err();
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or("").starts_with("invalid JSON body"));
    }

    #[tokio::test]
    async fn internal_detail_is_hidden() {
        let err = PipelineError::Configuration("secret key /etc/soulene".into());
        let (status, body) = body_of(err.into()).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "internal server error");
    }
}
