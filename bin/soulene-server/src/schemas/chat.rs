//! Request / response bodies for the chat routes.

use serde::{Deserialize, Serialize};
use soulene_core::{ChatOutcome, EmergencyType, RiskAssessment};

/// Session used when the caller does not name one.
pub const DEFAULT_SESSION: &str = "default";

/// Request body for `POST /chat`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatRequest {
    /// The user's message. Missing and blank are both rejected.
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ChatRequest {
    pub fn session_id(&self) -> &str {
        session_or_default(self.session_id.as_deref())
    }
}

/// Request body for `POST /chat/clear`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClearRequest {
    #[serde(default)]
    pub session_id: Option<String>,
}

impl ClearRequest {
    pub fn session_id(&self) -> &str {
        session_or_default(self.session_id.as_deref())
    }
}

/// Response body for `POST /chat`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub is_emergency: bool,
    pub emergency_type: EmergencyType,
    pub risk_assessment: RiskAssessment,
    pub loop_detected: bool,
    /// `true` when the fixed intervention message replaced the reply.
    pub intervention: bool,
}

impl From<ChatOutcome> for ChatResponse {
    fn from(outcome: ChatOutcome) -> Self {
        Self {
            reply: outcome.reply,
            is_emergency: outcome.is_emergency,
            emergency_type: outcome.emergency_type,
            risk_assessment: outcome.risk_assessment,
            loop_detected: outcome.loop_detected,
            intervention: outcome.intervention,
        }
    }
}

/// Response body for `POST /chat/clear`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClearResponse {
    pub status: String,
    pub session_id: String,
}

fn session_or_default(id: Option<&str>) -> &str {
    match id.map(str::trim) {
        Some(id) if !id.is_empty() => id,
        _ => DEFAULT_SESSION,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_deserialize_to_defaults() {
        let req: ChatRequest = serde_json::from_str("{}").unwrap();
        assert!(req.message.is_empty());
        assert_eq!(req.session_id(), DEFAULT_SESSION);
    }

    #[test]
    fn blank_session_id_falls_back_to_default() {
        let req: ClearRequest = serde_json::from_str(r#"{"session_id": "  "}"#).unwrap();
        assert_eq!(req.session_id(), DEFAULT_SESSION);
        let req: ClearRequest = serde_json::from_str(r#"{"session_id": "abc"}"#).unwrap();
        assert_eq!(req.session_id(), "abc");
    }
}
