//! [`TextCompletion`] over the Generative Language `generateContent` REST API.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{CompletionRequest, TextCompletion};
use crate::error::PipelineError;
use crate::types::Role;

const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-2.0-flash";
const PROVIDER: &str = "gemini";

/// Connection settings for [`GeminiCompletion`].
#[derive(Debug, Clone)]
pub struct GeminiConfig {
    pub api_key: String,
    pub model: String,
    pub api_base: String,
}

impl GeminiConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_owned(),
            api_base: DEFAULT_API_BASE.to_owned(),
        }
    }
}

/// Gemini-backed text completion.
#[derive(Debug, Clone)]
pub struct GeminiCompletion {
    config: GeminiConfig,
    client: Client,
}

impl GeminiCompletion {
    /// Build a client. A blank API key is a configuration error.
    pub fn new(config: GeminiConfig) -> Result<Self, PipelineError> {
        if config.api_key.trim().is_empty() {
            return Err(PipelineError::Configuration(
                "a Gemini API key is required".into(),
            ));
        }
        let client = Client::builder()
            .user_agent(concat!("soulene/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PipelineError::Configuration(format!("http client: {e}")))?;
        Ok(Self { config, client })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.api_base.trim_end_matches('/'),
            self.config.model
        )
    }

    fn error(message: impl Into<String>) -> PipelineError {
        PipelineError::Completion {
            provider: PROVIDER.to_owned(),
            message: message.into(),
        }
    }
}

// ── Wire types ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
struct Part {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

fn text_content(role: Option<&str>, text: impl Into<String>) -> Content {
    Content {
        role: role.map(str::to_owned),
        parts: vec![Part { text: text.into() }],
    }
}

fn build_body(request: &CompletionRequest) -> GenerateRequest {
    let mut contents: Vec<Content> = request
        .history
        .iter()
        .map(|turn| {
            let role = match turn.role {
                Role::User => "user",
                Role::Assistant => "model",
            };
            text_content(Some(role), turn.content.as_str())
        })
        .collect();
    contents.push(text_content(Some("user"), request.prompt.as_str()));

    GenerateRequest {
        system_instruction: request.system.as_deref().map(|s| text_content(None, s)),
        contents,
        generation_config: request
            .temperature
            .map(|temperature| GenerationConfig { temperature }),
    }
}

fn extract_text(response: GenerateResponse) -> Option<String> {
    let text: String = response
        .candidates
        .into_iter()
        .next()?
        .content?
        .parts
        .into_iter()
        .map(|p| p.text)
        .collect();
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_owned())
}

#[async_trait]
impl TextCompletion for GeminiCompletion {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let body = build_body(&request);
        debug!(stage = %request.stage, model = %self.config.model, turns = body.contents.len(), "gemini request");

        let response = self
            .client
            .post(self.endpoint())
            .header("x-goog-api-key", &self.config.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Self::error(e.to_string()))?
            .error_for_status()
            .map_err(|e| Self::error(e.to_string()))?;

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Self::error(format!("invalid response body: {e}")))?;

        extract_text(parsed).ok_or_else(|| Self::error("response contained no text"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Stage, Turn};
    use chrono::Utc;

    #[test]
    fn blank_key_is_configuration_error() {
        let err = GeminiCompletion::new(GeminiConfig::new("  ")).unwrap_err();
        assert!(matches!(err, PipelineError::Configuration(_)));
    }

    #[test]
    fn body_maps_assistant_turns_to_model_role() {
        let history = vec![
            Turn { role: Role::User, content: "hi".into(), created_at: Utc::now() },
            Turn { role: Role::Assistant, content: "hey".into(), created_at: Utc::now() },
        ];
        let request = CompletionRequest::new(Stage::Drafting, "still here")
            .system("be kind")
            .history(history)
            .temperature(0.3);
        let body = serde_json::to_value(build_body(&request)).unwrap();

        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be kind");
        assert_eq!(body["contents"][1]["role"], "model");
        assert_eq!(body["contents"][2]["parts"][0]["text"], "still here");
        assert!((body["generationConfig"]["temperature"].as_f64().unwrap() - 0.3).abs() < 1e-6);
    }

    #[test]
    fn extract_text_joins_parts_and_rejects_empty() {
        let response: GenerateResponse = serde_json::from_value(serde_json::json!({
            "candidates": [{ "content": { "role": "model", "parts": [{"text": "Hey "}, {"text": "there"}] } }]
        }))
        .unwrap();
        assert_eq!(extract_text(response).as_deref(), Some("Hey there"));

        let empty: GenerateResponse = serde_json::from_value(serde_json::json!({ "candidates": [] })).unwrap();
        assert!(extract_text(empty).is_none());
    }
}
