//! The text-completion capability consumed by every model-backed stage.
//!
//! The pre-check, emergency, drafting and refining stages (and the emergency
//! number lookup) all talk to the language model through [`TextCompletion`];
//! they differ only in the prompt they build and how they parse the reply.

mod gemini;

use async_trait::async_trait;

use crate::error::PipelineError;
use crate::types::{Stage, Turn};

pub use gemini::{GeminiCompletion, GeminiConfig};

/// A single prompt-in, text-out request.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    /// Stage issuing the request; used for logging and by test doubles.
    pub stage: Stage,
    /// System instruction, if the stage has one.
    pub system: Option<String>,
    /// Prior turns sent as chat history (chronological).
    pub history: Vec<Turn>,
    /// The prompt for this call.
    pub prompt: String,
    /// Sampling temperature; `None` uses the provider default.
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(stage: Stage, prompt: impl Into<String>) -> Self {
        Self {
            stage,
            system: None,
            history: Vec::new(),
            prompt: prompt.into(),
            temperature: None,
        }
    }

    pub fn system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn history(mut self, history: Vec<Turn>) -> Self {
        self.history = history;
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }
}

/// An opaque text-completion service. Calls may fail or hang; callers wrap
/// every call in a stage timeout.
#[async_trait]
pub trait TextCompletion: Send + Sync {
    /// Provider name used in logs and errors.
    fn name(&self) -> &str;

    async fn complete(&self, request: CompletionRequest) -> Result<String, PipelineError>;
}
