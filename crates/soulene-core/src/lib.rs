//! Soulene conversational safety pipeline.
//!
//! Every inbound message runs a risk pre-check, an emergency check, a
//! persona draft and a refining review before loop control decides whether
//! the reply is sent as-is or replaced. [`PipelineBuilder`] wires the stages
//! around a [`TextCompletion`] capability and returns a
//! [`PipelineOrchestrator`].

pub mod completion;
pub mod config;
pub mod emergency_numbers;
mod error;
pub mod history;
pub mod location;
pub mod loop_detect;
pub mod parse;
pub mod pipeline;
pub mod stages;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use completion::{CompletionRequest, GeminiCompletion, GeminiConfig, TextCompletion};
pub use config::{PipelineConfig, StageTimeouts};
pub use error::PipelineError;
pub use pipeline::builder::PipelineBuilder;
pub use pipeline::orchestrator::{
    ChatOutcome, Health, PipelineOrchestrator, SessionCleared, ALTERNATE_STRATEGIES,
    INTERVENTION_MESSAGE,
};
pub use pipeline::state::PipelineState;
pub use types::{
    EmergencyContact, EmergencyInfo, EmergencyResult, EmergencyType, RiskAssessment, RiskLevel,
    RiskType, Role, Stage, Turn,
};
