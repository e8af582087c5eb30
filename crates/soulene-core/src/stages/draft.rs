use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::prompts;
use crate::completion::{CompletionRequest, TextCompletion};
use crate::error::{with_timeout, PipelineError};
use crate::types::{EmergencyResult, RiskAssessment, Stage, Turn};

/// Sent whenever a draft cannot be generated.
pub const FALLBACK_REPLY: &str =
    "I'm here with you. I'm struggling to find the right words just now, but I'm listening.";

/// Output of the drafting stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Draft {
    Generated(String),
    /// Generation failed; the refiner must not polish this.
    Fallback,
}

impl Draft {
    pub fn text(&self) -> &str {
        match self {
            Draft::Generated(text) => text,
            Draft::Fallback => FALLBACK_REPLY,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, Draft::Fallback)
    }
}

/// Produces the candidate reply in the Soulene persona.
pub struct DraftGenerator {
    completion: Arc<dyn TextCompletion>,
    timeout: Duration,
}

impl DraftGenerator {
    pub fn new(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion,
            timeout,
        }
    }

    /// Never fails: errors, empty output and timeouts yield [`Draft::Fallback`].
    pub async fn generate(
        &self,
        message: &str,
        context: &[Turn],
        assessment: &RiskAssessment,
        emergency: &EmergencyResult,
    ) -> Draft {
        let request = CompletionRequest::new(Stage::Drafting, message)
            .system(prompts::persona_system(assessment, emergency))
            .history(context.to_vec())
            .temperature(0.7);

        let generated = with_timeout(Stage::Drafting, self.timeout, self.draft_text(request)).await;

        match generated {
            Ok(text) => {
                debug!(chars = text.len(), "draft generated");
                Draft::Generated(text)
            }
            Err(e) => {
                warn!(
                    provider = %self.completion.name(),
                    error = %e,
                    "drafting degraded; using fallback reply"
                );
                Draft::Fallback
            }
        }
    }

    async fn draft_text(&self, request: CompletionRequest) -> Result<String, PipelineError> {
        let text = self.completion.complete(request).await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(PipelineError::generation(Stage::Drafting, "empty draft"));
        }
        Ok(text.to_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use crate::types::{EmergencyType, Role};
    use chrono::Utc;

    fn generator(completion: Arc<ScriptedCompletion>) -> DraftGenerator {
        DraftGenerator::new(completion, Duration::from_secs(30))
    }

    #[tokio::test]
    async fn sends_context_as_history() {
        let completion = Arc::new(ScriptedCompletion::new().reply(Stage::Drafting, " That's heavy. "));
        let context = vec![Turn {
            role: Role::User,
            content: "rough week".into(),
            created_at: Utc::now(),
        }];
        let draft = generator(completion.clone())
            .generate("still rough", &context, &RiskAssessment::clear(), &EmergencyResult::none())
            .await;

        assert_eq!(draft, Draft::Generated("That's heavy.".into()));
        let request = &completion.requests(Stage::Drafting)[0];
        assert_eq!(request.history.len(), 1);
        assert_eq!(request.prompt, "still rough");
    }

    #[tokio::test]
    async fn emergency_shapes_persona() {
        let completion = Arc::new(ScriptedCompletion::new().reply(Stage::Drafting, "Call now."));
        let emergency = EmergencyResult {
            is_emergency: true,
            emergency_type: EmergencyType::Suicide,
            confidence: crate::types::Confidence::High,
        };
        generator(completion.clone())
            .generate("pills", &[], &RiskAssessment::clear(), &emergency)
            .await;
        let system = completion.requests(Stage::Drafting)[0].system.clone().unwrap();
        assert!(system.contains("suicide emergency"));
    }

    #[tokio::test]
    async fn empty_completion_falls_back() {
        let completion = Arc::new(ScriptedCompletion::new().reply(Stage::Drafting, "   "));
        let draft = generator(completion)
            .generate("hi", &[], &RiskAssessment::clear(), &EmergencyResult::none())
            .await;
        assert!(draft.is_fallback());
        assert_eq!(draft.text(), FALLBACK_REPLY);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_falls_back() {
        let completion = Arc::new(ScriptedCompletion::new().hang(Stage::Drafting));
        let draft = generator(completion)
            .generate("hi", &[], &RiskAssessment::clear(), &EmergencyResult::none())
            .await;
        assert_eq!(draft, Draft::Fallback);
    }
}
