use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use super::draft::{Draft, FALLBACK_REPLY};
use super::prompts;
use crate::completion::{CompletionRequest, TextCompletion};
use crate::emergency_numbers::{default_info, format_emergency_numbers};
use crate::error::{with_timeout, PipelineError};
use crate::types::{EmergencyInfo, EmergencyResult, RiskAssessment, Stage, Turn};

/// Written by the persona wherever a local emergency number belongs.
pub const EMERGENCY_PLACEHOLDER: &str = "[EMERGENCY_NUMBER]";

const REFINED_LABEL: &str = "refined reply:";

/// The refiner's verdict on a draft.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Refinement {
    pub reply: String,
    /// The reply differs from the draft text.
    pub modified: bool,
    /// The refining model produced the reply. `false` means the draft (or the
    /// fallback) went out unreviewed.
    pub refined: bool,
    /// The reply carries emergency numbers.
    pub resources_attached: bool,
}

/// Append a call-to-action with `info`'s numbers unless `reply` already
/// mentions one of them.
pub fn attach_resources(reply: &str, info: &EmergencyInfo) -> String {
    if info.mentioned_in(reply) {
        return reply.to_owned();
    }
    let reply = reply.trim_end();
    let separator = match reply.chars().last() {
        None => "",
        Some('.' | '!' | '?') => " ",
        Some(_) => ". ",
    };
    format!(
        "{reply}{separator}If you're in danger right now, please call {}.",
        format_emergency_numbers(info)
    )
}

/// Strip labels and wrapping quotes the model sometimes adds.
fn clean_output(raw: &str) -> Result<String, PipelineError> {
    let mut text = raw.trim();
    if let Some(idx) = text.to_ascii_lowercase().find(REFINED_LABEL) {
        text = text[idx + REFINED_LABEL.len()..].trim();
    }
    if text.len() >= 2 && text.starts_with('"') && text.ends_with('"') {
        text = text[1..text.len() - 1].trim();
    }
    if text.is_empty() {
        return Err(PipelineError::generation(Stage::Refining, "empty refinement"));
    }
    Ok(text.to_owned())
}

/// Reviews the draft against safety and quality constraints and makes sure
/// emergency replies carry numbers.
pub struct ResponseRefiner {
    completion: Arc<dyn TextCompletion>,
    timeout: Duration,
}

impl ResponseRefiner {
    pub fn new(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion,
            timeout,
        }
    }

    /// Refine `draft`. Never fails: on error the draft is returned as is,
    /// flagged unrefined.
    ///
    /// `info` supplies the numbers for placeholders and for emergency replies;
    /// without it the hardcoded defaults are used.
    pub async fn refine(
        &self,
        draft: &Draft,
        message: &str,
        context: &[Turn],
        assessment: &RiskAssessment,
        emergency: &EmergencyResult,
        info: Option<&EmergencyInfo>,
    ) -> Refinement {
        let (text, refined) = match draft {
            Draft::Fallback => {
                debug!("fallback draft; skipping refinement");
                (FALLBACK_REPLY.to_owned(), false)
            }
            Draft::Generated(draft_text) => {
                let revised = with_timeout(
                    Stage::Refining,
                    self.timeout,
                    self.revise(draft_text, message, context, assessment, emergency),
                )
                .await;
                match revised {
                    Ok(text) => (text, true),
                    Err(e) => {
                        warn!(
                            provider = %self.completion.name(),
                            error = %e,
                            "refinement degraded; sending draft unrefined"
                        );
                        (draft_text.clone(), false)
                    }
                }
            }
        };

        let defaults;
        let numbers = match info {
            Some(info) => info,
            None => {
                defaults = default_info();
                &defaults
            }
        };

        let substituted = text.contains(EMERGENCY_PLACEHOLDER);
        let mut reply = text.replace(EMERGENCY_PLACEHOLDER, &format_emergency_numbers(numbers));
        if emergency.is_emergency {
            reply = attach_resources(&reply, numbers);
        }

        Refinement {
            modified: reply != draft.text(),
            resources_attached: substituted || emergency.is_emergency,
            reply,
            refined,
        }
    }

    async fn revise(
        &self,
        draft: &str,
        message: &str,
        context: &[Turn],
        assessment: &RiskAssessment,
        emergency: &EmergencyResult,
    ) -> Result<String, PipelineError> {
        let request = CompletionRequest::new(
            Stage::Refining,
            prompts::refine_prompt(message, context, draft, assessment, emergency),
        )
        .system(prompts::REFINER_SYSTEM)
        .temperature(0.3);

        let raw = self.completion.complete(request).await?;
        clean_output(&raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use crate::types::{Confidence, EmergencyContact, EmergencyType};
    use chrono::Utc;

    fn refiner(completion: Arc<ScriptedCompletion>) -> ResponseRefiner {
        ResponseRefiner::new(completion, Duration::from_secs(30))
    }

    fn suicide() -> EmergencyResult {
        EmergencyResult {
            is_emergency: true,
            emergency_type: EmergencyType::Suicide,
            confidence: Confidence::High,
        }
    }

    fn kenya() -> EmergencyInfo {
        EmergencyInfo {
            location: "Kenya".into(),
            contacts: vec![EmergencyContact::new("police", "999")],
            verified: true,
            source: "test".into(),
            cached_at: Utc::now(),
        }
    }

    async fn run(
        completion: ScriptedCompletion,
        draft: Draft,
        emergency: EmergencyResult,
        info: Option<&EmergencyInfo>,
    ) -> (Arc<ScriptedCompletion>, Refinement) {
        let completion = Arc::new(completion);
        let out = refiner(completion.clone())
            .refine(&draft, "msg", &[], &RiskAssessment::clear(), &emergency, info)
            .await;
        (completion, out)
    }

    #[test]
    fn cleanup_strips_label_and_quotes() {
        assert_eq!(
            clean_output("Refined reply: \"You're not alone.\"").unwrap(),
            "You're not alone."
        );
        assert!(clean_output("  \"\" ").is_err());
    }

    #[tokio::test]
    async fn unchanged_draft_is_not_modified() {
        let (_, out) = run(
            ScriptedCompletion::new().reply(Stage::Refining, "That sounds exhausting."),
            Draft::Generated("That sounds exhausting.".into()),
            EmergencyResult::none(),
            None,
        )
        .await;
        assert!(out.refined);
        assert!(!out.modified);
        assert!(!out.resources_attached);
    }

    #[tokio::test]
    async fn failure_returns_draft_unrefined() {
        let (_, out) = run(
            ScriptedCompletion::new().fail(Stage::Refining),
            Draft::Generated("Rough day.".into()),
            EmergencyResult::none(),
            None,
        )
        .await;
        assert_eq!(out.reply, "Rough day.");
        assert!(!out.refined);
    }

    #[tokio::test]
    async fn fallback_draft_skips_model() {
        let (completion, out) = run(
            ScriptedCompletion::new().reply(Stage::Refining, "polished"),
            Draft::Fallback,
            EmergencyResult::none(),
            None,
        )
        .await;
        assert_eq!(out.reply, FALLBACK_REPLY);
        assert!(!out.refined);
        assert_eq!(completion.calls(Stage::Refining), 0);
    }

    #[tokio::test]
    async fn emergency_reply_gets_numbers() {
        let info = kenya();
        let (_, out) = run(
            ScriptedCompletion::new().reply(Stage::Refining, "Please stay with me"),
            Draft::Generated("Stay with me.".into()),
            suicide(),
            Some(&info),
        )
        .await;
        assert_eq!(
            out.reply,
            "Please stay with me. If you're in danger right now, please call 999 (police)."
        );
        assert!(out.resources_attached);
        assert!(out.modified);
    }

    #[tokio::test]
    async fn placeholder_uses_defaults_without_info() {
        let (_, out) = run(
            ScriptedCompletion::new().reply(Stage::Refining, "Call [EMERGENCY_NUMBER] now."),
            Draft::Generated("Call [EMERGENCY_NUMBER].".into()),
            EmergencyResult::none(),
            None,
        )
        .await;
        assert!(!out.reply.contains(EMERGENCY_PLACEHOLDER));
        assert!(out.reply.contains("AASRA 9820466726 (crisis line)"));
        assert!(out.resources_attached);
    }

    #[tokio::test]
    async fn embedded_numbers_are_not_repeated() {
        let info = kenya();
        let (_, out) = run(
            ScriptedCompletion::new().reply(Stage::Refining, "Urgent, call [EMERGENCY_NUMBER] now."),
            Draft::Generated("Urgent.".into()),
            suicide(),
            Some(&info),
        )
        .await;
        assert_eq!(out.reply, "Urgent, call 999 (police) now.");
    }

    #[test]
    fn attach_resources_handles_punctuation() {
        let info = kenya();
        assert_eq!(
            attach_resources("", &info),
            "If you're in danger right now, please call 999 (police)."
        );
        assert!(attach_resources("Are you safe?", &info).starts_with("Are you safe? If"));
    }
}
