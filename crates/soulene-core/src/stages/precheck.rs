use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::prompts;
use crate::completion::{CompletionRequest, TextCompletion};
use crate::error::{with_timeout, PipelineError};
use crate::loop_detect::LoopPattern;
use crate::parse::{label, parse_json_object};
use crate::types::{InterventionType, RiskAssessment, RiskLevel, RiskType, Stage, Turn};

/// Classifier output as the model writes it. Only `risk_level` is mandatory.
#[derive(Debug, Deserialize)]
struct RawAssessment {
    #[serde(deserialize_with = "label")]
    risk_level: RiskLevel,
    #[serde(default = "no_risk", deserialize_with = "label")]
    risk_type: RiskType,
    #[serde(default)]
    requires_intervention: bool,
    #[serde(default = "no_intervention", deserialize_with = "label")]
    intervention_type: InterventionType,
    #[serde(default)]
    context_notes: String,
    #[serde(default)]
    block_response: bool,
}

fn no_risk() -> RiskType {
    RiskType::None
}

fn no_intervention() -> InterventionType {
    InterventionType::None
}

/// Screens the incoming message for latent risk before any reply is drafted.
pub struct PreCheckAnalyzer {
    completion: Arc<dyn TextCompletion>,
    timeout: Duration,
}

impl PreCheckAnalyzer {
    pub fn new(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion,
            timeout,
        }
    }

    /// Classify `message`. Never fails: errors and timeouts yield
    /// [`RiskAssessment::fail_safe`].
    pub async fn analyze(
        &self,
        message: &str,
        context: &[Turn],
        loop_hint: Option<&LoopPattern>,
    ) -> RiskAssessment {
        let classified = with_timeout(
            Stage::PreCheck,
            self.timeout,
            self.classify(message, context, loop_hint),
        )
        .await;

        match classified {
            Ok(assessment) => {
                debug!(
                    risk_level = %assessment.risk_level,
                    risk_type = %assessment.risk_type,
                    block = assessment.block_response,
                    "pre-check classified"
                );
                assessment
            }
            Err(e) => {
                warn!(
                    provider = %self.completion.name(),
                    error = %e,
                    "pre-check degraded; using fail-safe assessment"
                );
                RiskAssessment::fail_safe()
            }
        }
    }

    async fn classify(
        &self,
        message: &str,
        context: &[Turn],
        loop_hint: Option<&LoopPattern>,
    ) -> Result<RiskAssessment, PipelineError> {
        let hint = loop_hint.map(ToString::to_string);
        let request = CompletionRequest::new(
            Stage::PreCheck,
            prompts::precheck_prompt(message, context, hint.as_deref()),
        )
        .system(prompts::PRECHECK_SYSTEM)
        .temperature(0.0);

        let raw = self.completion.complete(request).await?;
        let parsed: RawAssessment = parse_json_object(&raw)
            .map_err(|message| PipelineError::classification(Stage::PreCheck, message))?;
        Ok(validate(parsed, loop_hint))
    }
}

fn validate(raw: RawAssessment, loop_hint: Option<&LoopPattern>) -> RiskAssessment {
    let mut assessment = RiskAssessment {
        risk_level: raw.risk_level,
        risk_type: raw.risk_type,
        requires_intervention: raw.requires_intervention,
        intervention_type: raw.intervention_type,
        block_response: raw.block_response,
        context_notes: raw.context_notes.trim().to_owned(),
        degraded: false,
    };

    if assessment.block_response {
        if assessment.risk_level == RiskLevel::High {
            assessment.requires_intervention = true;
        } else {
            warn!(risk_level = %assessment.risk_level, "ignoring block_response below high risk");
            assessment.block_response = false;
        }
    }

    if let Some(pattern) = loop_hint {
        if assessment.risk_type == RiskType::None {
            debug!(%pattern, "raising assessment for pending loop");
            assessment.risk_type = RiskType::LoopPattern;
            assessment.intervention_type = InterventionType::AlternateStrategy;
            assessment.requires_intervention = true;
            assessment.risk_level = assessment.risk_level.at_least(RiskLevel::Low);
        }
    }

    assessment
}
