use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use super::prompts;
use crate::completion::{CompletionRequest, TextCompletion};
use crate::error::{with_timeout, PipelineError};
use crate::parse::{label, parse_json_object};
use crate::types::{Confidence, EmergencyResult, EmergencyType, Stage, Turn};

#[derive(Debug, Deserialize)]
struct RawEmergency {
    is_emergency: bool,
    #[serde(default = "no_emergency", deserialize_with = "label")]
    emergency_type: EmergencyType,
    #[serde(default = "low_confidence", deserialize_with = "label")]
    confidence: Confidence,
}

fn no_emergency() -> EmergencyType {
    EmergencyType::None
}

fn low_confidence() -> Confidence {
    Confidence::Low
}

impl RawEmergency {
    /// Only medium- or high-confidence positives with a concrete type count.
    fn normalize(self) -> EmergencyResult {
        let counts = self.is_emergency
            && self.confidence != Confidence::Low
            && self.emergency_type != EmergencyType::None;
        if counts {
            EmergencyResult {
                is_emergency: true,
                emergency_type: self.emergency_type,
                confidence: self.confidence,
            }
        } else {
            EmergencyResult {
                confidence: self.confidence,
                ..EmergencyResult::none()
            }
        }
    }
}

/// Classifies the message for explicit, acute crisis content.
///
/// Runs independently of the pre-check; the two verdicts may disagree.
pub struct EmergencyDetector {
    completion: Arc<dyn TextCompletion>,
    timeout: Duration,
}

impl EmergencyDetector {
    pub fn new(completion: Arc<dyn TextCompletion>, timeout: Duration) -> Self {
        Self {
            completion,
            timeout,
        }
    }

    /// Never fails: errors and timeouts yield [`EmergencyResult::none`].
    pub async fn detect(&self, message: &str, context: &[Turn]) -> EmergencyResult {
        match with_timeout(
            Stage::EmergencyCheck,
            self.timeout,
            self.classify(message, context),
        )
        .await
        {
            Ok(result) => {
                debug!(
                    is_emergency = result.is_emergency,
                    emergency_type = %result.emergency_type,
                    confidence = %result.confidence,
                    "emergency check classified"
                );
                result
            }
            Err(e) => {
                warn!(
                    provider = %self.completion.name(),
                    error = %e,
                    "emergency check degraded; assuming no emergency"
                );
                EmergencyResult::none()
            }
        }
    }

    async fn classify(&self, message: &str, context: &[Turn]) -> Result<EmergencyResult, PipelineError> {
        let request = CompletionRequest::new(
            Stage::EmergencyCheck,
            prompts::emergency_prompt(message, context),
        )
        .system(prompts::EMERGENCY_SYSTEM)
        .temperature(0.0);

        let raw = self.completion.complete(request).await?;
        let parsed: RawEmergency = parse_json_object(&raw)
            .map_err(|message| PipelineError::classification(Stage::EmergencyCheck, message))?;
        Ok(parsed.normalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCompletion;
    use tracing_test::traced_test;

    fn detector(reply: &str) -> EmergencyDetector {
        let completion = ScriptedCompletion::new().reply(Stage::EmergencyCheck, reply);
        EmergencyDetector::new(Arc::new(completion), Duration::from_secs(5))
    }

    #[tokio::test]
    async fn high_confidence_emergency() {
        let result = detector(
            r#"{"is_emergency": true, "emergency_type": "suicide", "confidence": "high"}"#,
        )
        .detect("the pills are ready", &[])
        .await;
        assert!(result.is_emergency);
        assert_eq!(result.emergency_type, EmergencyType::Suicide);
    }

    #[tokio::test]
    async fn capitalized_labels_still_count() {
        let result = detector(
            r#"{"is_emergency": true, "emergency_type": "Suicide", "confidence": "High"}"#,
        )
        .detect("the pills are ready", &[])
        .await;
        assert!(result.is_emergency);
        assert_eq!(result.emergency_type, EmergencyType::Suicide);
        assert_eq!(result.confidence, Confidence::High);

        let result = detector(
            r#"{"is_emergency": true, "emergency_type": "self-harm", "confidence": "MEDIUM"}"#,
        )
        .detect("I cut again tonight", &[])
        .await;
        assert!(result.is_emergency);
        assert_eq!(result.emergency_type, EmergencyType::SelfHarm);
    }

    #[tokio::test]
    async fn low_confidence_is_downgraded() {
        let result = detector(
            r#"{"is_emergency": true, "emergency_type": "medical", "confidence": "low"}"#,
        )
        .detect("my head hurts", &[])
        .await;
        assert!(!result.is_emergency);
        assert_eq!(result.emergency_type, EmergencyType::None);
        assert_eq!(result.confidence, Confidence::Low);
    }

    #[tokio::test]
    async fn emergency_without_type_is_normalized() {
        let result = detector(r#"{"is_emergency": true, "emergency_type": "none", "confidence": "high"}"#)
            .detect("help", &[])
            .await;
        assert!(!result.is_emergency);
    }

    #[tokio::test]
    #[traced_test]
    async fn failure_assumes_no_emergency() {
        let completion = ScriptedCompletion::new().fail(Stage::EmergencyCheck);
        let result = EmergencyDetector::new(Arc::new(completion), Duration::from_secs(5))
            .detect("hello", &[])
            .await;
        assert_eq!(result, EmergencyResult::none());
        assert!(logs_contain("emergency check degraded"));
        assert!(logs_contain("provider=scripted"));
    }

    #[tokio::test]
    async fn missing_flag_is_malformed() {
        let result = detector(r#"{"emergency_type": "suicide"}"#).detect("x", &[]).await;
        assert_eq!(result, EmergencyResult::none());
    }
}
