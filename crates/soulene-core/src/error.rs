use std::time::Duration;

use thiserror::Error;

use crate::types::Stage;

/// Errors produced by the pipeline and its stages.
///
/// Everything except [`PipelineError::Configuration`] and
/// [`PipelineError::InvalidMessage`] is a per-message condition: stage
/// boundaries convert it into that stage's fail-safe default and log it, so it
/// never reaches a caller of
/// [`PipelineOrchestrator::process_message`](crate::PipelineOrchestrator::process_message).
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The pre-check or emergency classifier returned nothing usable.
    #[error("{stage} classification failed: {message}")]
    Classification { stage: Stage, message: String },

    /// The drafting or refining stage could not produce text.
    #[error("{stage} generation failed: {message}")]
    Generation { stage: Stage, message: String },

    /// The emergency-number lookup failed or returned no usable numbers.
    #[error("emergency number lookup failed: {message}")]
    Lookup { message: String },

    /// The external text-completion service rejected or dropped a request.
    #[error("text completion via '{provider}' failed: {message}")]
    Completion { provider: String, message: String },

    /// A stage exceeded its individual deadline.
    #[error("{stage} timed out after {}ms", .after.as_millis())]
    Timeout { stage: Stage, after: Duration },

    /// Missing or invalid configuration; fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The inbound message was rejected before the pipeline started.
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}

impl PipelineError {
    pub fn classification(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Classification {
            stage,
            message: message.into(),
        }
    }

    pub fn generation(stage: Stage, message: impl Into<String>) -> Self {
        PipelineError::Generation {
            stage,
            message: message.into(),
        }
    }

    /// Returns `true` for the per-message failures that stages absorb.
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            PipelineError::Configuration(_) | PipelineError::InvalidMessage(_)
        )
    }
}

/// Run `fut` with a deadline, mapping expiry to [`PipelineError::Timeout`].
pub(crate) async fn with_timeout<T, F>(stage: Stage, after: Duration, fut: F) -> Result<T, PipelineError>
where
    F: std::future::Future<Output = Result<T, PipelineError>>,
{
    match tokio::time::timeout(after, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Timeout { stage, after }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_message_names_stage() {
        let err = PipelineError::Timeout {
            stage: Stage::Drafting,
            after: Duration::from_millis(1500),
        };
        assert_eq!(err.to_string(), "drafting timed out after 1500ms");
        assert!(err.is_recoverable());
    }

    #[test]
    fn configuration_is_not_recoverable() {
        assert!(!PipelineError::Configuration("missing key".into()).is_recoverable());
    }

    #[tokio::test(start_paused = true)]
    async fn with_timeout_expires() {
        let result: Result<(), _> = with_timeout(
            Stage::Refining,
            Duration::from_secs(1),
            std::future::pending(),
        )
        .await;
        assert!(matches!(
            result,
            Err(PipelineError::Timeout { stage: Stage::Refining, .. })
        ));
    }
}
