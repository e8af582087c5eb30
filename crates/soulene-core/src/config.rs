//! Pipeline tunables.
//!
//! Every field has a default matching the production service, so
//! `PipelineConfig::default()` is a working configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::Stage;

/// Per-stage deadlines for calls to external capabilities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTimeouts {
    pub precheck: Duration,
    pub emergency: Duration,
    pub draft: Duration,
    pub refine: Duration,
    pub lookup: Duration,
}

impl StageTimeouts {
    /// The same deadline for every stage.
    pub fn uniform(after: Duration) -> Self {
        Self {
            precheck: after,
            emergency: after,
            draft: after,
            refine: after,
            lookup: after,
        }
    }

    pub fn for_stage(&self, stage: Stage) -> Duration {
        match stage {
            Stage::PreCheck => self.precheck,
            Stage::EmergencyCheck => self.emergency,
            Stage::Drafting => self.draft,
            Stage::Refining => self.refine,
            Stage::EmergencyLookup => self.lookup,
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            precheck: Duration::from_secs(15),
            emergency: Duration::from_secs(15),
            draft: Duration::from_secs(30),
            refine: Duration::from_secs(30),
            lookup: Duration::from_secs(20),
        }
    }
}

/// Configuration for [`PipelineOrchestrator`](crate::PipelineOrchestrator)
/// and the components it owns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Maximum turns retained per session; oldest are evicted first.
    pub max_history: usize,
    /// Number of recent turns handed to the stages as context.
    pub context_window: usize,
    /// Number of recent assistant turns the loop detector inspects.
    pub loop_window: usize,
    /// Occurrences of one pattern (candidate included) that count as a loop.
    pub loop_threshold: usize,
    /// Word-trigram Jaccard similarity at or above which two replies match.
    pub loop_similarity: f32,
    /// How long a looked-up set of emergency numbers stays valid.
    pub emergency_ttl: Duration,
    /// Location used for emergency numbers when none can be resolved.
    pub default_location: Option<String>,
    /// Upper bound on inbound message size in bytes.
    pub max_message_bytes: usize,
    pub timeouts: StageTimeouts,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_history: 50,
            context_window: 10,
            loop_window: 4,
            loop_threshold: 3,
            loop_similarity: 0.6,
            emergency_ttl: Duration::from_secs(6 * 60 * 60),
            default_location: Some("India".to_owned()),
            max_message_bytes: 8 * 1024,
            timeouts: StageTimeouts::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_service() {
        let cfg = PipelineConfig::default();
        assert_eq!(cfg.max_history, 50);
        assert_eq!(cfg.context_window, 10);
        assert_eq!(cfg.loop_threshold, 3);
        assert_eq!(cfg.timeouts.for_stage(Stage::Drafting), Duration::from_secs(30));
    }

    #[test]
    fn uniform_timeouts_apply_to_every_stage() {
        let t = StageTimeouts::uniform(Duration::from_secs(2));
        for stage in [
            Stage::PreCheck,
            Stage::EmergencyCheck,
            Stage::Drafting,
            Stage::Refining,
            Stage::EmergencyLookup,
        ] {
            assert_eq!(t.for_stage(stage), Duration::from_secs(2));
        }
    }
}
