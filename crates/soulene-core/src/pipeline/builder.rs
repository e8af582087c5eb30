use std::sync::Arc;

use super::orchestrator::PipelineOrchestrator;
use crate::completion::TextCompletion;
use crate::config::PipelineConfig;
use crate::emergency_numbers::{EmergencyLookup, EmergencyNumberService, ModelEmergencyLookup};
use crate::history::ConversationHistoryStore;
use crate::location::{ConversationLocationResolver, LocationResolver};
use crate::loop_detect::LoopDetector;
use crate::stages::{DraftGenerator, EmergencyDetector, PreCheckAnalyzer, ResponseRefiner};
use crate::types::Stage;

/// Fluent constructor for [`PipelineOrchestrator`].
///
/// Only the text-completion capability is required. By default emergency
/// numbers are looked up through that same capability and the user's
/// location is read from the conversation.
///
/// ```rust,ignore
/// let pipeline = PipelineBuilder::new(completion)
///     .config(PipelineConfig::default())
///     .build();
/// let outcome = pipeline.process_message("session-1", "hey").await?;
/// ```
pub struct PipelineBuilder {
    completion: Arc<dyn TextCompletion>,
    config: PipelineConfig,
    lookup: Option<Arc<dyn EmergencyLookup>>,
    locations: Option<Arc<dyn LocationResolver>>,
}

impl PipelineBuilder {
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self {
            completion,
            config: PipelineConfig::default(),
            lookup: None,
            locations: Some(Arc::new(ConversationLocationResolver)),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the model-backed emergency number lookup.
    pub fn emergency_lookup(mut self, lookup: Arc<dyn EmergencyLookup>) -> Self {
        self.lookup = Some(lookup);
        self
    }

    /// Set the location resolver; `None` means the configured default
    /// location is always used.
    pub fn location_resolver(mut self, resolver: Option<Arc<dyn LocationResolver>>) -> Self {
        self.locations = resolver;
        self
    }

    pub fn build(self) -> PipelineOrchestrator {
        let config = self.config;
        let timeouts = config.timeouts;
        let completion = self.completion;
        let lookup: Arc<dyn EmergencyLookup> = match self.lookup {
            Some(lookup) => lookup,
            None => Arc::new(ModelEmergencyLookup::new(Arc::clone(&completion))),
        };

        PipelineOrchestrator {
            history: ConversationHistoryStore::new(config.max_history),
            loops: LoopDetector::from_config(&config),
            precheck: PreCheckAnalyzer::new(
                Arc::clone(&completion),
                timeouts.for_stage(Stage::PreCheck),
            ),
            emergency: EmergencyDetector::new(
                Arc::clone(&completion),
                timeouts.for_stage(Stage::EmergencyCheck),
            ),
            drafter: DraftGenerator::new(Arc::clone(&completion), timeouts.for_stage(Stage::Drafting)),
            refiner: ResponseRefiner::new(completion, timeouts.for_stage(Stage::Refining)),
            numbers: EmergencyNumberService::new(
                lookup,
                config.emergency_ttl,
                timeouts.for_stage(Stage::EmergencyLookup),
            ),
            locations: self.locations,
            config,
        }
    }
}
