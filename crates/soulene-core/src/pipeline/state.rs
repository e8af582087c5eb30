use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display};
use tracing::{debug, error};

/// The states one message passes through on its way to a reply.
///
/// ```text
/// Received → PreCheck ─┬→ InterventionTerminal
///                      └→ EmergencyCheck → Drafting → Refining → LoopCheck ─┬→ Override ──┬→ Finalized
///                                                                            └→ Passthrough ┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PipelineState {
    Received,
    PreCheck,
    /// The pre-check blocked drafting; the fixed intervention message is sent.
    InterventionTerminal,
    EmergencyCheck,
    Drafting,
    Refining,
    LoopCheck,
    /// The loop detector fired and the reply was replaced.
    Override,
    Passthrough,
    Finalized,
}

impl PipelineState {
    pub fn can_transition_to(self, next: PipelineState) -> bool {
        use PipelineState::*;
        matches!(
            (self, next),
            (Received, PreCheck)
                | (PreCheck, InterventionTerminal)
                | (PreCheck, EmergencyCheck)
                | (EmergencyCheck, Drafting)
                | (Drafting, Refining)
                | (Refining, LoopCheck)
                | (LoopCheck, Override)
                | (LoopCheck, Passthrough)
                | (Override, Finalized)
                | (Passthrough, Finalized)
        )
    }

    /// Returns `true` for the two states that append turns and return a reply.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineState::InterventionTerminal | PipelineState::Finalized
        )
    }
}

/// The path one transaction took through the state machine.
#[derive(Debug, Clone)]
pub(crate) struct Traversal {
    path: Vec<PipelineState>,
}

impl Traversal {
    pub(crate) fn start() -> Self {
        Self {
            path: vec![PipelineState::Received],
        }
    }

    pub(crate) fn current(&self) -> PipelineState {
        self.path
            .last()
            .copied()
            .unwrap_or(PipelineState::Received)
    }

    pub(crate) fn advance(&mut self, next: PipelineState) {
        let from = self.current();
        if !from.can_transition_to(next) {
            error!(%from, to = %next, "invalid pipeline transition");
            debug_assert!(false, "invalid pipeline transition {from} -> {next}");
        }
        debug!(%from, to = %next, "pipeline transition");
        self.path.push(next);
    }

    /// Hand back the path. A traversal is only finished once it has reached a
    /// terminal state.
    pub(crate) fn into_path(self) -> Vec<PipelineState> {
        let last = self.current();
        if !last.is_terminal() {
            error!(state = %last, "pipeline traversal ended outside a terminal state");
            debug_assert!(false, "pipeline traversal ended in {last}");
        }
        self.path
    }
}
