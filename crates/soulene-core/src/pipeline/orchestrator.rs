use std::sync::Arc;

use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};

use super::state::{PipelineState, Traversal};
use crate::config::PipelineConfig;
use crate::emergency_numbers::{default_info, EmergencyNumberService};
use crate::error::PipelineError;
use crate::history::{ConversationHistoryStore, Session};
use crate::location::LocationResolver;
use crate::loop_detect::LoopDetector;
use crate::stages::{
    attach_resources, DraftGenerator, EmergencyDetector, PreCheckAnalyzer, ResponseRefiner,
    EMERGENCY_PLACEHOLDER,
};
use crate::types::{EmergencyType, RiskAssessment, Role, Turn};

/// Fixed reply sent when the pre-check blocks drafting.
pub const INTERVENTION_MESSAGE: &str = "I'm really worried about you right now. Can you reach out \
     to someone who can help? Call emergency services or a crisis hotline.";

/// Replies that replace a looping one, tried in rotation. None of them uses a
/// grounding cue.
pub const ALTERNATE_STRATEGIES: &[&str] = &[
    "Let's try something different. What's one thing you could do right now, just for the next five minutes?",
    "Let's change tack. Is there one person you could message today, even with a single word?",
    "Let's look at this another way. What's the smallest thing that would make tonight a little easier?",
    "Okay, something new. If a friend were in your spot, what would you want them to try first?",
];

/// Result of one [`PipelineOrchestrator::process_message`] transaction.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatOutcome {
    pub reply: String,
    /// Verdict of the emergency check. Always `false` on the intervention
    /// path, where the check does not run; clients should treat
    /// `intervention` as the stronger signal.
    pub is_emergency: bool,
    pub emergency_type: EmergencyType,
    pub risk_assessment: RiskAssessment,
    pub loop_detected: bool,
    /// Pattern that triggered the loop override, if one did.
    pub loop_pattern: Option<String>,
    /// The fixed intervention message was sent instead of a drafted reply.
    pub intervention: bool,
    /// The refining model reviewed the reply.
    pub refined: bool,
    /// The reply actually sent carries emergency numbers.
    pub resources_attached: bool,
    /// States visited, in order.
    pub states: Vec<PipelineState>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionCleared {
    pub session_id: String,
    /// Whether the session had any state before the clear.
    pub existed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Health {
    pub status: &'static str,
}

/// Sequences the stages into one request-to-reply transaction per message.
///
/// Transactions on the same session id are serialized by the session's lock;
/// different sessions run independently. Turns are appended only when a
/// transaction reaches a terminal state, so dropping the future returned by
/// [`process_message`](Self::process_message) leaves history untouched.
pub struct PipelineOrchestrator {
    pub(super) config: PipelineConfig,
    pub(super) history: ConversationHistoryStore,
    pub(super) loops: LoopDetector,
    pub(super) precheck: PreCheckAnalyzer,
    pub(super) emergency: EmergencyDetector,
    pub(super) drafter: DraftGenerator,
    pub(super) refiner: ResponseRefiner,
    pub(super) numbers: EmergencyNumberService,
    pub(super) locations: Option<Arc<dyn LocationResolver>>,
}

impl PipelineOrchestrator {
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn history(&self) -> &ConversationHistoryStore {
        &self.history
    }

    /// Liveness signal; touches no pipeline state.
    pub fn health(&self) -> Health {
        Health { status: "ok" }
    }

    pub async fn clear_session(&self, session_id: &str) -> SessionCleared {
        let existed = self.history.clear(session_id).await;
        info!(session_id, existed, "session cleared");
        SessionCleared {
            session_id: session_id.to_owned(),
            existed,
        }
    }

    /// Turn `message` into a vetted reply for `session_id`.
    ///
    /// Stage failures degrade to safe defaults; the only error is
    /// [`PipelineError::InvalidMessage`] for empty or oversized input, in
    /// which case nothing is recorded.
    pub async fn process_message(
        &self,
        session_id: &str,
        message: &str,
    ) -> Result<ChatOutcome, PipelineError> {
        let message = self.validate(message)?;
        let outcome = self
            .run(session_id, message)
            .instrument(info_span!("pipeline", session_id))
            .await;
        Ok(outcome)
    }

    fn validate<'a>(&self, message: &'a str) -> Result<&'a str, PipelineError> {
        let trimmed = message.trim();
        if trimmed.is_empty() {
            return Err(PipelineError::InvalidMessage("message is empty".into()));
        }
        if trimmed.len() > self.config.max_message_bytes {
            return Err(PipelineError::InvalidMessage(format!(
                "message exceeds {} bytes",
                self.config.max_message_bytes
            )));
        }
        Ok(trimmed)
    }

    async fn run(&self, session_id: &str, message: &str) -> ChatOutcome {
        let handle = self.history.session(session_id).await;
        let mut session = handle.lock().await;
        let mut traversal = Traversal::start();

        let turns: Vec<Turn> = session.turns().iter().cloned().collect();
        let context = session.recent(self.config.context_window);

        // ── Pre-check ────────────────────────────────────────────────────────
        traversal.advance(PipelineState::PreCheck);
        let loop_hint = self.loops.scan(&turns);
        let assessment = self
            .precheck
            .analyze(message, &context, loop_hint.as_ref())
            .await;

        if assessment.block_response {
            traversal.advance(PipelineState::InterventionTerminal);
            warn!(risk_type = %assessment.risk_type, "pre-check blocked drafting; sending intervention message");
            session.push(Role::User, message);
            session.push(Role::Assistant, INTERVENTION_MESSAGE);
            return ChatOutcome {
                reply: INTERVENTION_MESSAGE.to_owned(),
                is_emergency: false,
                emergency_type: EmergencyType::None,
                risk_assessment: assessment,
                loop_detected: false,
                loop_pattern: None,
                intervention: true,
                refined: false,
                resources_attached: false,
                states: traversal.into_path(),
            };
        }

        // ── Emergency check, draft, refine ──────────────────────────────────
        traversal.advance(PipelineState::EmergencyCheck);
        let emergency = self.emergency.detect(message, &context).await;

        traversal.advance(PipelineState::Drafting);
        let draft = self
            .drafter
            .generate(message, &context, &assessment, &emergency)
            .await;

        traversal.advance(PipelineState::Refining);
        let info = if emergency.is_emergency || draft.text().contains(EMERGENCY_PLACEHOLDER) {
            let location = self.resolve_location(&mut session, message);
            Some(self.numbers.get_emergency_info(location.as_deref()).await)
        } else {
            None
        };
        let refinement = self
            .refiner
            .refine(&draft, message, &context, &assessment, &emergency, info.as_ref())
            .await;

        // ── Loop control ────────────────────────────────────────────────────
        traversal.advance(PipelineState::LoopCheck);
        let verdict = self.loops.check(&turns, &refinement.reply);
        let (reply, loop_pattern, resources_attached) = if verdict.detected {
            traversal.advance(PipelineState::Override);
            let alternate = self.alternate_reply(session.loop_breaks(), &turns, &refinement.reply);
            warn!(
                pattern = %verdict.pattern,
                occurrences = verdict.occurrences,
                threshold = self.loops.threshold(),
                "loop detected; overriding reply"
            );
            // The alternate replaces any numbers the refined reply carried.
            let reply = if emergency.is_emergency {
                attach_resources(alternate, &info.clone().unwrap_or_else(default_info))
            } else {
                alternate.to_owned()
            };
            let pattern = verdict.pattern.to_string();
            session.record_loop_break(verdict.pattern);
            (reply, Some(pattern), emergency.is_emergency)
        } else {
            traversal.advance(PipelineState::Passthrough);
            (refinement.reply, None, refinement.resources_attached)
        };

        // ── Finalize ────────────────────────────────────────────────────────
        traversal.advance(PipelineState::Finalized);
        session.push(Role::User, message);
        session.push(Role::Assistant, reply.as_str());
        info!(
            is_emergency = emergency.is_emergency,
            risk_level = %assessment.risk_level,
            loop_detected = verdict.detected,
            refined = refinement.refined,
            "reply finalized"
        );

        ChatOutcome {
            reply,
            is_emergency: emergency.is_emergency,
            emergency_type: emergency.emergency_type,
            risk_assessment: assessment,
            loop_detected: verdict.detected,
            loop_pattern,
            intervention: false,
            refined: refinement.refined,
            resources_attached,
            states: traversal.into_path(),
        }
    }

    /// Session memo first, then the resolver over the user's messages, then
    /// the configured default.
    fn resolve_location(&self, session: &mut Session, message: &str) -> Option<String> {
        if let Some(location) = session.location() {
            return Some(location.to_owned());
        }
        if let Some(resolver) = &self.locations {
            let mut texts: Vec<&str> = session
                .turns()
                .iter()
                .filter(|turn| turn.is_user())
                .map(|turn| turn.content.as_str())
                .collect();
            texts.push(message);
            if let Some(location) = resolver.resolve(&texts) {
                info!(%location, "user location resolved");
                session.set_location(location.as_str());
                return Some(location);
            }
        }
        self.config.default_location.clone()
    }

    /// First rotation entry, starting at the session's override count, that
    /// neither matches the looping reply nor would itself loop.
    fn alternate_reply(&self, loop_breaks: u32, history: &[Turn], candidate: &str) -> &'static str {
        let n = ALTERNATE_STRATEGIES.len();
        let start = loop_breaks as usize % n;
        (0..n)
            .map(|i| ALTERNATE_STRATEGIES[(start + i) % n])
            .find(|alternate| {
                !self.loops.equivalent(alternate, candidate)
                    && !self.loops.check(history, alternate).detected
            })
            .unwrap_or(ALTERNATE_STRATEGIES[start])
    }
}
