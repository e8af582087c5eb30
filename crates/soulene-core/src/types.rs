use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

// ─── Turns ────────────────────────────────────────────────────────────────────

/// Author of a [`Turn`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Role {
    User,
    Assistant,
}

/// One message stored in a session's history.
///
/// Turns are immutable once appended; the store hands out clones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Turn {
    pub fn is_assistant(&self) -> bool {
        self.role == Role::Assistant
    }

    pub fn is_user(&self) -> bool {
        self.role == Role::User
    }
}

// ─── Stages ───────────────────────────────────────────────────────────────────

/// A stage that calls out to an external, potentially slow capability.
///
/// Every such call carries its own timeout (see
/// [`StageTimeouts`](crate::config::StageTimeouts)).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, AsRefStr, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Stage {
    PreCheck,
    EmergencyCheck,
    Drafting,
    Refining,
    EmergencyLookup,
}

// ─── Risk assessment ──────────────────────────────────────────────────────────

/// Severity reported by the pre-check classifier.
///
/// `Unknown` is only produced by the fail-safe default when classification
/// could not be completed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskLevel {
    None,
    Low,
    Medium,
    #[serde(alias = "critical")]
    #[strum(to_string = "high", serialize = "critical")]
    High,
    Unknown,
}

impl RiskLevel {
    /// Severity rank used when raising a level; `Unknown` ranks between
    /// `Medium` and `High` so it is never lowered to a benign value.
    pub fn rank(self) -> u8 {
        match self {
            RiskLevel::None => 0,
            RiskLevel::Low => 1,
            RiskLevel::Medium => 2,
            RiskLevel::Unknown => 3,
            RiskLevel::High => 4,
        }
    }

    /// Return the more severe of `self` and `floor`.
    pub fn at_least(self, floor: RiskLevel) -> RiskLevel {
        if self.rank() >= floor.rank() { self } else { floor }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RiskType {
    None,
    PassiveIdeation,
    DecisionCrisis,
    Resignation,
    #[serde(alias = "loop_detected")]
    #[strum(to_string = "loop_pattern", serialize = "loop_detected")]
    LoopPattern,
    Unknown,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum InterventionType {
    None,
    Grounding,
    #[serde(alias = "break_loop")]
    #[strum(to_string = "alternate_strategy", serialize = "break_loop")]
    AlternateStrategy,
}

/// Verdict of the pre-check stage. Produced fresh for every message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_level: RiskLevel,
    pub risk_type: RiskType,
    pub requires_intervention: bool,
    pub intervention_type: InterventionType,
    /// When `true` the orchestrator skips drafting and answers with the fixed
    /// intervention message.
    pub block_response: bool,
    /// Short observation from the classifier, if any.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub context_notes: String,
    /// Set when this assessment is the fail-safe default rather than a real
    /// classification.
    #[serde(default)]
    pub degraded: bool,
}

impl RiskAssessment {
    /// An assessment with no risk signal at all.
    pub fn clear() -> Self {
        Self {
            risk_level: RiskLevel::None,
            risk_type: RiskType::None,
            requires_intervention: false,
            intervention_type: InterventionType::None,
            block_response: false,
            context_notes: String::new(),
            degraded: false,
        }
    }

    /// Conservative default used when classification fails or times out.
    ///
    /// Never blocks (a fixed message is not better than a refined draft when
    /// we know nothing) but always asks downstream stages to intervene.
    pub fn fail_safe() -> Self {
        Self {
            risk_level: RiskLevel::Unknown,
            risk_type: RiskType::Unknown,
            requires_intervention: true,
            intervention_type: InterventionType::None,
            block_response: false,
            context_notes: String::new(),
            degraded: true,
        }
    }
}

// ─── Emergency detection ──────────────────────────────────────────────────────

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmergencyType {
    None,
    Suicide,
    SelfHarm,
    Medical,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString, AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

/// Verdict of the emergency stage. Produced fresh for every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyResult {
    pub is_emergency: bool,
    pub emergency_type: EmergencyType,
    pub confidence: Confidence,
}

impl EmergencyResult {
    pub fn none() -> Self {
        Self {
            is_emergency: false,
            emergency_type: EmergencyType::None,
            confidence: Confidence::Low,
        }
    }
}

// ─── Emergency numbers ────────────────────────────────────────────────────────

/// A single labelled hotline, e.g. `("police", "100")`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyContact {
    pub label: String,
    pub number: String,
}

impl EmergencyContact {
    pub fn new(label: impl Into<String>, number: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            number: number.into(),
        }
    }
}

/// Emergency numbers for one location, shared across sessions via the cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyInfo {
    pub location: String,
    pub contacts: Vec<EmergencyContact>,
    pub verified: bool,
    pub source: String,
    pub cached_at: DateTime<Utc>,
}

impl EmergencyInfo {
    /// Returns `true` if `text` mentions any of this info's numbers.
    ///
    /// Numbers are compared by their digit runs, so `"call 108"` mentions the
    /// contact `"102 or 108"`.
    pub fn mentioned_in(&self, text: &str) -> bool {
        self.contacts
            .iter()
            .flat_map(|c| digit_runs(&c.number))
            .any(|digits| text.contains(digits))
    }
}

fn digit_runs(number: &str) -> impl Iterator<Item = &str> {
    number
        .split(|c: char| !c.is_ascii_digit())
        .filter(|run| run.len() >= 3)
}
