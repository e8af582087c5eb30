//! Detection of stuck conversations where the assistant keeps repeating itself.
//!
//! Replies are bucketed into a [`LoopPattern`]: anything built around a
//! grounding cue ("take a breath", "feel your feet") is one pattern; any other
//! reply matches earlier replies by word-trigram overlap. A loop is declared
//! once the same pattern reaches the configured threshold within the recent
//! assistant turns, counting the candidate reply.

use std::collections::HashSet;
use std::fmt;

use crate::config::PipelineConfig;
use crate::types::Turn;

/// Grounding cues matched as whole lowercase word tokens.
const GROUNDING_WORDS: &[&str] = &[
    "breathe", "present", "room", "sit", "sitting", "feet", "inhale", "exhale",
];
/// Grounding cues matched as token prefixes (breath, breathing, grounded, …).
const GROUNDING_PREFIXES: &[&str] = &["breath", "ground"];
/// Number of leading tokens kept in a `repeat:` signature.
const SIGNATURE_TOKENS: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoopPattern {
    /// The reply relies on a grounding exercise.
    Grounding,
    /// Near-duplicate wording; the payload is a short normalized signature.
    Repeat(String),
}

impl fmt::Display for LoopPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopPattern::Grounding => f.write_str("grounding"),
            LoopPattern::Repeat(signature) => write!(f, "repeat:{signature}"),
        }
    }
}

/// Result of checking a candidate reply against recent history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoopVerdict {
    pub detected: bool,
    /// Pattern of the candidate reply.
    pub pattern: LoopPattern,
    /// Matching assistant turns in the window, candidate included.
    pub occurrences: usize,
}

#[derive(Debug, Clone)]
pub struct LoopDetector {
    window: usize,
    threshold: usize,
    similarity: f32,
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(4, 3, 0.6)
    }
}

impl LoopDetector {
    pub fn new(window: usize, threshold: usize, similarity: f32) -> Self {
        Self {
            window: window.max(1),
            threshold: threshold.max(2),
            similarity: similarity.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.loop_window,
            config.loop_threshold,
            config.loop_similarity,
        )
    }

    pub fn threshold(&self) -> usize {
        self.threshold
    }

    /// Check whether emitting `candidate` after `history` would complete a loop.
    ///
    /// Pure: `history` is not modified.
    pub fn check(&self, history: &[Turn], candidate: &str) -> LoopVerdict {
        let candidate_tokens = tokens(candidate);
        let prior = self
            .window_of(history)
            .filter(|reply| self.equivalent_tokens(&tokens(reply), &candidate_tokens))
            .count();
        let occurrences = prior + 1;

        LoopVerdict {
            detected: occurrences >= self.threshold,
            pattern: pattern_of(&candidate_tokens),
            occurrences,
        }
    }

    /// Report a pattern that already occurs `threshold - 1` times in the
    /// window, i.e. one more matching reply would be a loop.
    pub fn scan(&self, history: &[Turn]) -> Option<LoopPattern> {
        let replies: Vec<Vec<String>> = self.window_of(history).map(tokens).collect();
        let needed = self.threshold - 1;

        replies.iter().find_map(|reply| {
            let count = replies
                .iter()
                .filter(|other| self.equivalent_tokens(reply, other))
                .count();
            (count >= needed).then(|| pattern_of(reply))
        })
    }

    /// Classify a single reply.
    pub fn classify(&self, reply: &str) -> LoopPattern {
        pattern_of(&tokens(reply))
    }

    /// Returns `true` when `a` and `b` fall into the same pattern.
    pub fn equivalent(&self, a: &str, b: &str) -> bool {
        self.equivalent_tokens(&tokens(a), &tokens(b))
    }

    /// The last `window` assistant replies, newest first.
    fn window_of<'a>(&self, history: &'a [Turn]) -> impl Iterator<Item = &'a str> + 'a {
        history
            .iter()
            .rev()
            .filter(|turn| turn.is_assistant())
            .take(self.window)
            .map(|turn| turn.content.as_str())
    }

    fn equivalent_tokens(&self, a: &[String], b: &[String]) -> bool {
        match (is_grounding(a), is_grounding(b)) {
            (true, true) => true,
            (false, false) => {
                if a.len() < 3 || b.len() < 3 {
                    !a.is_empty() && a == b
                } else {
                    jaccard(&trigrams(a), &trigrams(b)) >= self.similarity
                }
            }
            _ => false,
        }
    }
}

fn tokens(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric() && c != '\'')
        .map(|word| word.trim_matches('\'').to_lowercase())
        .filter(|word| !word.is_empty())
        .collect()
}

fn is_grounding(tokens: &[String]) -> bool {
    tokens.iter().any(|token| {
        GROUNDING_WORDS.contains(&token.as_str())
            || GROUNDING_PREFIXES.iter().any(|prefix| token.starts_with(prefix))
    })
}

fn pattern_of(tokens: &[String]) -> LoopPattern {
    if is_grounding(tokens) {
        LoopPattern::Grounding
    } else {
        let signature: Vec<&str> = tokens
            .iter()
            .take(SIGNATURE_TOKENS)
            .map(String::as_str)
            .collect();
        LoopPattern::Repeat(signature.join("-"))
    }
}

fn trigrams(tokens: &[String]) -> HashSet<String> {
    tokens.windows(3).map(|w| w.join(" ")).collect()
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}
