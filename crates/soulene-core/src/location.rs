//! Resolving where the user is, so emergency numbers can be localized.

/// The location-resolution capability consumed by the pipeline.
pub trait LocationResolver: Send + Sync {
    /// Best-effort location from the user's own messages, newest last.
    fn resolve(&self, user_texts: &[&str]) -> Option<String>;
}

/// Phrases after which the user usually names a place.
const MARKERS: &[&[&str]] = &[&["i", "live", "in"], &["i", "am", "in"], &["i'm", "in"], &["from"]];

/// Words that follow a marker without being a place ("I am in pain").
const NOT_PLACES: &[&str] = &[
    "a", "an", "the", "my", "your", "this", "that", "it", "me", "you", "him", "her", "them", "us",
    "here", "there", "home", "work", "school", "college", "bed", "pain", "love", "trouble",
    "everyone", "everything", "nowhere", "now", "today",
];

/// Heuristic resolver that looks for "I live in X" style statements.
///
/// The most recent statement wins.
#[derive(Debug, Clone, Default)]
pub struct ConversationLocationResolver;

impl ConversationLocationResolver {
    fn place_in(text: &str) -> Option<String> {
        let words: Vec<&str> = text.split_whitespace().collect();
        let lower: Vec<String> = words.iter().map(|w| w.to_lowercase()).collect();

        for start in 0..words.len() {
            for marker in MARKERS {
                let end = start + marker.len();
                if end >= words.len() {
                    continue;
                }
                let matches = lower[start..end]
                    .iter()
                    .zip(marker.iter())
                    .all(|(word, expected)| word == expected);
                if !matches {
                    continue;
                }
                let place = words[end].trim_matches(|c: char| !c.is_alphanumeric());
                if !place.is_empty() && !NOT_PLACES.contains(&place.to_lowercase().as_str()) {
                    return Some(place.to_owned());
                }
            }
        }
        None
    }
}

impl LocationResolver for ConversationLocationResolver {
    fn resolve(&self, user_texts: &[&str]) -> Option<String> {
        user_texts.iter().rev().find_map(|text| Self::place_in(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_live_in_statement() {
        let resolver = ConversationLocationResolver;
        assert_eq!(
            resolver.resolve(&["hey", "I live in Mumbai, and it's loud"]).as_deref(),
            Some("Mumbai")
        );
    }

    #[test]
    fn most_recent_statement_wins() {
        let resolver = ConversationLocationResolver;
        let texts = ["I'm from Chennai", "I am in London now for work"];
        assert_eq!(resolver.resolve(&texts).as_deref(), Some("London"));
    }

    #[test]
    fn ignores_non_places() {
        let resolver = ConversationLocationResolver;
        assert_eq!(resolver.resolve(&["I am in pain", "this is from me"]), None);
        assert_eq!(resolver.resolve(&["from"]), None);
        assert_eq!(resolver.resolve(&[]), None);
    }
}
