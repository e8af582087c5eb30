//! Helpers for turning loosely formatted model output into strict types.

use std::str::FromStr;

use serde::de::{self, DeserializeOwned};
use serde::{Deserialize, Deserializer};

/// Locate the JSON object in a model reply.
///
/// Fenced blocks (```` ```json ```` or bare ```` ``` ````) are unwrapped
/// first and surrounding prose is ignored. Returns `None` when no `{ … }`
/// span exists.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let mut body = text.trim();

    if let Some((_, rest)) = body.split_once("```json") {
        body = rest.split("```").next().unwrap_or(rest).trim();
    } else if let Some((_, rest)) = body.split_once("```") {
        body = rest.split("```").next().unwrap_or(rest).trim();
    }

    let start = body.find('{')?;
    let end = body.rfind('}')?;
    (end > start).then(|| &body[start..=end])
}

/// Extract and deserialize the JSON object in `text`.
pub fn parse_json_object<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let json = extract_json_object(text).ok_or_else(|| "no JSON object in reply".to_owned())?;
    serde_json::from_str(json).map_err(|e| format!("malformed JSON reply: {e}"))
}

/// Deserialize a classifier label loosely: case, surrounding whitespace and
/// `-`/space separators are ignored, so `"Self-Harm"` reads as `self_harm`.
///
/// Use with `#[serde(deserialize_with = "label")]` on fields whose type
/// implements `FromStr` over snake_case names. Unknown labels still fail.
pub fn label<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: FromStr,
{
    let raw = String::deserialize(deserializer)?;
    let normalized = raw.trim().to_ascii_lowercase().replace(['-', ' '], "_");
    normalized
        .parse()
        .map_err(|_| de::Error::custom(format!("unrecognized label '{raw}'")))
}
