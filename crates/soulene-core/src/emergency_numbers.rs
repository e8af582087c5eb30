//! Location-keyed emergency number lookup with a time-bounded cache.
//!
//! [`EmergencyNumberService::get_emergency_info`] never fails: a failed or
//! empty lookup yields the hardcoded [`default_info`] and is not cached, so
//! the next request retries.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info};

use crate::completion::{CompletionRequest, TextCompletion};
use crate::error::{with_timeout, PipelineError};
use crate::parse::parse_json_object;
use crate::stages::prompts;
use crate::types::{EmergencyContact, EmergencyInfo, Stage};

const DEFAULT_KEY: &str = "default";
const DEFAULT_SOURCE: &str = "default";
const INTERNATIONAL_FALLBACK: &str = "112 (international emergency)";

/// The hardcoded set returned whenever no verified lookup is available.
pub fn default_info() -> EmergencyInfo {
    EmergencyInfo {
        location: DEFAULT_KEY.to_owned(),
        contacts: vec![
            EmergencyContact::new("ambulance", "102 or 108"),
            EmergencyContact::new("crisis line", "AASRA 9820466726"),
            EmergencyContact::new("international emergency", "112"),
            EmergencyContact::new("police", "100"),
        ],
        verified: false,
        source: DEFAULT_SOURCE.to_owned(),
        cached_at: Utc::now(),
    }
}

/// Render `info` as `"<number> (<label>)"` pairs sorted by label.
pub fn format_emergency_numbers(info: &EmergencyInfo) -> String {
    let mut contacts: Vec<&EmergencyContact> = info
        .contacts
        .iter()
        .filter(|c| !c.number.trim().is_empty())
        .collect();
    if contacts.is_empty() {
        return INTERNATIONAL_FALLBACK.to_owned();
    }
    contacts.sort_by(|a, b| a.label.cmp(&b.label));
    contacts
        .iter()
        .map(|c| format!("{} ({})", c.number.trim(), c.label))
        .collect::<Vec<_>>()
        .join("; ")
}

fn cache_key(location: Option<&str>) -> String {
    match location.map(str::trim).filter(|l| !l.is_empty()) {
        Some(location) => location.to_lowercase(),
        None => DEFAULT_KEY.to_owned(),
    }
}

// ── Lookup capability ─────────────────────────────────────────────────────────

/// A fresh (uncached) emergency number lookup.
#[async_trait]
pub trait EmergencyLookup: Send + Sync {
    async fn lookup(&self, location: &str) -> Result<EmergencyInfo, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct LookupReply {
    #[serde(default)]
    location: Option<String>,
    #[serde(default)]
    police: Option<String>,
    #[serde(default)]
    medical: Option<String>,
    #[serde(default)]
    suicide_hotline: Option<String>,
    #[serde(default)]
    verified: bool,
    #[serde(default)]
    source: Option<String>,
}

fn usable(number: Option<String>) -> Option<String> {
    let number = number?.trim().to_owned();
    let unavailable = number.is_empty() || number.eq_ignore_ascii_case("not available");
    (!unavailable).then_some(number)
}

impl LookupReply {
    fn into_info(self, requested: &str) -> Result<EmergencyInfo, PipelineError> {
        let contacts: Vec<EmergencyContact> = [
            ("ambulance", self.medical),
            ("crisis line", self.suicide_hotline),
            ("police", self.police),
        ]
        .into_iter()
        .filter_map(|(label, number)| usable(number).map(|n| EmergencyContact::new(label, n)))
        .collect();

        if contacts.is_empty() {
            return Err(PipelineError::Lookup {
                message: format!("no usable numbers for '{requested}'"),
            });
        }

        Ok(EmergencyInfo {
            location: self
                .location
                .filter(|l| !l.trim().is_empty())
                .unwrap_or_else(|| requested.to_owned()),
            contacts,
            verified: self.verified,
            source: self.source.unwrap_or_else(|| "model".to_owned()),
            cached_at: Utc::now(),
        })
    }
}

/// Looks numbers up through the text-completion capability.
pub struct ModelEmergencyLookup {
    completion: Arc<dyn TextCompletion>,
}

impl ModelEmergencyLookup {
    pub fn new(completion: Arc<dyn TextCompletion>) -> Self {
        Self { completion }
    }
}

#[async_trait]
impl EmergencyLookup for ModelEmergencyLookup {
    async fn lookup(&self, location: &str) -> Result<EmergencyInfo, PipelineError> {
        let request = CompletionRequest::new(Stage::EmergencyLookup, prompts::lookup_prompt(location))
            .temperature(0.0);
        let raw = self.completion.complete(request).await?;
        let reply: LookupReply =
            parse_json_object(&raw).map_err(|message| PipelineError::Lookup { message })?;
        reply.into_info(location)
    }
}

// ── Cache ─────────────────────────────────────────────────────────────────────

#[derive(Debug)]
struct CacheEntry {
    info: EmergencyInfo,
    expires_at: Instant,
}

type CacheSlot = Arc<Mutex<Option<CacheEntry>>>;

/// Emergency numbers per location, cached for a fixed TTL.
///
/// Each location key has its own slot lock: concurrent misses for one key
/// perform a single lookup, and different keys never wait on each other.
pub struct EmergencyNumberService {
    lookup: Arc<dyn EmergencyLookup>,
    ttl: Duration,
    timeout: Duration,
    slots: RwLock<HashMap<String, CacheSlot>>,
}

impl EmergencyNumberService {
    pub fn new(lookup: Arc<dyn EmergencyLookup>, ttl: Duration, timeout: Duration) -> Self {
        Self {
            lookup,
            ttl,
            timeout,
            slots: RwLock::new(HashMap::new()),
        }
    }

    async fn slot(&self, key: &str) -> CacheSlot {
        if let Some(slot) = self.slots.read().await.get(key) {
            return Arc::clone(slot);
        }
        let mut slots = self.slots.write().await;
        Arc::clone(slots.entry(key.to_owned()).or_default())
    }

    /// Emergency numbers for `location`, from cache when fresh.
    pub async fn get_emergency_info(&self, location: Option<&str>) -> EmergencyInfo {
        let key = cache_key(location);
        if key == DEFAULT_KEY {
            return default_info();
        }

        let slot = self.slot(&key).await;
        let mut entry = slot.lock().await;

        if let Some(cached) = entry.as_ref() {
            if Instant::now() < cached.expires_at {
                debug!(location = %key, "emergency numbers cache hit");
                return cached.info.clone();
            }
            debug!(location = %key, "emergency numbers expired");
        }

        let requested = location.map(str::trim).unwrap_or(DEFAULT_KEY);
        let fresh = with_timeout(
            Stage::EmergencyLookup,
            self.timeout,
            self.lookup.lookup(requested),
        )
        .await;

        match fresh {
            Ok(info) if !info.contacts.is_empty() => {
                info!(location = %key, verified = info.verified, source = %info.source, "emergency numbers cached");
                *entry = Some(CacheEntry {
                    info: info.clone(),
                    expires_at: Instant::now() + self.ttl,
                });
                info
            }
            Ok(_) => {
                error!(location = %key, "emergency lookup returned no numbers; using defaults");
                default_info()
            }
            Err(e) => {
                error!(location = %key, error = %e, "emergency lookup failed; using defaults");
                default_info()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CountingLookup, ScriptedCompletion};

    fn service(lookup: Arc<CountingLookup>) -> EmergencyNumberService {
        EmergencyNumberService::new(lookup, Duration::from_secs(60), Duration::from_secs(5))
    }

    #[test]
    fn default_format_is_sorted_by_label() {
        assert_eq!(
            format_emergency_numbers(&default_info()),
            "102 or 108 (ambulance); AASRA 9820466726 (crisis line); \
             112 (international emergency); 100 (police)"
        );
    }

    #[test]
    fn empty_info_formats_international_number() {
        let mut info = default_info();
        info.contacts.clear();
        assert_eq!(format_emergency_numbers(&info), "112 (international emergency)");
    }

    #[tokio::test(start_paused = true)]
    async fn cache_hit_within_ttl_then_refresh() {
        let lookup = Arc::new(CountingLookup::new());
        let svc = service(Arc::clone(&lookup));

        let first = svc.get_emergency_info(Some("Kenya")).await;
        let second = svc.get_emergency_info(Some("  kenya ")).await;
        assert_eq!(first, second);
        assert_eq!(lookup.calls(), 1);

        tokio::time::advance(Duration::from_secs(61)).await;
        svc.get_emergency_info(Some("Kenya")).await;
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test]
    async fn failures_fall_back_and_are_not_cached() {
        let lookup = Arc::new(CountingLookup::failing());
        let svc = service(Arc::clone(&lookup));

        let info = svc.get_emergency_info(Some("Atlantis")).await;
        assert_eq!(info.source, "default");
        assert!(!info.contacts.is_empty());

        svc.get_emergency_info(Some("Atlantis")).await;
        assert_eq!(lookup.calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_lookup_times_out_to_default() {
        let lookup = Arc::new(CountingLookup::hanging());
        let svc = service(Arc::clone(&lookup));
        let info = svc.get_emergency_info(Some("Peru")).await;
        assert_eq!(info.source, "default");
    }

    #[tokio::test]
    async fn concurrent_misses_share_one_lookup() {
        let lookup = Arc::new(CountingLookup::new());
        let svc = Arc::new(service(Arc::clone(&lookup)));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move { svc.get_emergency_info(Some("Japan")).await })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(lookup.calls(), 1);
    }

    #[tokio::test]
    async fn unknown_location_uses_defaults_without_lookup() {
        let lookup = Arc::new(CountingLookup::new());
        let svc = service(Arc::clone(&lookup));
        let info = svc.get_emergency_info(None).await;
        assert_eq!(info, EmergencyInfo { cached_at: info.cached_at, ..default_info() });
        assert_eq!(lookup.calls(), 0);
    }

    #[tokio::test]
    async fn model_lookup_drops_unavailable_numbers() {
        let completion = Arc::new(ScriptedCompletion::new().reply(
            Stage::EmergencyLookup,
            "```json\n{\"location\": \"Kenya\", \"police\": \"999\", \"medical\": \"999\", \
             \"suicide_hotline\": \"Not Available\", \"verified\": true, \"source\": \"gov\"}\n```",
        ));
        let lookup = ModelEmergencyLookup::new(completion);
        let info = lookup.lookup("Kenya").await.unwrap();

        let labels: Vec<_> = info.contacts.iter().map(|c| c.label.as_str()).collect();
        assert_eq!(labels, ["ambulance", "police"]);
        assert!(info.verified);
        assert_eq!(info.source, "gov");
    }

    #[tokio::test]
    async fn model_lookup_without_numbers_is_an_error() {
        let completion = Arc::new(ScriptedCompletion::new().reply(
            Stage::EmergencyLookup,
            r#"{"location": "Nowhere", "police": "", "suicide_hotline": "not available"}"#,
        ));
        let err = ModelEmergencyLookup::new(completion).lookup("Nowhere").await.unwrap_err();
        assert!(matches!(err, PipelineError::Lookup { .. }));
    }
}
