//! Server configuration, loaded from environment variables at startup.

use std::time::Duration;

use soulene_core::{PipelineConfig, StageTimeouts};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("GOOGLE_API_KEY (or SOULENE_API_KEY) must be set to a non-empty value")]
    MissingApiKey,
}

/// Runtime configuration for soulene-server.
///
/// Everything except the API key has a default, so only a key is needed to
/// start the server.
#[derive(Debug, Clone)]
pub struct Config {
    /// TCP address to bind (default: `"0.0.0.0:5000"`).
    pub bind_address: String,

    /// `tracing` filter string, e.g. `"info"` or `"debug,tower_http=warn"`.
    pub log_level: String,

    /// When `true`, emit log records as newline-delimited JSON.
    pub log_json: bool,

    /// Comma-separated list of allowed CORS origins; `None` allows any.
    pub cors_allowed_origins: Option<String>,

    /// Generative model identifier (default: `"gemini-2.0-flash"`).
    pub model: String,

    /// Override for the model API base URL.
    pub api_base: Option<String>,

    pub api_key: String,

    pub pipeline: PipelineConfig,
}

impl Config {
    /// Build [`Config`] from environment variables, falling back to defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_source(|key| std::env::var(key).ok())
    }

    fn from_source(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = ["GOOGLE_API_KEY", "SOULENE_API_KEY"]
            .into_iter()
            .filter_map(&var)
            .map(|key| key.trim().to_owned())
            .find(|key| !key.is_empty())
            .ok_or(ConfigError::MissingApiKey)?;

        let defaults = PipelineConfig::default();
        let timeouts = match parse_env::<u64>(&var, "SOULENE_STAGE_TIMEOUT_SECS") {
            Some(secs) => StageTimeouts::uniform(Duration::from_secs(secs)),
            None => defaults.timeouts,
        };
        let default_location = match var("SOULENE_DEFAULT_LOCATION") {
            Some(loc) if loc.trim().is_empty() => None,
            Some(loc) => Some(loc.trim().to_owned()),
            None => defaults.default_location.clone(),
        };
        let pipeline = PipelineConfig {
            max_history: parse_env(&var, "SOULENE_MAX_HISTORY").unwrap_or(defaults.max_history),
            context_window: parse_env(&var, "SOULENE_CONTEXT_WINDOW")
                .unwrap_or(defaults.context_window),
            emergency_ttl: parse_env(&var, "SOULENE_EMERGENCY_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.emergency_ttl),
            default_location,
            timeouts,
            ..defaults
        };

        Ok(Self {
            bind_address: env_or(&var, "SOULENE_BIND", "0.0.0.0:5000"),
            log_level: env_or(&var, "SOULENE_LOG", "info"),
            log_json: var("SOULENE_LOG_JSON")
                .map(|v| v == "1" || v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            cors_allowed_origins: var("SOULENE_CORS_ORIGINS").filter(|v| !v.trim().is_empty()),
            model: env_or(&var, "SOULENE_MODEL", "gemini-2.0-flash"),
            api_base: var("SOULENE_API_BASE").filter(|v| !v.trim().is_empty()),
            api_key,
            pipeline,
        })
    }
}

// ── private helpers ──────────────────────────────────────────────────────────

fn env_or(var: &impl Fn(&str) -> Option<String>, key: &str, default: &str) -> String {
    var(key).unwrap_or_else(|| default.to_owned())
}

fn parse_env<T: std::str::FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    var(key).and_then(|v| v.trim().parse().ok())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        Config::from_source(|key| vars.get(key).cloned())
    }

    #[test]
    fn api_key_is_required() {
        assert!(matches!(load(&[]), Err(ConfigError::MissingApiKey)));
        assert!(matches!(
            load(&[("GOOGLE_API_KEY", "  ")]),
            Err(ConfigError::MissingApiKey)
        ));
    }

    #[test]
    fn fallback_key_and_defaults() {
        let cfg = load(&[("SOULENE_API_KEY", "k-123")]).unwrap();
        assert_eq!(cfg.api_key, "k-123");
        assert_eq!(cfg.bind_address, "0.0.0.0:5000");
        assert_eq!(cfg.model, "gemini-2.0-flash");
        assert!(!cfg.log_json);
        assert!(cfg.cors_allowed_origins.is_none());
        assert_eq!(cfg.pipeline, PipelineConfig::default());
    }

    #[test]
    fn overrides_apply() {
        let cfg = load(&[
            ("GOOGLE_API_KEY", "k"),
            ("SOULENE_LOG_JSON", "TRUE"),
            ("SOULENE_MAX_HISTORY", "20"),
            ("SOULENE_STAGE_TIMEOUT_SECS", "3"),
            ("SOULENE_EMERGENCY_TTL_SECS", "60"),
            ("SOULENE_DEFAULT_LOCATION", "Kenya"),
            ("SOULENE_CONTEXT_WINDOW", "not-a-number"),
        ])
        .unwrap();
        assert!(cfg.log_json);
        assert_eq!(cfg.pipeline.max_history, 20);
        assert_eq!(cfg.pipeline.timeouts, StageTimeouts::uniform(Duration::from_secs(3)));
        assert_eq!(cfg.pipeline.emergency_ttl, Duration::from_secs(60));
        assert_eq!(cfg.pipeline.default_location.as_deref(), Some("Kenya"));
        assert_eq!(cfg.pipeline.context_window, 10);
    }

    #[test]
    fn blank_default_location_disables_it() {
        let cfg = load(&[("GOOGLE_API_KEY", "k"), ("SOULENE_DEFAULT_LOCATION", "")]).unwrap();
        assert!(cfg.pipeline.default_location.is_none());
    }
}
