use std::env;
use std::str::FromStr;

use anyhow::{bail, Result};

pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_REQUEST_TIMEOUT_S: f64 = 90.0;
pub const MIN_REQUEST_TIMEOUT_S: f64 = 5.0;
pub const MAX_REQUEST_TIMEOUT_S: f64 = 300.0;

const API_KEY_VARS: [&str; 3] = ["GEMINI_API_KEY", "GOOGLE_API_KEY", "VITE_GEMINI_API_KEY"];
const STORE_URL_VARS: [&str; 2] = ["SUPABASE_URL", "VITE_SUPABASE_URL"];
const STORE_KEY_VARS: [&str; 2] = ["SUPABASE_ANON_KEY", "VITE_SUPABASE_ANON_KEY"];

/// What happens when the audit row cannot be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HistoryPolicy {
    /// Log and keep the recognition result.
    #[default]
    BestEffort,
    /// Fail the request.
    Required,
}

impl HistoryPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::BestEffort => "best-effort",
            Self::Required => "required",
        }
    }
}

impl FromStr for HistoryPolicy {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "best-effort" | "best_effort" | "besteffort" => Ok(Self::BestEffort),
            "required" | "strict" => Ok(Self::Required),
            other => Err(format!(
                "unknown history policy '{other}' (expected best-effort or required)"
            )),
        }
    }
}

/// Settings for the AI side of a recognition.
#[derive(Clone, PartialEq)]
pub struct EngineConfig {
    pub gemini_api_key: Option<String>,
    pub gemini_api_base: String,
    pub model: String,
    pub request_timeout_s: f64,
    pub history_policy: HistoryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            gemini_api_key: None,
            gemini_api_base: DEFAULT_GEMINI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout_s: DEFAULT_REQUEST_TIMEOUT_S,
            history_policy: HistoryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field(
                "gemini_api_key",
                &self.gemini_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("gemini_api_base", &self.gemini_api_base)
            .field("model", &self.model)
            .field("request_timeout_s", &self.request_timeout_s)
            .field("history_policy", &self.history_policy)
            .finish()
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| non_empty(lookup(key));
        let history_policy = match get("BREEDSCAN_HISTORY_POLICY") {
            Some(raw) => raw.parse::<HistoryPolicy>().map_err(anyhow::Error::msg)?,
            None => HistoryPolicy::default(),
        };
        let request_timeout_s = match get("BREEDSCAN_REQUEST_TIMEOUT") {
            Some(raw) => match raw.parse::<f64>() {
                Ok(value) if value.is_finite() => {
                    value.clamp(MIN_REQUEST_TIMEOUT_S, MAX_REQUEST_TIMEOUT_S)
                }
                _ => bail!("BREEDSCAN_REQUEST_TIMEOUT must be a number of seconds, got '{raw}'"),
            },
            None => DEFAULT_REQUEST_TIMEOUT_S,
        };

        Ok(Self {
            gemini_api_key: first_non_empty(&lookup, &API_KEY_VARS),
            gemini_api_base: get("GEMINI_API_BASE")
                .map(|value| value.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.to_string()),
            model: get("BREEDSCAN_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            request_timeout_s,
            history_policy,
        })
    }

    pub fn api_key_configured(&self) -> bool {
        self.gemini_api_key.is_some()
    }
}

/// Location and key of the hosted breed database.
#[derive(Clone, PartialEq)]
pub struct StoreConfig {
    pub url: String,
    pub anon_key: String,
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("url", &self.url)
            .field("anon_key", &"<redacted>")
            .finish()
    }
}

impl StoreConfig {
    /// Missing store settings are a startup error.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let (Some(url), Some(anon_key)) = (
            first_non_empty(&lookup, &STORE_URL_VARS),
            first_non_empty(&lookup, &STORE_KEY_VARS),
        ) else {
            bail!("Missing Supabase environment variables (SUPABASE_URL and SUPABASE_ANON_KEY)");
        };
        Ok(Self {
            url: url.trim_end_matches('/').to_string(),
            anon_key,
        })
    }
}

fn first_non_empty(lookup: &impl Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| non_empty(lookup(*key)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|raw| raw.trim().to_string())
        .filter(|raw| !raw.is_empty())
}
