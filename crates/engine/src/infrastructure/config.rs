//! Environment configuration for the LLM client and the GM loop.
//!
//! Values are read through a lookup function so tests never touch the
//! process environment. Unparseable values fall back to their defaults.

use std::str::FromStr;

use secrecy::SecretString;

/// Default OpenAI-compatible base URL.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default model for the GM.
pub const DEFAULT_GM_MODEL: &str = "gpt-4o-mini";

/// Default transport deadline per request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 120;

/// Default round ceiling for one GM reply.
pub const DEFAULT_MAX_ROUNDS: u32 = 10;

/// Default character budget for each embedded context document.
pub const DEFAULT_CONTEXT_CHAR_LIMIT: usize = 4000;

/// Default number of session log lines folded into instructions.
pub const DEFAULT_SESSION_LOG_ENTRIES: usize = 10;

/// Backend connection settings
#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub base_url: String,
    /// `None` sends no Authorization header (local gateways)
    pub api_key: Option<SecretString>,
    pub model: String,
    pub stream: bool,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            api_key: None,
            model: DEFAULT_GM_MODEL.to_string(),
            stream: true,
            timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

impl LlmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            base_url: non_empty(&lookup, "OPENAI_BASE_URL").unwrap_or(defaults.base_url),
            api_key: non_empty(&lookup, "OPENAI_API_KEY").map(SecretString::from),
            model: non_empty(&lookup, "GM_MODEL").unwrap_or(defaults.model),
            stream: parse_or(&lookup, "GM_STREAM", defaults.stream),
            timeout_secs: parse_or(&lookup, "GM_REQUEST_TIMEOUT_SECS", defaults.timeout_secs),
        }
    }
}

/// Conversation loop settings
#[derive(Debug, Clone, PartialEq)]
pub struct GmConfig {
    pub max_rounds: u32,
    pub temperature: Option<f32>,
    pub max_output_tokens: Option<u32>,
    pub context_char_limit: usize,
    pub session_log_entries: usize,
}

impl Default for GmConfig {
    fn default() -> Self {
        Self {
            max_rounds: DEFAULT_MAX_ROUNDS,
            temperature: None,
            max_output_tokens: None,
            context_char_limit: DEFAULT_CONTEXT_CHAR_LIMIT,
            session_log_entries: DEFAULT_SESSION_LOG_ENTRIES,
        }
    }
}

impl GmConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let max_rounds = parse_or(&lookup, "GM_MAX_ROUNDS", defaults.max_rounds);
        Self {
            // A zero ceiling would never ask the model anything
            max_rounds: if max_rounds == 0 {
                tracing::warn!("GM_MAX_ROUNDS must be at least 1, using default");
                defaults.max_rounds
            } else {
                max_rounds
            },
            temperature: parse_optional(&lookup, "GM_TEMPERATURE"),
            max_output_tokens: parse_optional(&lookup, "GM_MAX_OUTPUT_TOKENS"),
            context_char_limit: parse_or(
                &lookup,
                "GM_CONTEXT_CHAR_LIMIT",
                defaults.context_char_limit,
            ),
            session_log_entries: parse_or(
                &lookup,
                "GM_SESSION_LOG_ENTRIES",
                defaults.session_log_entries,
            ),
        }
    }
}

fn non_empty(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn parse_optional<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = non_empty(lookup, key)?;
    match raw.parse() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(key, value = %raw, "Ignoring unparseable setting");
            None
        }
    }
}

fn parse_or<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    let Some(raw) = non_empty(lookup, key) else {
        return default;
    };
    match raw.parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!(key, value = %raw, "Unparseable setting, using default");
            default
        }
    }
}
