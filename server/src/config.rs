//! Server configuration parsed from environment variables.

use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant.";
pub const DEFAULT_MAX_DURATION_SECS: u64 = 30;
pub const DEFAULT_MAX_STEPS: usize = 5;
pub const DEFAULT_TOOL_FETCH_TIMEOUT_SECS: u64 = 15;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

impl crate::error::ErrorCode for ConfigError {
    fn error_code(&self) -> &'static str {
        "E_CONFIG_PARSE"
    }
}

/// Chat endpoint settings shared read-only by every request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub port: u16,
    pub system_prompt: String,
    /// Wall-clock limit for one request, measured from arrival.
    pub max_duration: Duration,
    /// Upper bound on generation steps (tool round-trips + 1).
    pub max_steps: usize,
    pub max_tokens: Option<u32>,
    /// Source of the schedule tool. The tool is not registered when unset.
    pub schedule_csv_url: Option<String>,
    pub tool_fetch_timeout: Duration,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_duration: Duration::from_secs(DEFAULT_MAX_DURATION_SECS),
            max_steps: DEFAULT_MAX_STEPS,
            max_tokens: None,
            schedule_csv_url: None,
            tool_fetch_timeout: Duration::from_secs(DEFAULT_TOOL_FETCH_TIMEOUT_SECS),
        }
    }
}

impl ChatConfig {
    /// Read `PORT`, `CHAT_SYSTEM_PROMPT`, `CHAT_MAX_DURATION_SECS`,
    /// `CHAT_MAX_STEPS`, `LLM_MAX_TOKENS`, `SCHEDULE_CSV_URL` and
    /// `TOOL_FETCH_TIMEOUT_SECS`. Unparseable numeric tuning values fall
    /// back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for a `PORT` that is not a valid port
    /// number.
    pub fn from_env() -> Result<Self, ConfigError> {
        let port = match std::env::var("PORT") {
            Ok(raw) => raw
                .trim()
                .parse::<u16>()
                .map_err(|_| ConfigError::Invalid { var: "PORT", value: raw })?,
            Err(_) => DEFAULT_PORT,
        };

        let system_prompt = std::env::var("CHAT_SYSTEM_PROMPT")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string());

        Ok(Self {
            port,
            system_prompt,
            max_duration: Duration::from_secs(env_parse("CHAT_MAX_DURATION_SECS", DEFAULT_MAX_DURATION_SECS)),
            max_steps: env_parse("CHAT_MAX_STEPS", DEFAULT_MAX_STEPS).max(1),
            max_tokens: std::env::var("LLM_MAX_TOKENS").ok().and_then(|v| v.parse().ok()),
            schedule_csv_url: std::env::var("SCHEDULE_CSV_URL")
                .ok()
                .map(|u| u.trim().to_string())
                .filter(|u| !u.is_empty()),
            tool_fetch_timeout: Duration::from_secs(env_parse(
                "TOOL_FETCH_TIMEOUT_SECS",
                DEFAULT_TOOL_FETCH_TIMEOUT_SECS,
            )),
        })
    }
}

pub(crate) fn env_parse<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
