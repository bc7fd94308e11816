//! LLM: streaming provider adapter for the chat endpoint.
//!
//! DESIGN
//! ======
//! Configured from environment variables. Only OpenAI-compatible
//! `/chat/completions` endpoints are supported; any server speaking that
//! dialect can be targeted through `LLM_OPENAI_BASE_URL`. Handlers depend on
//! the [`LlmStream`] trait, not on [`LlmClient`], so tests inject mocks.

pub mod config;
pub mod convert;
pub mod openai;
pub mod tools;
pub mod types;

use config::LlmConfig;
pub use types::LlmStream;
use types::{EventStream, LlmError, Message, Tool};

/// Concrete streaming LLM client bound to one model.
pub struct LlmClient {
    inner: openai::OpenAiClient,
    model: String,
}

impl LlmClient {
    /// Build an LLM client from environment variables.
    ///
    /// See [`LlmConfig::from_env`] for the variables read.
    ///
    /// # Errors
    ///
    /// Returns an error if the API key is missing or the HTTP client fails.
    pub fn from_env() -> Result<Self, LlmError> {
        let config = LlmConfig::from_env()?;
        Self::from_config(config)
    }

    /// Build an LLM client from a parsed typed config.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let inner = openai::OpenAiClient::new(config.api_key, config.base_url, config.timeouts)?;
        Ok(Self { inner, model: config.model })
    }

    /// Return the configured model name (e.g. `"gpt-4o"`).
    #[must_use]
    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait::async_trait]
impl LlmStream for LlmClient {
    async fn stream(
        &self,
        max_tokens: Option<u32>,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
    ) -> Result<EventStream, LlmError> {
        self.inner
            .stream(&self.model, max_tokens, system, messages, tools)
            .await
    }
}
