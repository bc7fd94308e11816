//! Shared application state.
//!
//! DESIGN
//! ======
//! `AppState` is injected into Axum handlers via the `State` extractor.
//! Everything in it is immutable after startup; each request builds its own
//! generation session from these shared parts.

use std::sync::Arc;

use crate::config::ChatConfig;
use crate::llm::LlmStream;
use crate::services::chat::{LogObserver, StepObserver};
use crate::services::tools::ToolRegistry;

/// Clone is required by Axum; all inner fields are Arc-wrapped.
#[derive(Clone)]
pub struct AppState {
    /// Optional LLM client. `None` if LLM env vars are not configured.
    pub llm: Option<Arc<dyn LlmStream>>,
    pub tools: Arc<ToolRegistry>,
    pub observer: Arc<dyn StepObserver>,
    pub config: Arc<ChatConfig>,
}

impl AppState {
    #[must_use]
    pub fn new(llm: Option<Arc<dyn LlmStream>>, tools: ToolRegistry, config: ChatConfig) -> Self {
        Self { llm, tools: Arc::new(tools), observer: Arc::new(LogObserver), config: Arc::new(config) }
    }

    #[cfg(test)]
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn StepObserver>) -> Self {
        self.observer = observer;
        self
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================
