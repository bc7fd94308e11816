//! Tool execution: registry of callable tools and the schedule CSV fetcher.
//!
//! DESIGN
//! ======
//! The registry is built once at startup and shared read-only across
//! requests. A tool call from the model is resolved to a
//! [`ToolInvocation`]: registered names are static invocations, anything
//! else is dynamic and answered with an error result so generation can
//! continue. Input is checked against the declared schema before the
//! handler runs, and each handler also deserializes into its own typed
//! input.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};
use tracing::info;

use crate::llm::tools::schedule_tool;
use crate::llm::types::Tool;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("invalid tool input: {0}")]
    InvalidInput(String),
    #[error("unknown tool: {0}")]
    UnknownTool(String),
    #[error("fetch failed: {0}")]
    Fetch(String),
    #[error("fetch returned HTTP {status}")]
    FetchStatus { status: u16 },
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

impl crate::error::ErrorCode for ToolError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "E_TOOL_INVALID_INPUT",
            Self::UnknownTool(_) => "E_TOOL_UNKNOWN",
            Self::Fetch(_) => "E_TOOL_FETCH",
            Self::FetchStatus { .. } => "E_TOOL_FETCH_STATUS",
            Self::HttpClientBuild(_) => "E_HTTP_CLIENT_BUILD",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Fetch(_) | Self::FetchStatus { status: 429 | 500..=599 })
    }
}

// =============================================================================
// HANDLER TRAIT
// =============================================================================

/// A callable tool: declaration plus async execution.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    fn definition(&self) -> Tool;

    /// Run the tool with already schema-checked input.
    async fn execute(&self, input: Value) -> Result<Value, ToolError>;
}

// =============================================================================
// SCHEDULE CSV
// =============================================================================

#[derive(Debug, Deserialize)]
struct ScheduleInput {
    location: String,
}

/// Fetches a fixed CSV resource. `location` is echoed back but does not
/// select a different resource.
pub struct ScheduleCsvTool {
    http: reqwest::Client,
    url: String,
}

impl ScheduleCsvTool {
    /// # Errors
    ///
    /// Returns [`ToolError::HttpClientBuild`] if the HTTP client cannot be built.
    pub fn new(url: String, timeout: Duration) -> Result<Self, ToolError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ToolError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, url })
    }
}

#[async_trait::async_trait]
impl ToolHandler for ScheduleCsvTool {
    fn definition(&self) -> Tool {
        schedule_tool()
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        let ScheduleInput { location } =
            serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))?;

        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| ToolError::Fetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::FetchStatus { status: status.as_u16() });
        }
        let csv_data = response
            .text()
            .await
            .map_err(|e| ToolError::Fetch(e.to_string()))?;

        info!(%location, bytes = csv_data.len(), "tool: schedule csv fetched");
        Ok(json!({ "location": location, "csvData": csv_data }))
    }
}

// =============================================================================
// REGISTRY
// =============================================================================

/// How a model tool call was resolved against the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolInvocation {
    /// The tool is declared to the model and has a handler.
    Static,
    /// The model named a tool that was never declared.
    Dynamic,
}

impl ToolInvocation {
    #[must_use]
    pub fn is_dynamic(self) -> bool {
        matches!(self, Self::Dynamic)
    }
}

#[derive(Default)]
pub struct ToolRegistry {
    handlers: BTreeMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, handler: Arc<dyn ToolHandler>) {
        let name = handler.definition().name;
        self.handlers.insert(name, handler);
    }

    /// Declarations passed to the model, in name order.
    #[must_use]
    pub fn definitions(&self) -> Vec<Tool> {
        self.handlers.values().map(|h| h.definition()).collect()
    }

    #[must_use]
    pub fn invocation(&self, name: &str) -> ToolInvocation {
        if self.handlers.contains_key(name) { ToolInvocation::Static } else { ToolInvocation::Dynamic }
    }

    /// Validate input against the tool's schema, then run it.
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::UnknownTool`] for unregistered names,
    /// [`ToolError::InvalidInput`] when the input does not match the schema,
    /// and whatever the handler itself returns.
    pub async fn execute(&self, name: &str, input: Value) -> Result<Value, ToolError> {
        let handler = self
            .handlers
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;
        validate_input(&handler.definition().input_schema, &input)?;
        handler.execute(input).await
    }
}

/// Structural check of `input` against an object schema: required fields
/// present and declared property types matching.
pub(crate) fn validate_input(schema: &Value, input: &Value) -> Result<(), ToolError> {
    let Value::Object(fields) = input else {
        return Err(ToolError::InvalidInput("input must be a JSON object".into()));
    };

    if let Some(required) = schema.get("required").and_then(Value::as_array) {
        for key in required.iter().filter_map(Value::as_str) {
            if !fields.contains_key(key) {
                return Err(ToolError::InvalidInput(format!("missing required field `{key}`")));
            }
        }
    }

    if let Some(properties) = schema.get("properties").and_then(Value::as_object) {
        for (key, value) in fields {
            let Some(expected) = properties
                .get(key)
                .and_then(|p| p.get("type"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if !json_type_matches(expected, value) {
                return Err(ToolError::InvalidInput(format!("field `{key}` must be {expected}")));
            }
        }
    }
    Ok(())
}

fn json_type_matches(expected: &str, value: &Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "number" => value.is_number(),
        "integer" => value.is_i64() || value.is_u64(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
