//! Tool declarations exposed to the model.

use super::types::Tool;

/// Name of the schedule CSV tool as seen by the model and in `tool-<name>` parts.
pub const SCHEDULE_TOOL: &str = "getScheduleCsv";

/// Declaration of the schedule CSV fetch tool.
#[must_use]
pub fn schedule_tool() -> Tool {
    Tool {
        name: SCHEDULE_TOOL.into(),
        description: "Fetch the current schedule as CSV text for a location.".into(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "location": { "type": "string", "description": "Location the user is asking about" }
            },
            "required": ["location"]
        }),
    }
}

#[cfg(test)]
#[path = "tools_test.rs"]
mod tests;
