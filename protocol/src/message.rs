//! UI messages and their tagged content parts.
//!
//! DESIGN
//! ======
//! Parts are discriminated by a `type` field. Statically declared tools carry
//! their name inside the discriminant (`tool-getScheduleCsv`), dynamic tools
//! use `dynamic-tool` plus a `toolName` field. Because the static tool tag is
//! open-ended, [`Part`] goes through `serde_json::Value` instead of a derived
//! internally-tagged enum, and every discriminant is checked on the way in.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ProtocolError;

const TOOL_TYPE_PREFIX: &str = "tool-";
const DYNAMIC_TOOL_TYPE: &str = "dynamic-tool";

// =============================================================================
// MESSAGE
// =============================================================================

/// Author of a message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One turn in a conversation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub id: String,
    pub role: Role,
    pub parts: Vec<Part>,
    /// UI-only metadata; never forwarded to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

impl Message {
    /// Build a user message holding a single text part.
    #[must_use]
    pub fn user_text(text: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            role: Role::User,
            parts: vec![Part::Text { text: text.into(), state: None }],
            metadata: None,
        }
    }

    /// Concatenate all text parts in order.
    #[must_use]
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text, .. } => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }
}

// =============================================================================
// PARTS
// =============================================================================

/// Streaming state of a text part.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartState {
    Streaming,
    Done,
}

/// Lifecycle of a tool invocation inside an assistant message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ToolState {
    InputStreaming,
    InputAvailable,
    OutputAvailable,
    OutputError,
}

/// Fields shared by static and dynamic tool parts.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPart {
    pub tool_call_id: String,
    pub state: ToolState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_text: Option<String>,
}

impl ToolPart {
    /// A tool call whose input has been fully received.
    #[must_use]
    pub fn input_available(tool_call_id: impl Into<String>, input: Value) -> Self {
        Self {
            tool_call_id: tool_call_id.into(),
            state: ToolState::InputAvailable,
            input: Some(input),
            output: None,
            error_text: None,
        }
    }
}

/// A file attached to a message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileRef {
    pub media_type: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

/// A single content part. Order within a message is display order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub enum Part {
    Text { text: String, state: Option<PartState> },
    Reasoning { text: String },
    File(FileRef),
    /// Boundary between two generation steps of one assistant turn.
    StepStart,
    /// Invocation of a statically declared tool; the name is part of the tag.
    Tool { tool_name: String, call: ToolPart },
    /// Invocation of a tool whose input shape is unknown ahead of time.
    DynamicTool { tool_name: String, call: ToolPart },
}

impl Part {
    /// The wire discriminant of this part.
    #[must_use]
    pub fn kind(&self) -> String {
        match self {
            Self::Text { .. } => "text".to_owned(),
            Self::Reasoning { .. } => "reasoning".to_owned(),
            Self::File(_) => "file".to_owned(),
            Self::StepStart => "step-start".to_owned(),
            Self::Tool { tool_name, .. } => format!("{TOOL_TYPE_PREFIX}{tool_name}"),
            Self::DynamicTool { .. } => DYNAMIC_TOOL_TYPE.to_owned(),
        }
    }

    /// Tool name and call fields when this part is a tool invocation.
    #[must_use]
    pub fn as_tool(&self) -> Option<(&str, &ToolPart)> {
        match self {
            Self::Tool { tool_name, call } | Self::DynamicTool { tool_name, call } => Some((tool_name, call)),
            _ => None,
        }
    }

    /// Mutable tool call fields when this part is a tool invocation.
    pub fn as_tool_mut(&mut self) -> Option<&mut ToolPart> {
        match self {
            Self::Tool { call, .. } | Self::DynamicTool { call, .. } => Some(call),
            _ => None,
        }
    }
}

#[derive(Deserialize)]
struct TextFields {
    text: String,
    #[serde(default)]
    state: Option<PartState>,
}

#[derive(Deserialize)]
struct ReasoningFields {
    text: String,
}

fn fields_into<T: serde::de::DeserializeOwned>(kind: &str, fields: Map<String, Value>) -> Result<T, ProtocolError> {
    serde_json::from_value(Value::Object(fields)).map_err(|e| ProtocolError::InvalidPart(format!("{kind}: {e}")))
}

impl TryFrom<Value> for Part {
    type Error = ProtocolError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        let Value::Object(mut fields) = value else {
            return Err(ProtocolError::InvalidPart("part must be an object".into()));
        };
        let kind = match fields.remove("type") {
            Some(Value::String(kind)) => kind,
            _ => return Err(ProtocolError::InvalidPart("part is missing string `type`".into())),
        };

        match kind.as_str() {
            "text" => {
                let TextFields { text, state } = fields_into(&kind, fields)?;
                Ok(Self::Text { text, state })
            }
            "reasoning" => {
                let ReasoningFields { text } = fields_into(&kind, fields)?;
                Ok(Self::Reasoning { text })
            }
            "file" => Ok(Self::File(fields_into(&kind, fields)?)),
            "step-start" => Ok(Self::StepStart),
            DYNAMIC_TOOL_TYPE => {
                let tool_name = match fields.remove("toolName") {
                    Some(Value::String(name)) if !name.is_empty() => name,
                    _ => return Err(ProtocolError::InvalidPart("dynamic-tool: missing `toolName`".into())),
                };
                let call = fields_into(&kind, fields)?;
                Ok(Self::DynamicTool { tool_name, call })
            }
            other => match other.strip_prefix(TOOL_TYPE_PREFIX) {
                Some(name) if !name.is_empty() => {
                    let call = fields_into(&kind, fields)?;
                    Ok(Self::Tool { tool_name: name.to_owned(), call })
                }
                _ => Err(ProtocolError::UnknownPartType(other.to_owned())),
            },
        }
    }
}

impl From<Part> for Value {
    fn from(part: Part) -> Self {
        let kind = part.kind();
        let mut fields = match part {
            Part::Text { text, state } => {
                let mut map = Map::new();
                map.insert("text".into(), Value::String(text));
                if let Some(state) = state {
                    map.insert("state".into(), serde_json::to_value(state).unwrap_or(Value::Null));
                }
                map
            }
            Part::Reasoning { text } => {
                let mut map = Map::new();
                map.insert("text".into(), Value::String(text));
                map
            }
            Part::File(file) => object_fields(serde_json::to_value(file)),
            Part::StepStart => Map::new(),
            Part::Tool { call, .. } => object_fields(serde_json::to_value(call)),
            Part::DynamicTool { tool_name, call } => {
                let mut map = object_fields(serde_json::to_value(call));
                map.insert("toolName".into(), Value::String(tool_name));
                map
            }
        };
        fields.insert("type".into(), Value::String(kind));
        Value::Object(fields)
    }
}

/// Derived `Serialize` impls for plain structs always yield objects.
fn object_fields(value: Result<Value, serde_json::Error>) -> Map<String, Value> {
    match value {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

#[cfg(test)]
#[path = "message_test.rs"]
mod tests;
