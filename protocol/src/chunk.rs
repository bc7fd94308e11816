//! UI message stream chunks and their server-sent-events framing.
//!
//! Each chunk travels as one SSE event whose `data` is the chunk's JSON
//! object. The stream ends with a literal `data: [DONE]` event. Framing
//! (splitting the byte stream into events) is left to the transport; this
//! module only encodes one chunk and decodes one event payload.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ProtocolError;

/// Payload of the terminal event.
pub const DONE_DATA: &str = "[DONE]";

/// The terminal event, fully framed.
pub const DONE_EVENT: &str = "data: [DONE]\n\n";

/// One incremental unit of an assistant reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Chunk {
    /// Opens the assistant message.
    #[serde(rename_all = "camelCase")]
    Start {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        message_id: Option<String>,
    },
    StartStep,
    TextStart {
        id: String,
    },
    TextDelta {
        id: String,
        delta: String,
    },
    TextEnd {
        id: String,
    },
    #[serde(rename_all = "camelCase")]
    ToolInputAvailable {
        tool_call_id: String,
        tool_name: String,
        input: Value,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        dynamic: Option<bool>,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputAvailable {
        tool_call_id: String,
        output: Value,
    },
    #[serde(rename_all = "camelCase")]
    ToolOutputError {
        tool_call_id: String,
        error_text: String,
    },
    FinishStep,
    /// Closes the assistant message successfully.
    #[serde(rename_all = "camelCase")]
    Finish {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        finish_reason: Option<String>,
    },
    /// Terminal failure after the stream has opened.
    #[serde(rename_all = "camelCase")]
    Error {
        error_text: String,
    },
    /// Any chunk type this crate does not model (e.g. `tool-input-delta`);
    /// consumers skip it.
    #[serde(other)]
    Unknown,
}

impl Chunk {
    /// `true` for chunks after which no further chunks follow.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finish { .. } | Self::Error { .. })
    }
}

/// Frame a chunk as one SSE event.
#[must_use]
pub fn encode_chunk(chunk: &Chunk) -> String {
    // Chunk payloads are string-keyed JSON, so serialization cannot fail.
    let json = serde_json::to_string(chunk).unwrap_or_default();
    format!("data: {json}\n\n")
}

/// Decode the `data` field of one SSE event.
///
/// Returns `Ok(None)` for the terminal `[DONE]` marker.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] when the payload is not a chunk object.
pub fn decode_data(data: &str) -> Result<Option<Chunk>, ProtocolError> {
    let data = data.trim();
    if data == DONE_DATA {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(data)?))
}

#[cfg(test)]
#[path = "chunk_test.rs"]
mod tests;
