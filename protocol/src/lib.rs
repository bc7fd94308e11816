//! Shared chat model and UI message stream codec.
//!
//! This crate owns the wire representation used by both `server` and `cli`:
//! the UI [`Message`] with its tagged content parts, the request body posted to
//! `/api/chat`, and the [`Chunk`] events streamed back as server-sent events.

pub mod chunk;
pub mod message;

pub use chunk::{Chunk, DONE_DATA, DONE_EVENT, decode_data, encode_chunk};
pub use message::{FileRef, Message, Part, PartState, Role, ToolPart, ToolState};

use serde::{Deserialize, Serialize};

/// Errors produced while parsing protocol payloads.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// The payload is not valid JSON or does not match the expected shape.
    #[error("invalid payload: {0}")]
    Json(#[from] serde_json::Error),
    /// A content part is structurally invalid.
    #[error("invalid part: {0}")]
    InvalidPart(String),
    /// A content part carries a `type` discriminant this crate does not know.
    #[error("unknown part type `{0}`")]
    UnknownPartType(String),
    /// The request carried no messages.
    #[error("conversation is empty")]
    EmptyConversation,
}

/// Body of `POST /api/chat`: the full ordered conversation so far.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Client-side chat session identifier, used only for log correlation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub messages: Vec<Message>,
}

/// Parse and validate a raw request body.
///
/// # Errors
///
/// Returns [`ProtocolError::Json`] when the body is not JSON, a message is
/// missing `role`/`parts`, or a part fails [`Part`] validation, and
/// [`ProtocolError::EmptyConversation`] when `messages` is empty.
pub fn parse_chat_request(bytes: &[u8]) -> Result<ChatRequest, ProtocolError> {
    let request: ChatRequest = serde_json::from_slice(bytes)?;
    if request.messages.is_empty() {
        return Err(ProtocolError::EmptyConversation);
    }
    Ok(request)
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
