//! Client-side conversation state.
//!
//! DESIGN
//! ======
//! The store is the single source of truth for the terminal front-end: the
//! ordered messages, the pending input line and the request status. It never
//! performs I/O. `submit` hands back the request body to send, and the
//! caller feeds decoded chunks into `apply` until a terminal chunk, a
//! transport failure (`fail`) or the end of the stream (`complete`) returns
//! the store to a non-streaming status.

use std::collections::HashMap;

use protocol::{ChatRequest, Chunk, Message, Part, PartState, Role, ToolPart, ToolState};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    Idle,
    Streaming,
    Error,
}

pub struct ConversationStore {
    id: String,
    messages: Vec<Message>,
    status: RequestStatus,
    input: String,
    error: Option<String>,
    /// Index of the assistant message receiving the current stream.
    reply: Option<usize>,
    /// Text part positions within the reply, keyed by chunk `id`.
    text_parts: HashMap<String, usize>,
}

impl Default for ConversationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConversationStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            messages: Vec::new(),
            status: RequestStatus::Idle,
            input: String::new(),
            error: None,
            reply: None,
            text_parts: HashMap::new(),
        }
    }

    #[must_use]
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[must_use]
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    #[cfg(test)]
    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }

    /// Reason for the last failed request, if the store is in `Error`.
    #[must_use]
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Submit the pending input line.
    pub fn submit_input(&mut self) -> Option<ChatRequest> {
        let text = self.input.clone();
        self.submit(&text)
    }

    /// Append a user message and start a request.
    ///
    /// Returns `None` without touching state when `text` is blank or a
    /// response is still streaming.
    pub fn submit(&mut self, text: &str) -> Option<ChatRequest> {
        if text.trim().is_empty() || self.status == RequestStatus::Streaming {
            return None;
        }
        self.messages.push(Message::user_text(text));
        self.input.clear();
        self.status = RequestStatus::Streaming;
        self.error = None;
        self.reply = None;
        self.text_parts.clear();
        Some(ChatRequest { id: Some(self.id.clone()), messages: self.messages.clone() })
    }

    /// Fold one stream chunk into the trailing assistant message.
    ///
    /// Chunks arriving while no request is streaming are ignored.
    pub fn apply(&mut self, chunk: &Chunk) {
        if self.status != RequestStatus::Streaming {
            return;
        }
        match chunk {
            Chunk::Start { message_id } => {
                let reply = self.reply_mut();
                if let Some(id) = message_id {
                    reply.id.clone_from(id);
                }
            }
            Chunk::StartStep => self.reply_mut().parts.push(Part::StepStart),
            Chunk::TextStart { id } => {
                self.text_part_mut(id);
            }
            Chunk::TextDelta { id, delta } => {
                if let Part::Text { text, .. } = self.text_part_mut(id) {
                    text.push_str(delta);
                }
            }
            Chunk::TextEnd { id } => {
                if let Part::Text { state, .. } = self.text_part_mut(id) {
                    *state = Some(PartState::Done);
                }
            }
            Chunk::ToolInputAvailable { tool_call_id, tool_name, input, dynamic } => {
                let call = ToolPart::input_available(tool_call_id.clone(), input.clone());
                let part = if dynamic.unwrap_or(false) {
                    Part::DynamicTool { tool_name: tool_name.clone(), call }
                } else {
                    Part::Tool { tool_name: tool_name.clone(), call }
                };
                self.reply_mut().parts.push(part);
            }
            Chunk::ToolOutputAvailable { tool_call_id, output } => {
                if let Some(call) = self.tool_call_mut(tool_call_id) {
                    call.state = ToolState::OutputAvailable;
                    call.output = Some(output.clone());
                }
            }
            Chunk::ToolOutputError { tool_call_id, error_text } => {
                if let Some(call) = self.tool_call_mut(tool_call_id) {
                    call.state = ToolState::OutputError;
                    call.error_text = Some(error_text.clone());
                }
            }
            Chunk::FinishStep | Chunk::Unknown => {}
            Chunk::Finish { .. } => self.end(RequestStatus::Idle, None),
            Chunk::Error { error_text } => self.end(RequestStatus::Error, Some(error_text.clone())),
        }
    }

    /// Record a transport failure for the in-flight request.
    pub fn fail(&mut self, reason: impl Into<String>) {
        if self.status == RequestStatus::Streaming {
            self.end(RequestStatus::Error, Some(reason.into()));
        }
    }

    /// Close a stream that ended cleanly without a terminal chunk.
    pub fn complete(&mut self) {
        if self.status == RequestStatus::Streaming {
            self.end(RequestStatus::Idle, None);
        }
    }

    fn end(&mut self, status: RequestStatus, error: Option<String>) {
        self.status = status;
        self.error = error;
        self.reply = None;
        self.text_parts.clear();
    }

    fn reply_mut(&mut self) -> &mut Message {
        let index = match self.reply {
            Some(index) => index,
            None => {
                self.messages.push(Message {
                    id: Uuid::new_v4().to_string(),
                    role: Role::Assistant,
                    parts: Vec::new(),
                    metadata: None,
                });
                let index = self.messages.len() - 1;
                self.reply = Some(index);
                index
            }
        };
        &mut self.messages[index]
    }

    /// The text part for `id`, created on first reference.
    fn text_part_mut(&mut self, id: &str) -> &mut Part {
        let index = match self.text_parts.get(id) {
            Some(&index) => index,
            None => {
                let parts = &mut self.reply_mut().parts;
                parts.push(Part::Text { text: String::new(), state: Some(PartState::Streaming) });
                let index = parts.len() - 1;
                self.text_parts.insert(id.to_owned(), index);
                index
            }
        };
        &mut self.reply_mut().parts[index]
    }

    fn tool_call_mut(&mut self, tool_call_id: &str) -> Option<&mut ToolPart> {
        self.reply_mut()
            .parts
            .iter_mut()
            .rev()
            .filter_map(Part::as_tool_mut)
            .find(|call| call.tool_call_id == tool_call_id)
    }
}

#[cfg(test)]
#[path = "store_test.rs"]
mod tests;
