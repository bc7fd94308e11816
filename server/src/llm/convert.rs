//! Projection from UI messages to model messages.
//!
//! UI metadata, file attachments and unfinished tool calls are dropped.
//! An assistant turn that spans several generation steps is split at each
//! `step-start` part so every tool call is immediately followed by its result.

use protocol::{Part, Role, ToolState};
use tracing::debug;

use super::types::{Content, ContentBlock, Message};

/// Convert a UI conversation into the messages sent to the provider.
#[must_use]
pub fn to_model_messages(messages: &[protocol::Message]) -> Vec<Message> {
    let mut out = Vec::with_capacity(messages.len());
    for message in messages {
        match message.role {
            Role::System => {
                let text = message.text();
                if !text.is_empty() {
                    out.push(Message { role: "system".into(), content: Content::Text(text) });
                }
            }
            Role::User => push_user(&mut out, message),
            Role::Assistant => push_assistant(&mut out, message),
        }
    }
    out
}

fn push_user(out: &mut Vec<Message>, message: &protocol::Message) {
    let mut blocks = Vec::new();
    for part in &message.parts {
        match part {
            Part::Text { text, .. } => blocks.push(ContentBlock::Text { text: text.clone() }),
            other => debug!(id = %message.id, part = %other.kind(), "convert: dropping non-text user part"),
        }
    }
    if !blocks.is_empty() {
        out.push(Message { role: "user".into(), content: Content::Blocks(blocks) });
    }
}

fn push_assistant(out: &mut Vec<Message>, message: &protocol::Message) {
    let mut step = Step::default();
    for part in &message.parts {
        match part {
            Part::StepStart => step.flush(out),
            Part::Text { text, .. } => step.calls.push(ContentBlock::Text { text: text.clone() }),
            Part::Reasoning { text } => step.calls.push(ContentBlock::Thinking { thinking: text.clone() }),
            Part::File(_) => debug!(id = %message.id, "convert: dropping assistant file part"),
            Part::Tool { tool_name, call } | Part::DynamicTool { tool_name, call } => {
                let result = match call.state {
                    ToolState::OutputAvailable => ContentBlock::ToolResult {
                        tool_use_id: call.tool_call_id.clone(),
                        content: call.output.as_ref().map(ToString::to_string).unwrap_or_default(),
                        is_error: None,
                    },
                    ToolState::OutputError => ContentBlock::ToolResult {
                        tool_use_id: call.tool_call_id.clone(),
                        content: call.error_text.clone().unwrap_or_default(),
                        is_error: Some(true),
                    },
                    ToolState::InputStreaming | ToolState::InputAvailable => {
                        debug!(call = %call.tool_call_id, "convert: dropping unresolved tool call");
                        continue;
                    }
                };
                step.calls.push(ContentBlock::ToolUse {
                    id: call.tool_call_id.clone(),
                    name: tool_name.clone(),
                    input: call.input.clone().unwrap_or_else(|| serde_json::json!({})),
                });
                step.results.push(result);
            }
        }
    }
    step.flush(out);
}

/// Blocks collected for one generation step of an assistant turn.
#[derive(Default)]
struct Step {
    calls: Vec<ContentBlock>,
    results: Vec<ContentBlock>,
}

impl Step {
    fn flush(&mut self, out: &mut Vec<Message>) {
        if self.calls.iter().any(|b| !matches!(b, ContentBlock::Thinking { .. })) {
            out.push(Message { role: "assistant".into(), content: Content::Blocks(std::mem::take(&mut self.calls)) });
        }
        self.calls.clear();
        if !self.results.is_empty() {
            out.push(Message { role: "tool".into(), content: Content::Blocks(std::mem::take(&mut self.results)) });
        }
    }
}

#[cfg(test)]
#[path = "convert_test.rs"]
mod tests;
