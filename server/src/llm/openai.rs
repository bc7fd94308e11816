//! OpenAI-compatible streaming client for `/chat/completions`.
//!
//! DESIGN
//! ======
//! The request is sent with `stream: true`; the response body is an SSE
//! stream of `chat.completion.chunk` objects. Text deltas are forwarded as
//! soon as they are decoded. Tool call fragments arrive split across chunks
//! (keyed by `index`) and are assembled by [`StreamAccumulator`], then
//! released together with the final [`StreamEvent::Finish`].

use std::collections::{BTreeMap, VecDeque};
use std::time::Duration;

use eventsource_stream::Eventsource;
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use super::config::LlmTimeouts;
use super::types::{
    Content, ContentBlock, EventStream, FinishReason, LlmError, Message, StreamEvent, Tool, Usage,
};

const DONE_MARKER: &str = "[DONE]";

pub struct OpenAiClient {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
}

impl OpenAiClient {
    /// Build a client for an OpenAI-compatible API rooted at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::HttpClientBuild`] if the TLS backend fails to initialise.
    pub fn new(api_key: String, base_url: String, timeouts: LlmTimeouts) -> Result<Self, LlmError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeouts.request_secs))
            .connect_timeout(Duration::from_secs(timeouts.connect_secs))
            .build()
            .map_err(|e| LlmError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, api_key, base_url })
    }

    /// Open one streaming chat completion.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::ApiRequest`] when the request cannot be sent and
    /// [`LlmError::ApiResponse`] for a non-success status.
    pub async fn stream(
        &self,
        model: &str,
        max_tokens: Option<u32>,
        system: &str,
        messages: &[Message],
        tools: Option<&[Tool]>,
    ) -> Result<EventStream, LlmError> {
        let msgs = build_chat_completions_messages(system, messages);
        let tool_defs: Option<Vec<CcToolDef<'_>>> = tools
            .filter(|t| !t.is_empty())
            .map(|t| t.iter().map(CcToolDef::from).collect());
        let body = CcRequest {
            model,
            max_tokens,
            messages: &msgs,
            tools: tool_defs.as_deref(),
            stream: true,
            stream_options: CcStreamOptions { include_usage: true },
        };

        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::ApiRequest(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::ApiResponse { status: status.as_u16(), body });
        }

        Ok(decode_stream(response.bytes_stream()))
    }
}

// =============================================================================
// REQUEST: wire types
// =============================================================================

#[derive(Serialize)]
struct CcRequest<'a> {
    model: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    messages: &'a [CcMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<&'a [CcToolDef<'a>]>,
    stream: bool,
    stream_options: CcStreamOptions,
}

#[derive(Serialize)]
struct CcStreamOptions {
    include_usage: bool,
}

#[derive(Debug, Serialize)]
pub(crate) struct CcMessage {
    role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<CcToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct CcToolCall {
    id: String,
    #[serde(rename = "type")]
    call_type: &'static str,
    function: CcFunctionCall,
}

#[derive(Debug, Serialize)]
struct CcFunctionCall {
    name: String,
    arguments: String,
}

#[derive(Serialize)]
struct CcToolDef<'a> {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: CcFunctionDef<'a>,
}

#[derive(Serialize)]
struct CcFunctionDef<'a> {
    name: &'a str,
    description: &'a str,
    parameters: &'a Value,
}

impl<'a> From<&'a Tool> for CcToolDef<'a> {
    fn from(tool: &'a Tool) -> Self {
        Self {
            tool_type: "function",
            function: CcFunctionDef { name: &tool.name, description: &tool.description, parameters: &tool.input_schema },
        }
    }
}

pub(crate) fn build_chat_completions_messages(system: &str, messages: &[Message]) -> Vec<CcMessage> {
    let mut out = Vec::new();
    if !system.trim().is_empty() {
        out.push(CcMessage {
            role: "system".to_string(),
            content: Some(system.to_string()),
            tool_calls: None,
            tool_call_id: None,
        });
    }
    for message in messages {
        match &message.content {
            Content::Text(text) => {
                out.push(CcMessage {
                    role: message.role.clone(),
                    content: Some(text.clone()),
                    tool_calls: None,
                    tool_call_id: None,
                });
            }
            Content::Blocks(blocks) => {
                let mut text = String::new();
                let mut tool_calls = Vec::new();
                let mut tool_results = Vec::new();
                for block in blocks {
                    match block {
                        ContentBlock::Text { text: t } => text.push_str(t),
                        ContentBlock::ToolUse { id, name, input } => {
                            tool_calls.push(CcToolCall {
                                id: id.clone(),
                                call_type: "function",
                                function: CcFunctionCall {
                                    name: name.clone(),
                                    arguments: serde_json::to_string(input).unwrap_or_else(|_| "{}".to_string()),
                                },
                            });
                        }
                        ContentBlock::ToolResult { tool_use_id, content, is_error: _ } => {
                            tool_results.push(CcMessage {
                                role: "tool".to_string(),
                                content: Some(content.clone()),
                                tool_calls: None,
                                tool_call_id: Some(tool_use_id.clone()),
                            });
                        }
                        ContentBlock::Thinking { .. } => {}
                    }
                }
                if !text.is_empty() || !tool_calls.is_empty() {
                    out.push(CcMessage {
                        role: message.role.clone(),
                        content: if text.is_empty() { None } else { Some(text) },
                        tool_calls: if tool_calls.is_empty() { None } else { Some(tool_calls) },
                        tool_call_id: None,
                    });
                }
                out.extend(tool_results);
            }
        }
    }
    out
}

// =============================================================================
// RESPONSE: streamed chunk wire types
// =============================================================================

#[derive(Deserialize)]
struct CcChunk {
    #[serde(default)]
    choices: Vec<CcChoice>,
    #[serde(default)]
    usage: Option<CcUsage>,
}

#[derive(Deserialize)]
struct CcChoice {
    #[serde(default)]
    delta: CcDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Default, Deserialize)]
struct CcDelta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<CcToolCallDelta>>,
}

#[derive(Deserialize)]
struct CcToolCallDelta {
    #[serde(default)]
    index: usize,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    function: Option<CcFunctionDelta>,
}

#[derive(Deserialize)]
struct CcFunctionDelta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[derive(Deserialize)]
struct CcUsage {
    #[serde(default)]
    prompt_tokens: u64,
    #[serde(default)]
    completion_tokens: u64,
}

#[derive(Default)]
struct PendingToolCall {
    id: Option<String>,
    name: String,
    arguments: String,
}

/// Incremental decoder state for one streamed completion.
#[derive(Default)]
pub(crate) struct StreamAccumulator {
    tool_calls: BTreeMap<usize, PendingToolCall>,
    finish_reason: Option<FinishReason>,
    usage: Usage,
}

impl StreamAccumulator {
    /// Feed one SSE `data` payload; returns the events it completes.
    pub(crate) fn push(&mut self, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
        let chunk: CcChunk = serde_json::from_str(data).map_err(|e| LlmError::ApiParse(e.to_string()))?;
        let mut events = Vec::new();

        if let Some(usage) = chunk.usage {
            self.usage = Usage { input_tokens: usage.prompt_tokens, output_tokens: usage.completion_tokens };
        }

        for choice in chunk.choices {
            if let Some(text) = choice.delta.content {
                if !text.is_empty() {
                    events.push(StreamEvent::TextDelta(text));
                }
            }
            for delta in choice.delta.tool_calls.unwrap_or_default() {
                let pending = self.tool_calls.entry(delta.index).or_default();
                if let Some(id) = delta.id {
                    pending.id = Some(id);
                }
                if let Some(function) = delta.function {
                    if let Some(name) = function.name {
                        pending.name.push_str(&name);
                    }
                    if let Some(arguments) = function.arguments {
                        pending.arguments.push_str(&arguments);
                    }
                }
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(FinishReason::from_openai(&reason));
            }
        }
        Ok(events)
    }

    /// Release assembled tool calls followed by the step's finish event.
    pub(crate) fn finish(&mut self) -> Result<Vec<StreamEvent>, LlmError> {
        let mut events = Vec::new();
        for (index, pending) in std::mem::take(&mut self.tool_calls) {
            let Some(id) = pending.id else {
                return Err(LlmError::ApiParse(format!("tool call {index} missing id")));
            };
            let input = if pending.arguments.trim().is_empty() {
                Value::Object(serde_json::Map::default())
            } else {
                serde_json::from_str::<Value>(&pending.arguments).unwrap_or_else(|e| {
                    debug!(tool = %pending.name, error = %e, "openai: tool arguments are not valid JSON");
                    Value::Object(serde_json::Map::default())
                })
            };
            events.push(StreamEvent::ToolCall { id, name: pending.name, input });
        }

        let has_tool_calls = events.iter().any(|e| matches!(e, StreamEvent::ToolCall { .. }));
        let reason = match self.finish_reason {
            Some(reason) => reason,
            None if has_tool_calls => FinishReason::ToolCalls,
            None => FinishReason::Stop,
        };
        events.push(StreamEvent::Finish { reason, usage: self.usage });
        Ok(events)
    }
}

/// Turn a raw SSE byte stream into [`StreamEvent`]s.
pub(crate) fn decode_stream<S, B, E>(bytes: S) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    struct DecodeState<T> {
        events: std::pin::Pin<Box<T>>,
        acc: StreamAccumulator,
        pending: VecDeque<Result<StreamEvent, LlmError>>,
        done: bool,
    }

    let state = DecodeState {
        events: Box::pin(bytes.eventsource()),
        acc: StreamAccumulator::default(),
        pending: VecDeque::new(),
        done: false,
    };

    Box::pin(futures::stream::unfold(state, |mut state| async move {
        loop {
            if let Some(item) = state.pending.pop_front() {
                return Some((item, state));
            }
            if state.done {
                return None;
            }
            match state.events.next().await {
                Some(Ok(event)) if event.data.trim() == DONE_MARKER => {
                    state.done = true;
                    extend_results(&mut state.pending, state.acc.finish());
                }
                Some(Ok(event)) => match state.acc.push(&event.data) {
                    Ok(events) => state.pending.extend(events.into_iter().map(Ok)),
                    Err(e) => {
                        state.done = true;
                        state.pending.push_back(Err(e));
                    }
                },
                Some(Err(e)) => {
                    state.done = true;
                    state.pending.push_back(Err(LlmError::StreamInterrupted(e.to_string())));
                }
                None => {
                    // Some compatible servers close without `[DONE]`.
                    state.done = true;
                    extend_results(&mut state.pending, state.acc.finish());
                }
            }
        }
    }))
}

fn extend_results(
    pending: &mut VecDeque<Result<StreamEvent, LlmError>>,
    events: Result<Vec<StreamEvent>, LlmError>,
) {
    match events {
        Ok(events) => pending.extend(events.into_iter().map(Ok)),
        Err(e) => pending.push_back(Err(e)),
    }
}

#[cfg(test)]
#[path = "openai_test.rs"]
mod tests;
