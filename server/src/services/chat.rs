//! Chat service: one streaming generation session per request.
//!
//! DESIGN
//! ======
//! A session projects the UI conversation into model messages, then runs up
//! to `max_steps` provider calls. Each call streams text deltas straight
//! through as chunks; tool calls collected during the step are executed in
//! order, their results appended to the history, and the next step starts
//! with that extra context. The loop ends on the first step without tool
//! calls.
//!
//! The first provider call happens in [`ChatSession::open`], before the
//! response is committed, so a refused upstream request can still be
//! reported as an HTTP status instead of an in-stream error.

use std::sync::Arc;

use futures::StreamExt;
use protocol::{ChatRequest, Chunk, ProtocolError};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm::LlmStream;
use crate::llm::convert::to_model_messages;
use crate::llm::types::{
    Content, ContentBlock, EventStream, FinishReason, LlmError, Message, StreamEvent, Tool, Usage,
};
use crate::services::tools::ToolRegistry;
use crate::state::AppState;

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("malformed request: {0}")]
    Malformed(#[from] ProtocolError),
    #[error("LLM not configured")]
    LlmNotConfigured,
    #[error("upstream provider error: {0}")]
    Upstream(#[from] LlmError),
    #[error("generation exceeded the time limit")]
    TimedOut,
    #[error("client disconnected")]
    ClientGone,
}

impl crate::error::ErrorCode for ChatError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Malformed(_) => "E_MALFORMED_REQUEST",
            Self::LlmNotConfigured => "E_LLM_NOT_CONFIGURED",
            Self::Upstream(_) => "E_UPSTREAM",
            Self::TimedOut => "E_TIMED_OUT",
            Self::ClientGone => "E_CLIENT_GONE",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Upstream(e) if e.retryable()) || matches!(self, Self::TimedOut)
    }
}

// =============================================================================
// STEP OBSERVER
// =============================================================================

/// One executed tool call within a step.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    pub input: Value,
    pub dynamic: bool,
    pub result: Result<Value, String>,
}

/// Everything produced by one completed generation step.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRecord {
    pub index: usize,
    pub text: String,
    pub tool_calls: Vec<ToolRecord>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
}

/// Sees every completed step of every session.
pub trait StepObserver: Send + Sync {
    fn on_step_finish(&self, step: &StepRecord);
}

/// Default observer: one structured log line per step.
pub struct LogObserver;

impl StepObserver for LogObserver {
    fn on_step_finish(&self, step: &StepRecord) {
        info!(
            step = step.index,
            finish_reason = step.finish_reason.as_str(),
            text_len = step.text.len(),
            tool_calls = step.tool_calls.len(),
            input_tokens = step.usage.input_tokens,
            output_tokens = step.usage.output_tokens,
            "chat: step finished"
        );
        for call in &step.tool_calls {
            match &call.result {
                Ok(_) => info!(step = step.index, tool = %call.name, dynamic = call.dynamic, "chat: tool ok"),
                Err(e) => warn!(step = step.index, tool = %call.name, error = %e, "chat: tool error"),
            }
        }
    }
}

// =============================================================================
// SESSION
// =============================================================================

pub struct ChatSession {
    llm: Arc<dyn LlmStream>,
    tools: Arc<ToolRegistry>,
    observer: Arc<dyn StepObserver>,
    definitions: Vec<Tool>,
    system: String,
    max_tokens: Option<u32>,
    max_steps: usize,
    history: Vec<Message>,
    first: Option<EventStream>,
    message_id: String,
}

/// Outcome of streaming one provider call.
struct StepOutput {
    text: String,
    calls: Vec<(String, String, Value)>,
    finish_reason: FinishReason,
    usage: Usage,
}

impl ChatSession {
    /// Project the conversation and open the first provider stream.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::LlmNotConfigured`] when no provider is set up and
    /// [`ChatError::Upstream`] when the provider refuses the request.
    pub async fn open(state: &AppState, request: &ChatRequest) -> Result<Self, ChatError> {
        let llm = state.llm.clone().ok_or(ChatError::LlmNotConfigured)?;
        let history = to_model_messages(&request.messages);
        let mut session = Self {
            llm,
            tools: Arc::clone(&state.tools),
            observer: Arc::clone(&state.observer),
            definitions: state.tools.definitions(),
            system: state.config.system_prompt.clone(),
            max_tokens: state.config.max_tokens,
            max_steps: state.config.max_steps.max(1),
            history,
            first: None,
            message_id: Uuid::new_v4().to_string(),
        };
        info!(
            messages = request.messages.len(),
            model_messages = session.history.len(),
            tools = session.definitions.len(),
            "chat: session opened"
        );
        session.first = Some(session.next_stream().await?);
        Ok(session)
    }

    /// Must take `&mut self`: a shared borrow of the non-`Sync` pending
    /// stream held across this await makes the caller's future non-`Send`.
    async fn next_stream(&mut self) -> Result<EventStream, LlmError> {
        let tools = if self.definitions.is_empty() { None } else { Some(self.definitions.as_slice()) };
        self.llm
            .stream(self.max_tokens, &self.system, &self.history, tools)
            .await
    }

    /// Drive the session to completion, writing chunks into `tx`.
    ///
    /// Emits everything up to and including `finish`; the caller appends the
    /// `[DONE]` marker and reports returned errors as an `error` chunk.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Upstream`] when a provider call or stream fails
    /// and [`ChatError::ClientGone`] once the receiver is dropped.
    pub async fn run(mut self, tx: &mpsc::Sender<Chunk>) -> Result<FinishReason, ChatError> {
        send(tx, Chunk::Start { message_id: Some(self.message_id.clone()) }).await?;

        let mut finish_reason = FinishReason::Stop;
        for index in 0..self.max_steps {
            let events = match self.first.take() {
                Some(events) => events,
                None => self.next_stream().await?,
            };

            send(tx, Chunk::StartStep).await?;
            let output = stream_step(events, tx).await?;
            finish_reason = output.finish_reason;

            let has_tool_calls = !output.calls.is_empty();
            let record = self.execute_tools(index, output, tx).await?;
            self.observer.on_step_finish(&record);
            send(tx, Chunk::FinishStep).await?;

            if !has_tool_calls {
                break;
            }
            if index + 1 == self.max_steps {
                warn!(max_steps = self.max_steps, "chat: step limit reached with pending tool results");
            }
        }

        send(tx, Chunk::Finish { finish_reason: Some(finish_reason.as_str().to_string()) }).await?;
        Ok(finish_reason)
    }

    /// Run the step's tool calls, stream their results and extend the history.
    async fn execute_tools(
        &mut self,
        index: usize,
        output: StepOutput,
        tx: &mpsc::Sender<Chunk>,
    ) -> Result<StepRecord, ChatError> {
        let mut assistant_blocks = Vec::new();
        if !output.text.is_empty() {
            assistant_blocks.push(ContentBlock::Text { text: output.text.clone() });
        }
        let mut results = Vec::new();
        let mut records = Vec::new();

        for (id, name, input) in output.calls {
            let dynamic = self.tools.invocation(&name).is_dynamic();
            send(
                tx,
                Chunk::ToolInputAvailable {
                    tool_call_id: id.clone(),
                    tool_name: name.clone(),
                    input: input.clone(),
                    dynamic: dynamic.then_some(true),
                },
            )
            .await?;

            let result = self.tools.execute(&name, input.clone()).await.map_err(|e| e.to_string());
            let block = match &result {
                Ok(value) => {
                    send(tx, Chunk::ToolOutputAvailable { tool_call_id: id.clone(), output: value.clone() }).await?;
                    ContentBlock::ToolResult { tool_use_id: id.clone(), content: value.to_string(), is_error: None }
                }
                Err(error_text) => {
                    send(tx, Chunk::ToolOutputError { tool_call_id: id.clone(), error_text: error_text.clone() })
                        .await?;
                    ContentBlock::ToolResult { tool_use_id: id.clone(), content: error_text.clone(), is_error: Some(true) }
                }
            };

            assistant_blocks.push(ContentBlock::ToolUse { id: id.clone(), name: name.clone(), input: input.clone() });
            results.push(block);
            records.push(ToolRecord { id, name, input, dynamic, result });
        }

        if !assistant_blocks.is_empty() {
            self.history.push(Message { role: "assistant".into(), content: Content::Blocks(assistant_blocks) });
        }
        if !results.is_empty() {
            self.history.push(Message { role: "tool".into(), content: Content::Blocks(results) });
        }

        Ok(StepRecord {
            index,
            text: output.text,
            tool_calls: records,
            finish_reason: output.finish_reason,
            usage: output.usage,
        })
    }
}

/// Forward one provider stream as text chunks and collect its tool calls.
async fn stream_step(mut events: EventStream, tx: &mpsc::Sender<Chunk>) -> Result<StepOutput, ChatError> {
    let text_id = Uuid::new_v4().to_string();
    let mut output = StepOutput {
        text: String::new(),
        calls: Vec::new(),
        finish_reason: FinishReason::Stop,
        usage: Usage::default(),
    };
    let mut text_open = false;

    while let Some(event) = events.next().await {
        match event? {
            StreamEvent::TextDelta(delta) => {
                if !text_open {
                    send(tx, Chunk::TextStart { id: text_id.clone() }).await?;
                    text_open = true;
                }
                output.text.push_str(&delta);
                send(tx, Chunk::TextDelta { id: text_id.clone(), delta }).await?;
            }
            StreamEvent::ToolCall { id, name, input } => output.calls.push((id, name, input)),
            StreamEvent::Finish { reason, usage } => {
                output.finish_reason = reason;
                output.usage = usage;
            }
        }
    }

    if text_open {
        send(tx, Chunk::TextEnd { id: text_id }).await?;
    }
    Ok(output)
}

async fn send(tx: &mpsc::Sender<Chunk>, chunk: Chunk) -> Result<(), ChatError> {
    tx.send(chunk).await.map_err(|_| ChatError::ClientGone)
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
