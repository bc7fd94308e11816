use std::sync::Mutex;

use protocol::Message as UiMessage;
use serde_json::json;

use super::*;
use crate::config::ChatConfig;
use crate::error::ErrorCode;
use crate::services::tools::{ToolError, ToolHandler};
use crate::state::test_helpers::{MockLlm, MockStep, test_app_state, test_app_state_with_llm, text_step, tool_step};

// =============================================================================
// Fixtures
// =============================================================================

/// Tool that echoes its input, or fails when `fail` is set.
struct EchoTool {
    fail: bool,
}

#[async_trait::async_trait]
impl ToolHandler for EchoTool {
    fn definition(&self) -> Tool {
        crate::llm::tools::schedule_tool()
    }

    async fn execute(&self, input: Value) -> Result<Value, ToolError> {
        if self.fail {
            return Err(ToolError::FetchStatus { status: 503 });
        }
        Ok(json!({ "location": input["location"], "csvData": "a,b\n1,2\n" }))
    }
}

#[derive(Default)]
struct RecordingObserver {
    steps: Mutex<Vec<StepRecord>>,
}

impl StepObserver for RecordingObserver {
    fn on_step_finish(&self, step: &StepRecord) {
        self.steps.lock().unwrap().push(step.clone());
    }
}

fn request(text: &str) -> ChatRequest {
    ChatRequest { id: None, messages: vec![UiMessage::user_text(text)] }
}

fn state_with_tool(llm: Arc<MockLlm>, fail: bool) -> AppState {
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool { fail }));
    AppState::new(Some(llm), tools, ChatConfig::default())
}

async fn run_to_end(state: &AppState, req: &ChatRequest) -> (Result<FinishReason, ChatError>, Vec<Chunk>) {
    let session = ChatSession::open(state, req).await.unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let result = session.run(&tx).await;
    drop(tx);
    let mut chunks = Vec::new();
    while let Some(chunk) = rx.recv().await {
        chunks.push(chunk);
    }
    (result, chunks)
}

fn types(chunks: &[Chunk]) -> Vec<&'static str> {
    chunks
        .iter()
        .map(|c| match c {
            Chunk::Start { .. } => "start",
            Chunk::StartStep => "start-step",
            Chunk::TextStart { .. } => "text-start",
            Chunk::TextDelta { .. } => "text-delta",
            Chunk::TextEnd { .. } => "text-end",
            Chunk::ToolInputAvailable { .. } => "tool-input-available",
            Chunk::ToolOutputAvailable { .. } => "tool-output-available",
            Chunk::ToolOutputError { .. } => "tool-output-error",
            Chunk::FinishStep => "finish-step",
            Chunk::Finish { .. } => "finish",
            Chunk::Error { .. } => "error",
            Chunk::Unknown => "unknown",
        })
        .collect()
}

fn streamed_text(chunks: &[Chunk]) -> String {
    chunks
        .iter()
        .filter_map(|c| match c {
            Chunk::TextDelta { delta, .. } => Some(delta.as_str()),
            _ => None,
        })
        .collect()
}

// =============================================================================
// open
// =============================================================================

#[tokio::test]
async fn open_without_llm_is_not_configured() {
    let result = ChatSession::open(&test_app_state(), &request("hi")).await;
    assert!(matches!(result, Err(ChatError::LlmNotConfigured)));
}

#[tokio::test]
async fn open_surfaces_upstream_refusal() {
    let llm = Arc::new(MockLlm::new(vec![MockStep::Reject(LlmError::ApiResponse {
        status: 401,
        body: "bad key".into(),
    })]));
    let result = ChatSession::open(&test_app_state_with_llm(llm), &request("hi")).await;
    let Err(err) = result else { panic!("expected upstream error") };
    assert!(matches!(err, ChatError::Upstream(LlmError::ApiResponse { status: 401, .. })));
    assert_eq!(err.error_code(), "E_UPSTREAM");
    assert!(!err.retryable());
}

#[tokio::test]
async fn open_sends_system_prompt_and_projected_history() {
    let llm = Arc::new(MockLlm::replying(&["ok"]));
    let state = test_app_state_with_llm(llm.clone());
    let _session = ChatSession::open(&state, &request("Hello")).await.unwrap();

    let requests = llm.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].system, "You are a helpful AI assistant.");
    assert_eq!(requests[0].messages.len(), 1);
    assert_eq!(requests[0].messages[0].role, "user");
    assert_eq!(requests[0].messages[0].content.text(), "Hello");
    assert!(requests[0].tool_names.is_empty());
}

// =============================================================================
// run: text only
// =============================================================================

#[tokio::test]
async fn run_streams_text_in_order_then_finishes() {
    let llm = Arc::new(MockLlm::replying(&["Hel", "lo", " there"]));
    let state = test_app_state_with_llm(llm);
    let (result, chunks) = run_to_end(&state, &request("hi")).await;

    assert_eq!(result.unwrap(), FinishReason::Stop);
    assert_eq!(
        types(&chunks),
        vec![
            "start",
            "start-step",
            "text-start",
            "text-delta",
            "text-delta",
            "text-delta",
            "text-end",
            "finish-step",
            "finish"
        ]
    );
    assert_eq!(streamed_text(&chunks), "Hello there");
    assert_eq!(chunks.last(), Some(&Chunk::Finish { finish_reason: Some("stop".into()) }));
}

#[tokio::test]
async fn run_text_chunks_share_one_id() {
    let llm = Arc::new(MockLlm::replying(&["a", "b"]));
    let (_, chunks) = run_to_end(&test_app_state_with_llm(llm), &request("hi")).await;
    let ids: Vec<&str> = chunks
        .iter()
        .filter_map(|c| match c {
            Chunk::TextStart { id } | Chunk::TextDelta { id, .. } | Chunk::TextEnd { id } => Some(id.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(ids.len(), 4);
    assert!(ids.iter().all(|id| *id == ids[0]));
}

#[tokio::test]
async fn run_mid_stream_failure_returns_upstream_error() {
    let llm = Arc::new(MockLlm::new(vec![MockStep::Events(vec![
        Ok(StreamEvent::TextDelta("partial".into())),
        Err(LlmError::StreamInterrupted("reset".into())),
    ])]));
    let (result, chunks) = run_to_end(&test_app_state_with_llm(llm), &request("hi")).await;

    assert!(matches!(result, Err(ChatError::Upstream(LlmError::StreamInterrupted(_)))));
    assert_eq!(streamed_text(&chunks), "partial");
    assert!(!chunks.iter().any(Chunk::is_terminal));
}

// =============================================================================
// run: tools
// =============================================================================

#[tokio::test]
async fn run_executes_tool_and_feeds_result_back() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_step("call_1", "getScheduleCsv", json!({ "location": "anything" })),
        text_step(&["Here is the schedule."]),
    ]));
    let state = state_with_tool(llm.clone(), false);
    let (result, chunks) = run_to_end(&state, &request("What's on today?")).await;

    assert_eq!(result.unwrap(), FinishReason::Stop);
    assert_eq!(
        types(&chunks),
        vec![
            "start",
            "start-step",
            "tool-input-available",
            "tool-output-available",
            "finish-step",
            "start-step",
            "text-start",
            "text-delta",
            "text-end",
            "finish-step",
            "finish"
        ]
    );
    assert!(chunks.contains(&Chunk::ToolOutputAvailable {
        tool_call_id: "call_1".into(),
        output: json!({ "location": "anything", "csvData": "a,b\n1,2\n" }),
    }));

    let requests = llm.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].tool_names, vec!["getScheduleCsv"]);
    let second = &requests[1].messages;
    assert_eq!(second.len(), 3);
    assert_eq!(second[1].role, "assistant");
    assert_eq!(second[2].role, "tool");
    assert!(matches!(
        &second[2].content,
        Content::Blocks(b) if matches!(&b[0], ContentBlock::ToolResult { is_error: None, content, .. } if content.contains("csvData"))
    ));
}

#[tokio::test]
async fn run_tool_failure_becomes_error_result_and_generation_continues() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_step("call_1", "getScheduleCsv", json!({ "location": "x" })),
        text_step(&["The schedule is unavailable."]),
    ]));
    let state = state_with_tool(llm.clone(), true);
    let (result, chunks) = run_to_end(&state, &request("schedule?")).await;

    assert!(result.is_ok());
    assert!(chunks.iter().any(|c| matches!(
        c,
        Chunk::ToolOutputError { tool_call_id, error_text } if tool_call_id == "call_1" && error_text.contains("503")
    )));
    assert_eq!(streamed_text(&chunks), "The schedule is unavailable.");

    let second = &llm.requests()[1].messages;
    assert!(matches!(
        &second[2].content,
        Content::Blocks(b) if matches!(&b[0], ContentBlock::ToolResult { is_error: Some(true), .. })
    ));
}

#[tokio::test]
async fn run_undeclared_tool_is_dynamic_with_error_result() {
    let llm = Arc::new(MockLlm::new(vec![tool_step("call_7", "launchRocket", json!({})), text_step(&["ok"])]));
    let (result, chunks) = run_to_end(&test_app_state_with_llm(llm), &request("go")).await;

    assert!(result.is_ok());
    assert!(chunks.iter().any(|c| matches!(
        c,
        Chunk::ToolInputAvailable { tool_name, dynamic: Some(true), .. } if tool_name == "launchRocket"
    )));
    assert!(chunks.iter().any(|c| matches!(c, Chunk::ToolOutputError { error_text, .. } if error_text.contains("unknown tool"))));
}

#[tokio::test]
async fn run_stops_at_step_limit() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_step("c1", "getScheduleCsv", json!({ "location": "a" })),
        tool_step("c2", "getScheduleCsv", json!({ "location": "b" })),
        tool_step("c3", "getScheduleCsv", json!({ "location": "c" })),
    ]));
    let mut tools = ToolRegistry::new();
    tools.register(Arc::new(EchoTool { fail: false }));
    let config = ChatConfig { max_steps: 2, ..ChatConfig::default() };
    let state = AppState::new(Some(llm.clone()), tools, config);

    let (result, chunks) = run_to_end(&state, &request("loop")).await;
    assert_eq!(result.unwrap(), FinishReason::ToolCalls);
    assert_eq!(llm.requests().len(), 2);
    assert_eq!(chunks.iter().filter(|c| **c == Chunk::StartStep).count(), 2);
    assert_eq!(chunks.last(), Some(&Chunk::Finish { finish_reason: Some("tool-calls".into()) }));
}

#[tokio::test]
async fn run_reports_each_step_to_observer() {
    let llm = Arc::new(MockLlm::new(vec![
        tool_step("call_1", "getScheduleCsv", json!({ "location": "HQ" })),
        text_step(&["done"]),
    ]));
    let observer = Arc::new(RecordingObserver::default());
    let state = state_with_tool(llm, false).with_observer(observer.clone());
    let _ = run_to_end(&state, &request("hi")).await;

    let steps = observer.steps.lock().unwrap();
    assert_eq!(steps.len(), 2);
    assert_eq!(steps[0].index, 0);
    assert_eq!(steps[0].finish_reason, FinishReason::ToolCalls);
    assert_eq!(steps[0].tool_calls.len(), 1);
    assert!(!steps[0].tool_calls[0].dynamic);
    assert!(steps[0].tool_calls[0].result.is_ok());
    assert_eq!(steps[1].text, "done");
}

#[tokio::test]
async fn run_dropped_receiver_is_client_gone() {
    let llm = Arc::new(MockLlm::replying(&["x"]));
    let session = ChatSession::open(&test_app_state_with_llm(llm), &request("hi")).await.unwrap();
    let (tx, rx) = mpsc::channel(1);
    drop(rx);
    assert!(matches!(session.run(&tx).await, Err(ChatError::ClientGone)));
}

// =============================================================================
// ChatError
// =============================================================================

#[test]
fn chat_error_codes() {
    assert_eq!(ChatError::Malformed(ProtocolError::EmptyConversation).error_code(), "E_MALFORMED_REQUEST");
    assert_eq!(ChatError::LlmNotConfigured.error_code(), "E_LLM_NOT_CONFIGURED");
    assert_eq!(ChatError::TimedOut.error_code(), "E_TIMED_OUT");
    assert!(ChatError::TimedOut.retryable());
    assert!(ChatError::Upstream(LlmError::ApiResponse { status: 503, body: String::new() }).retryable());
}
