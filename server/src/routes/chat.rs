//! `POST /api/chat`: UI message stream endpoint.
//!
//! DESIGN
//! ======
//! Validation and the first provider call happen before any bytes are
//! written, so those failures get a JSON error with a real status code.
//! After that the session runs in a spawned task feeding a bounded channel;
//! the response body drains the channel and aborts the task when dropped,
//! which is how client disconnects cancel generation.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, HeaderName};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use futures::{Stream, StreamExt};
use protocol::{Chunk, DONE_EVENT, encode_chunk};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, timeout_at};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};

use crate::error::{ApiError, error_chunk};
use crate::services::chat::{ChatError, ChatSession};
use crate::state::AppState;

const CHUNK_BUFFER: usize = 64;

static X_ACCEL_BUFFERING: HeaderName = HeaderName::from_static("x-accel-buffering");
static X_UI_MESSAGE_STREAM: HeaderName = HeaderName::from_static("x-vercel-ai-ui-message-stream");

pub async fn chat(State(state): State<AppState>, body: Bytes) -> Response {
    let deadline = Instant::now() + state.config.max_duration;

    let request = match protocol::parse_chat_request(&body) {
        Ok(request) => request,
        Err(e) => {
            let err = ChatError::from(e);
            warn!(error = %err, "chat: rejected request");
            return ApiError::new(status_for(&err), &err).into_response();
        }
    };
    info!(chat_id = request.id.as_deref().unwrap_or("-"), messages = request.messages.len(), "chat: request");

    let session = match timeout_at(deadline, ChatSession::open(&state, &request)).await {
        Ok(Ok(session)) => session,
        Ok(Err(err)) => {
            warn!(error = %err, "chat: could not open session");
            return ApiError::new(status_for(&err), &err).into_response();
        }
        Err(_) => {
            let err = ChatError::TimedOut;
            warn!(error = %err, "chat: could not open session");
            return ApiError::new(status_for(&err), &err).into_response();
        }
    };

    let (tx, rx) = mpsc::channel(CHUNK_BUFFER);
    let task = tokio::spawn(async move {
        let err = match timeout_at(deadline, session.run(&tx)).await {
            Ok(Ok(reason)) => {
                info!(finish_reason = reason.as_str(), "chat: stream complete");
                return;
            }
            Ok(Err(ChatError::ClientGone)) => {
                debug!("chat: client went away");
                return;
            }
            Ok(Err(err)) => err,
            Err(_) => ChatError::TimedOut,
        };
        warn!(error = %err, "chat: generation failed");
        let _ = tx.send(error_chunk(&err)).await;
    });

    stream_response(ChunkStream { rx: ReceiverStream::new(rx), task })
}

pub(crate) fn status_for(err: &ChatError) -> StatusCode {
    match err {
        ChatError::Malformed(_) => StatusCode::BAD_REQUEST,
        ChatError::LlmNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
        ChatError::Upstream(_) => StatusCode::BAD_GATEWAY,
        ChatError::TimedOut => StatusCode::GATEWAY_TIMEOUT,
        ChatError::ClientGone => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn stream_response(chunks: ChunkStream) -> Response {
    let body = chunks
        .map(|chunk| Ok::<_, Infallible>(Bytes::from(encode_chunk(&chunk))))
        .chain(futures::stream::once(async { Ok(Bytes::from_static(DONE_EVENT.as_bytes())) }));

    (
        [
            (CONTENT_TYPE, "text/event-stream"),
            (CACHE_CONTROL, "no-cache, no-transform"),
            (X_ACCEL_BUFFERING.clone(), "no"),
            (X_UI_MESSAGE_STREAM.clone(), "v1"),
        ],
        Body::from_stream(body),
    )
        .into_response()
}

/// Chunks produced by a generation task. Dropping it cancels the task.
struct ChunkStream {
    rx: ReceiverStream<Chunk>,
    task: JoinHandle<()>,
}

impl Stream for ChunkStream {
    type Item = Chunk;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Chunk>> {
        Pin::new(&mut self.rx).poll_next(cx)
    }
}

impl Drop for ChunkStream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
#[path = "chat_test.rs"]
mod tests;
