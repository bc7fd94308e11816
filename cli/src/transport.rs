//! HTTP transport for `/api/chat`.

use std::pin::Pin;

use eventsource_stream::Eventsource;
use futures_util::{Stream, StreamExt};
use protocol::{ChatRequest, Chunk, ProtocolError, decode_data};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server returned HTTP {status}: {message}")]
    Status { status: u16, message: String },
    #[error("stream interrupted: {0}")]
    Transport(String),
    #[error("invalid stream chunk: {0}")]
    Decode(#[from] ProtocolError),
    #[error("stream ended before [DONE]")]
    Truncated,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk, CliError>> + Send>>;

/// POST the conversation and return the decoded chunk stream.
///
/// # Errors
///
/// Returns [`CliError::Http`] if the request cannot be sent and
/// [`CliError::Status`] for a non-success response, using the server's
/// JSON `message` when present.
pub async fn stream_chat(client: &reqwest::Client, base_url: &str, request: &ChatRequest) -> Result<ChunkStream, CliError> {
    let url = format!("{}/api/chat", base_url.trim_end_matches('/'));
    let response = client.post(url).json(request).send().await?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<serde_json::Value>(&body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_owned))
            .unwrap_or(body);
        return Err(CliError::Status { status: status.as_u16(), message });
    }

    Ok(decode_body(response.bytes_stream()))
}

/// Decode an SSE body into chunks, ending at `[DONE]`.
///
/// A body that closes without `[DONE]` yields a final [`CliError::Truncated`].
pub fn decode_body<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    let events = Box::pin(bytes.eventsource());
    Box::pin(futures_util::stream::unfold(Some(events), |state| async move {
        let mut events = state?;
        loop {
            return match events.next().await {
                Some(Ok(event)) if event.data.trim().is_empty() => continue,
                Some(Ok(event)) => match decode_data(&event.data) {
                    Ok(Some(chunk)) => Some((Ok(chunk), Some(events))),
                    Ok(None) => None,
                    Err(e) => Some((Err(CliError::Decode(e)), None)),
                },
                Some(Err(e)) => Some((Err(CliError::Transport(e.to_string())), None)),
                None => Some((Err(CliError::Truncated), None)),
            };
        }
    }))
}

#[cfg(test)]
#[path = "transport_test.rs"]
mod tests;
