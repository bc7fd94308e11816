use futures_util::StreamExt;
use protocol::{DONE_EVENT, Message, encode_chunk};
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

fn body_of(chunks: &[Chunk], done: bool) -> String {
    let mut body: String = chunks.iter().map(encode_chunk).collect();
    if done {
        body.push_str(DONE_EVENT);
    }
    body
}

async fn decode(body: String) -> Vec<Result<Chunk, CliError>> {
    let bytes: Vec<Result<Vec<u8>, std::io::Error>> = vec![Ok(body.into_bytes())];
    decode_body(futures_util::stream::iter(bytes)).collect().await
}

#[tokio::test]
async fn decode_body_stops_at_done() {
    let chunks = vec![
        Chunk::Start { message_id: None },
        Chunk::TextDelta { id: "t".into(), delta: "hi".into() },
        Chunk::Finish { finish_reason: None },
    ];
    let decoded = decode(body_of(&chunks, true)).await;
    let decoded: Vec<Chunk> = decoded.into_iter().map(Result::unwrap).collect();
    assert_eq!(decoded, chunks);
}

#[tokio::test]
async fn decode_body_without_done_is_truncated() {
    let decoded = decode(body_of(&[Chunk::StartStep], false)).await;
    assert_eq!(decoded.len(), 2);
    assert!(matches!(decoded[1], Err(CliError::Truncated)));
}

#[tokio::test]
async fn decode_body_bad_payload_is_decode_error() {
    let decoded = decode("data: {not json}\n\n".to_owned()).await;
    assert_eq!(decoded.len(), 1);
    assert!(matches!(decoded[0], Err(CliError::Decode(_))));
}

#[tokio::test]
async fn decode_body_transport_error_ends_stream() {
    let bytes: Vec<Result<Vec<u8>, std::io::Error>> = vec![
        Ok(encode_chunk(&Chunk::StartStep).into_bytes()),
        Err(std::io::Error::other("reset")),
    ];
    let decoded: Vec<_> = decode_body(futures_util::stream::iter(bytes)).collect().await;
    assert_eq!(decoded.len(), 2);
    assert!(matches!(decoded[1], Err(CliError::Transport(_))));
}

#[tokio::test]
async fn stream_chat_posts_messages_and_decodes() {
    let server = MockServer::start().await;
    let sse = body_of(&[Chunk::TextDelta { id: "t".into(), delta: "ok".into() }], true);
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .and(header("content-type", "application/json"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let request = ChatRequest { id: None, messages: vec![Message::user_text("hi")] };
    let stream = stream_chat(&reqwest::Client::new(), &format!("{}/", server.uri()), &request)
        .await
        .unwrap();
    let chunks: Vec<_> = stream.collect().await;
    assert_eq!(chunks.len(), 1);
    assert!(matches!(&chunks[0], Ok(Chunk::TextDelta { delta, .. }) if delta == "ok"));
}

#[tokio::test]
async fn stream_chat_surfaces_server_error_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(400).set_body_json(serde_json::json!({
            "code": "E_MALFORMED_REQUEST",
            "message": "malformed request: conversation is empty",
            "retryable": false
        })))
        .mount(&server)
        .await;

    let request = ChatRequest { id: None, messages: vec![] };
    let result = stream_chat(&reqwest::Client::new(), &server.uri(), &request).await;
    match result {
        Err(CliError::Status { status, message }) => {
            assert_eq!(status, 400);
            assert!(message.contains("conversation is empty"));
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("expected error"),
    }
}
