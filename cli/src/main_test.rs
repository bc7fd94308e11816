use protocol::{DONE_EVENT, encode_chunk};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::*;

async fn serve_sse(chunks: &[Chunk], done: bool) -> MockServer {
    let mut body: String = chunks.iter().map(encode_chunk).collect();
    if done {
        body.push_str(DONE_EVENT);
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

#[tokio::test]
async fn exchange_done_without_finish_returns_to_idle() {
    let server = serve_sse(
        &[Chunk::Start { message_id: None }, Chunk::TextDelta { id: "t".into(), delta: "hi".into() }],
        true,
    )
    .await;
    let client = reqwest::Client::new();
    let mut store = ConversationStore::new();
    store.set_input("hello");

    exchange(&client, &server.uri(), &mut store).await.unwrap();

    assert_eq!(store.status(), RequestStatus::Idle);
    assert!(store.error().is_none());
    assert_eq!(store.messages()[1].text(), "hi");
    assert!(store.submit("again").is_some());
}

#[tokio::test]
async fn exchange_finish_chunk_returns_to_idle() {
    let server = serve_sse(
        &[
            Chunk::TextDelta { id: "t".into(), delta: "ok".into() },
            Chunk::Finish { finish_reason: Some("stop".into()) },
        ],
        true,
    )
    .await;
    let mut store = ConversationStore::new();
    store.set_input("hello");

    exchange(&reqwest::Client::new(), &server.uri(), &mut store).await.unwrap();

    assert_eq!(store.status(), RequestStatus::Idle);
    assert_eq!(store.messages().len(), 2);
}

#[tokio::test]
async fn exchange_truncated_stream_is_an_error() {
    let server = serve_sse(&[Chunk::TextDelta { id: "t".into(), delta: "par".into() }], false).await;
    let mut store = ConversationStore::new();
    store.set_input("hello");

    exchange(&reqwest::Client::new(), &server.uri(), &mut store).await.unwrap();

    assert_eq!(store.status(), RequestStatus::Error);
    assert_eq!(store.error(), Some("stream ended before [DONE]"));
    assert!(store.submit("retry").is_some());
}
