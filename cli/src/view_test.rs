use protocol::ToolPart;
use serde_json::json;

use super::*;

fn assistant(parts: Vec<Part>) -> Message {
    Message { id: "a".into(), role: Role::Assistant, parts, metadata: None }
}

fn text(t: &str) -> Part {
    Part::Text { text: t.into(), state: None }
}

#[test]
fn user_right_assistant_left() {
    let messages = vec![Message::user_text("Hello"), assistant(vec![text("Hi!")])];
    let bubbles = render(&messages, RequestStatus::Idle);

    assert_eq!(bubbles.len(), 2);
    assert_eq!((bubbles[0].align, bubbles[0].label, bubbles[0].text.as_str()), (Align::Right, "You", "Hello"));
    assert_eq!((bubbles[1].align, bubbles[1].label, bubbles[1].text.as_str()), (Align::Left, "AI", "Hi!"));
}

#[test]
fn text_parts_are_concatenated() {
    let messages = vec![assistant(vec![text("a"), Part::StepStart, text("b")])];
    assert_eq!(render(&messages, RequestStatus::Idle)[0].text, "ab");
}

#[test]
fn placeholder_while_streaming_without_reply_text() {
    let messages = vec![Message::user_text("Hello")];
    let bubbles = render(&messages, RequestStatus::Streaming);
    assert_eq!(bubbles.len(), 2);
    assert!(bubbles[1].placeholder);
    assert_eq!(bubbles[1].align, Align::Left);
}

#[test]
fn no_placeholder_once_text_arrives() {
    let messages = vec![Message::user_text("Hello"), assistant(vec![text("Hi")])];
    let bubbles = render(&messages, RequestStatus::Streaming);
    assert!(bubbles.iter().all(|b| !b.placeholder));
}

#[test]
fn no_placeholder_when_idle_or_error() {
    let messages = vec![Message::user_text("Hello")];
    assert_eq!(render(&messages, RequestStatus::Idle).len(), 1);
    assert_eq!(render(&messages, RequestStatus::Error).len(), 1);
}

#[test]
fn empty_reply_is_not_rendered() {
    let messages = vec![Message::user_text("Hello"), assistant(vec![Part::StepStart])];
    assert_eq!(render(&messages, RequestStatus::Idle).len(), 1);
}

#[test]
fn tool_activity_shown_when_reply_has_no_text() {
    let call = ToolPart::input_available("c1", json!({ "location": "HQ" }));
    let messages = vec![assistant(vec![Part::Tool { tool_name: "getScheduleCsv".into(), call }])];
    let bubbles = render(&messages, RequestStatus::Idle);
    assert_eq!(bubbles[0].text, "[getScheduleCsv: running]");
}

#[test]
fn format_view_welcome_when_empty() {
    let view = format_view(&[], RequestStatus::Idle, 60);
    assert!(view.contains(WELCOME_TITLE));
    assert!(view.contains(WELCOME_HINT));
}

#[test]
fn format_view_right_aligns_user_lines() {
    let view = format_view(&[Message::user_text("Hello")], RequestStatus::Idle, 20);
    let lines: Vec<&str> = view.lines().collect();
    assert_eq!(lines[0], format!("{:>20}", "You"));
    assert_eq!(lines[1], format!("{:>20}", "Hello"));
}

#[test]
fn format_view_is_deterministic() {
    let messages = vec![Message::user_text("Hello"), assistant(vec![text("line 1\nline 2")])];
    assert_eq!(
        format_view(&messages, RequestStatus::Idle, 40),
        format_view(&messages, RequestStatus::Idle, 40)
    );
}
