//! Terminal rendering of the conversation.
//!
//! Rendering is a pure function of store state: [`render`] turns messages
//! and status into bubbles, [`format_view`] lays bubbles out as text.

use protocol::{Message, Part, Role, ToolState};

use crate::store::RequestStatus;

pub const WELCOME_TITLE: &str = "Welcome to AI Chat";
pub const WELCOME_HINT: &str = "Start a conversation by typing a message below";
pub const PLACEHOLDER: &str = "...";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Align {
    Left,
    Right,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Bubble {
    pub align: Align,
    pub label: &'static str,
    pub text: String,
    /// Stand-in shown while the reply has produced no text.
    pub placeholder: bool,
}

/// Bubbles for every message with visible content, in order.
#[must_use]
pub fn render(messages: &[Message], status: RequestStatus) -> Vec<Bubble> {
    let mut bubbles: Vec<Bubble> = messages
        .iter()
        .filter_map(|message| {
            let text = visible_text(message);
            if text.is_empty() {
                return None;
            }
            let (align, label) = match message.role {
                Role::User => (Align::Right, "You"),
                Role::Assistant => (Align::Left, "AI"),
                Role::System => (Align::Left, "System"),
            };
            Some(Bubble { align, label, text, placeholder: false })
        })
        .collect();

    let replied = messages
        .last()
        .is_some_and(|m| m.role == Role::Assistant && !m.text().is_empty());
    if status == RequestStatus::Streaming && !replied {
        bubbles.push(Bubble { align: Align::Left, label: "AI", text: PLACEHOLDER.to_owned(), placeholder: true });
    }
    bubbles
}

/// Text parts concatenated; tool activity stands in when there is no text.
fn visible_text(message: &Message) -> String {
    let text = message.text();
    if !text.is_empty() {
        return text;
    }
    message
        .parts
        .iter()
        .filter_map(Part::as_tool)
        .map(|(name, call)| {
            let state = match call.state {
                ToolState::InputStreaming | ToolState::InputAvailable => "running",
                ToolState::OutputAvailable => "done",
                ToolState::OutputError => "failed",
            };
            format!("[{name}: {state}]")
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lay out the conversation for a terminal `width` columns wide.
#[must_use]
pub fn format_view(messages: &[Message], status: RequestStatus, width: usize) -> String {
    if messages.is_empty() {
        return format!("{}\n{}\n", center(WELCOME_TITLE, width), center(WELCOME_HINT, width));
    }

    let mut out = String::new();
    for bubble in render(messages, status) {
        out.push_str(&align(bubble.label, bubble.align, width));
        out.push('\n');
        for line in bubble.text.lines() {
            out.push_str(&align(line, bubble.align, width));
            out.push('\n');
        }
        out.push('\n');
    }
    out
}

fn align(line: &str, align: Align, width: usize) -> String {
    match align {
        Align::Left => line.to_owned(),
        Align::Right => format!("{line:>width$}"),
    }
}

fn center(line: &str, width: usize) -> String {
    format!("{line:^width$}").trim_end().to_owned()
}

#[cfg(test)]
#[path = "view_test.rs"]
mod tests;
