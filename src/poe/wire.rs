//! Wire types and server-sent-event parsing for the Poe bot protocol.
//!
//! A bot query is a single POST whose reply is an SSE stream of `meta`,
//! `text`, `replace_response`, `error`, and `done` events. The parser
//! here is incremental so events split across network chunks reassemble
//! correctly.

use serde::{Deserialize, Serialize};

use crate::session::{Role, Turn};

pub const PROTOCOL_STANDARD: &str = "1.1";
pub const PROTOCOL_COMPAT: &str = "1.0";

#[derive(Debug, Serialize)]
pub struct QueryPayload {
    pub version: &'static str,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub query: Vec<WireMessage>,
    pub user_id: String,
    pub conversation_id: String,
    pub message_id: String,
}

#[derive(Debug, Serialize)]
pub struct WireMessage {
    pub role: &'static str,
    pub content: String,
    pub content_type: &'static str,
}

impl WireMessage {
    /// Poe addresses the assistant side as "bot", not "assistant".
    pub fn from_turn(turn: &Turn) -> Self {
        WireMessage {
            role: match turn.role {
                Role::User => "user",
                Role::Assistant => "bot",
            },
            content: turn.text.clone(),
            content_type: "text/markdown",
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        WireMessage {
            role: "user",
            content: content.into(),
            content_type: "text/markdown",
        }
    }
}

impl QueryPayload {
    pub fn new(version: &'static str, history: &[Turn], prompt: &str) -> Self {
        let mut query: Vec<WireMessage> = history.iter().map(WireMessage::from_turn).collect();
        query.push(WireMessage::user(prompt));
        QueryPayload {
            version,
            kind: "query",
            query,
            user_id: String::new(),
            conversation_id: String::new(),
            message_id: String::new(),
        }
    }
}

/// Payload of `text` and `replace_response` events.
#[derive(Debug, Deserialize)]
pub struct TextEventData {
    #[serde(default)]
    pub text: String,
}

/// Payload of `error` events.
#[derive(Debug, Deserialize)]
pub struct ErrorEventData {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub allow_retry: bool,
}

/// One complete server-sent event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub name: String,
    pub data: String,
}

/// Incremental SSE parser. Feed it raw chunks; take complete events out.
/// Events are separated by a blank line; `event:` names the event and one
/// or more `data:` lines carry the payload.
///
/// The buffer holds bytes, not text: a multi-byte character may arrive
/// split across chunks, but it can never straddle the blank-line event
/// boundary, so decoding whole blocks is always safe.
#[derive(Default)]
pub struct EventParser {
    buffer: Vec<u8>,
}

impl EventParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a chunk and returns every event completed by it.
    /// CR is only ever a line terminator in SSE, so CRLF input is
    /// normalized up front.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend(chunk.iter().filter(|b| **b != b'\r'));

        let mut events = Vec::new();
        while let Some(end) = find_blank_line(&self.buffer) {
            let block: Vec<u8> = self.buffer.drain(..end + 2).collect();
            let block = String::from_utf8_lossy(&block);
            if let Some(event) = parse_block(block.trim_end()) {
                events.push(event);
            }
        }
        events
    }
}

fn find_blank_line(buffer: &[u8]) -> Option<usize> {
    buffer.windows(2).position(|pair| pair == b"\n\n")
}

fn parse_block(block: &str) -> Option<SseEvent> {
    let mut name = String::from("message");
    let mut data_lines: Vec<&str> = Vec::new();

    for line in block.lines() {
        if let Some(value) = line.strip_prefix("event:") {
            name = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("data:") {
            data_lines.push(value.strip_prefix(' ').unwrap_or(value));
        }
        // Comment lines (":") and unknown fields are ignored.
    }

    if data_lines.is_empty() && name == "message" {
        return None;
    }

    Some(SseEvent {
        name,
        data: data_lines.join("\n"),
    })
}
