use serde::Deserialize;
use tracing::{debug, warn};

use crate::stream::ChatEvent;

/// Literal prefix in front of every event payload.
pub const RECORD_PREFIX: &str = "data: ";

/// Message used when an `error` record carries no usable `error` string.
pub const SERVER_ERROR_FALLBACK: &str = "the chat service reported an error";

/// Re-frames an arbitrarily fragmented byte stream into `\n`-terminated lines.
///
/// Framing runs on raw bytes and text is decoded per complete line. A newline
/// byte never occurs inside a multi-byte UTF-8 sequence, so a character split
/// across two fragments is always decoded whole.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
    // Bytes of `buf` already known to hold no terminator.
    scanned: usize,
}

impl LineDecoder {
    /// Appends a fragment and returns every line it completed, in order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.extend(chunk);
        self.drain()
    }

    /// Appends a fragment without scanning.
    pub fn extend(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Returns all complete lines currently buffered.
    ///
    /// Calling this again without new bytes yields nothing.
    pub fn drain(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        while let Some(line) = self.next_line() {
            lines.push(line);
        }
        lines
    }

    /// Removes and returns the next complete line, without its terminator.
    pub fn next_line(&mut self) -> Option<String> {
        let Some(offset) = self.buf[self.scanned..].iter().position(|b| *b == b'\n') else {
            self.scanned = self.buf.len();
            return None;
        };
        let idx = self.scanned + offset;
        let line = String::from_utf8_lossy(&self.buf[..idx]).into_owned();
        self.buf.drain(..=idx);
        self.scanned = 0;
        Some(line)
    }

    /// Size in bytes of the unterminated tail.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Takes the unterminated tail, leaving the decoder empty.
    pub fn take_remainder(&mut self) -> Vec<u8> {
        self.scanned = 0;
        std::mem::take(&mut self.buf)
    }

    /// Discards the unterminated tail.
    pub fn clear(&mut self) {
        self.buf.clear();
        self.scanned = 0;
    }
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TypedPayload {
    Start {
        #[serde(default)]
        sources_used: Option<Vec<String>>,
        #[serde(default)]
        context_found: Option<bool>,
    },
    Chunk {
        #[serde(default)]
        content: Option<String>,
    },
    Done,
    Error {
        #[serde(default)]
        error: Option<serde_json::Value>,
    },
}

const KNOWN_TYPES: [&str; 4] = ["start", "chunk", "done", "error"];

/// Decodes one line into an event.
///
/// Lines without the `data: ` prefix are ignored silently. Payloads that are
/// not JSON, carry an unknown `type`, or lack the fields an event needs are
/// logged and skipped.
pub fn parse_record(line: &str) -> Option<ChatEvent> {
    let payload = line.strip_prefix(RECORD_PREFIX)?;
    let value: serde_json::Value = match serde_json::from_str(payload) {
        Ok(value) => value,
        Err(e) => {
            warn!(error = %e, "skipping malformed stream record");
            return None;
        }
    };
    decode_payload(value)
}

fn decode_payload(value: serde_json::Value) -> Option<ChatEvent> {
    let known = match value.get("type") {
        None => return decode_untyped(&value),
        Some(kind) => kind.as_str().is_some_and(|k| KNOWN_TYPES.contains(&k)),
    };
    if !known {
        debug!(kind = %value["type"], "skipping stream record with unknown type");
        return None;
    }
    decode_typed(value)
}

fn decode_typed(value: serde_json::Value) -> Option<ChatEvent> {
    let payload = match serde_json::from_value::<TypedPayload>(value) {
        Ok(payload) => payload,
        Err(e) => {
            warn!(error = %e, "skipping stream record with invalid fields");
            return None;
        }
    };
    match payload {
        TypedPayload::Start {
            sources_used,
            context_found,
        } => Some(ChatEvent::Start {
            sources: sources_used.unwrap_or_default(),
            context_found: context_found.unwrap_or(false),
        }),
        TypedPayload::Chunk { content } => content
            .filter(|text| !text.is_empty())
            .map(|text| ChatEvent::Token { text }),
        TypedPayload::Done => Some(ChatEvent::Done),
        TypedPayload::Error { error } => Some(ChatEvent::Error {
            message: server_error_message(error.as_ref()),
        }),
    }
}

// Untyped records: `{"token"}` or `{"response"}` carry answer text,
// `{"done": true}` ends the answer and `{"error"}` fails it.
fn decode_untyped(value: &serde_json::Value) -> Option<ChatEvent> {
    if let Some(error) = value.get("error") {
        return Some(ChatEvent::Error {
            message: server_error_message(Some(error)),
        });
    }
    let text = ["token", "response"]
        .iter()
        .find_map(|key| value.get(*key).and_then(|v| v.as_str()));
    match text {
        Some("") => None,
        Some(text) => Some(ChatEvent::Token {
            text: text.to_string(),
        }),
        None if value.get("done").and_then(|v| v.as_bool()) == Some(true) => {
            Some(ChatEvent::Done)
        }
        None => {
            debug!("skipping untyped stream record without answer text");
            None
        }
    }
}

fn server_error_message(error: Option<&serde_json::Value>) -> String {
    error
        .and_then(|v| v.as_str())
        .filter(|s| !s.trim().is_empty())
        .unwrap_or(SERVER_ERROR_FALLBACK)
        .to_string()
}
