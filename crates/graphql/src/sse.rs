//! Server-Sent Events framing.
//!
//! Encoding covers the one frame the relay writes itself (`error`); the
//! decoder follows the EventSource parsing rules and is used when consuming
//! a subscription stream.

use std::mem;

use serde_json::json;

pub const EVENT_STREAM: &str = "text/event-stream";

/// Event name used when a frame carries no `event:` field.
pub const DEFAULT_EVENT: &str = "message";

/// Event name of relay-generated error frames.
pub const ERROR_EVENT: &str = "error";

/// `event: error` frame carrying `{"errors":[{"message":..}]}`.
pub fn error_event(message: &str) -> String {
    let payload = json!({ "errors": [{ "message": message }] });
    format!("event: {ERROR_EVENT}\ndata: {payload}\n\n")
}

/// A dispatched SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

/// Incremental SSE parser. Feed it text in whatever pieces it arrives in;
/// complete events come out once their terminating blank line is seen.
#[derive(Debug, Default)]
pub struct SseDecoder {
    line: String,
    after_cr: bool,
    event: String,
    data: String,
    id: Option<String>,
}

impl SseDecoder {
    pub fn push(&mut self, text: &str) -> Vec<SseEvent> {
        let mut out = Vec::new();
        for ch in text.chars() {
            if mem::take(&mut self.after_cr) && ch == '\n' {
                continue;
            }
            match ch {
                '\r' => {
                    self.after_cr = true;
                    self.end_line(&mut out);
                },
                '\n' => self.end_line(&mut out),
                _ => self.line.push(ch),
            }
        }
        out
    }

    fn end_line(&mut self, out: &mut Vec<SseEvent>) {
        let line = mem::take(&mut self.line);
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_str(), ""),
        };
        match field {
            "event" => self.event = value.to_string(),
            "data" => {
                self.data.push_str(value);
                self.data.push('\n');
            },
            "id" if !value.contains('\0') => self.id = Some(value.to_string()),
            _ => {},
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        let event = mem::take(&mut self.event);
        let mut data = mem::take(&mut self.data);
        if data.is_empty() {
            return;
        }
        data.pop();
        out.push(SseEvent {
            event: if event.is_empty() {
                DEFAULT_EVENT.to_string()
            } else {
                event
            },
            data,
            id: self.id.clone(),
        });
    }
}

/// Streaming UTF-8 decoder: multi-byte sequences split across chunks are
/// held back until the rest arrives; invalid bytes become U+FFFD.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        let mut buf = mem::take(&mut self.pending);
        buf.extend_from_slice(chunk);

        let mut out = String::with_capacity(buf.len());
        let mut rest = buf.as_slice();
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                },
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        },
                        None => {
                            rest = after;
                            break;
                        },
                    }
                },
            }
        }
        self.pending = rest.to_vec();
        out
    }

    /// Flush a trailing incomplete sequence at end of stream.
    pub fn finish(&mut self) -> String {
        if mem::take(&mut self.pending).is_empty() {
            String::new()
        } else {
            char::REPLACEMENT_CHARACTER.to_string()
        }
    }
}
