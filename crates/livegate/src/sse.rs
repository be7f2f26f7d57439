//! Server-sent-events framing.
//!
//! Minimal incremental parser for the `text/event-stream` format used by the
//! notification push endpoint: `data:`/`event:`/`id:` fields, comment
//! keep-alives, multi-line data, and frames split across arbitrary chunk
//! boundaries.

use bytes::{Bytes, BytesMut};

/// One decoded server-sent event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    /// Value of the `event:` field; empty means the default event type.
    pub event: String,
    /// Concatenated `data:` lines, newline-joined.
    pub data: String,
    /// Value of the last `id:` field, when present.
    pub id: Option<String>,
}

/// Incremental SSE frame parser.
///
/// Feed raw body chunks in; complete events come out as each one is
/// terminated by a blank line. Partial lines are buffered between chunks, so
/// chunk boundaries can fall anywhere.
#[derive(Debug, Default)]
pub struct SseParser {
    buffer: BytesMut,
    current: SseEvent,
}

impl SseParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one body chunk and return the events it completed.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.extend_from_slice(chunk);
        let mut events = Vec::new();
        while let Some(line) = self.next_line() {
            if let Some(event) = self.handle_line(&line) {
                events.push(event);
            }
        }
        events
    }

    /// Take the next complete line out of the buffer, stripping `\n` or `\r\n`.
    fn next_line(&mut self) -> Option<Bytes> {
        let pos = self.buffer.iter().position(|&b| b == b'\n')?;
        let mut line = self.buffer.split_to(pos + 1);
        line.truncate(pos);
        if line.last() == Some(&b'\r') {
            line.truncate(line.len() - 1);
        }
        Some(line.freeze())
    }

    fn handle_line(&mut self, line: &[u8]) -> Option<SseEvent> {
        if line.is_empty() {
            // Blank line dispatches the accumulated event. Frames without any
            // data (comment-only keep-alives) dispatch nothing.
            let event = std::mem::take(&mut self.current);
            return (!event.data.is_empty()).then_some(event);
        }

        let line = String::from_utf8_lossy(line);
        if line.starts_with(':') {
            // Comment; servers use these as keep-alives.
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line.as_ref(), ""),
        };
        match field {
            "data" => {
                if !self.current.data.is_empty() {
                    self.current.data.push('\n');
                }
                self.current.data.push_str(value);
            }
            "event" => self.current.event = value.to_string(),
            "id" => self.current.id = Some(value.to_string()),
            // `retry` is ignored: the reconnect schedule is the client's call.
            _ => {}
        }
        None
    }
}
