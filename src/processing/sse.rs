//! Incremental Server-Sent-Events frame decoder
//!
//! Bytes arrive in arbitrary chunks from the HTTP body; the decoder keeps the
//! partial line and the event being assembled across calls to [`SseDecoder::feed`].
//! A line longer than the configured limit is dropped and counted in
//! [`SseDecoder::dropped_lines`].

use crate::core::MAX_SSE_LINE_BYTES;

/// One dispatched server-sent event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// `event:` field, `None` for the default "message" type
    pub event: Option<String>,
    /// `data:` lines joined with `\n`
    pub data: String,
    /// Last `id:` seen on the stream
    pub id: Option<String>,
}

impl SseEvent {
    pub fn is_message(&self) -> bool {
        matches!(self.event.as_deref(), None | Some("message"))
    }
}

/// Stateful line decoder for `text/event-stream` bodies
#[derive(Debug)]
pub struct SseDecoder {
    line: Vec<u8>,
    max_line: usize,
    /// Current line overflowed; skip bytes until its terminator
    discarding: bool,
    dropped_lines: u64,
    data: Vec<String>,
    event: Option<String>,
    last_id: Option<String>,
    /// Previous chunk ended on `\r`; swallow a leading `\n`
    pending_cr: bool,
}

impl Default for SseDecoder {
    fn default() -> Self {
        Self {
            line: Vec::new(),
            max_line: MAX_SSE_LINE_BYTES,
            discarding: false,
            dropped_lines: 0,
            data: Vec::new(),
            event: None,
            last_id: None,
            pending_cr: false,
        }
    }
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line_length(mut self, max_line: usize) -> Self {
        self.max_line = max_line.max(1);
        self
    }

    /// Lines dropped for exceeding the length limit since creation
    pub fn dropped_lines(&self) -> u64 {
        self.dropped_lines
    }

    /// Feed a chunk of body bytes and return every event it completes
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        let mut events = Vec::new();

        for &byte in chunk {
            if self.pending_cr {
                self.pending_cr = false;
                if byte == b'\n' {
                    continue;
                }
            }
            match byte {
                b'\n' => self.end_line(&mut events),
                b'\r' => {
                    self.pending_cr = true;
                    self.end_line(&mut events);
                }
                _ if self.discarding => {}
                _ if self.line.len() >= self.max_line => {
                    tracing::warn!(limit = self.max_line, "dropping oversized event-stream line");
                    self.line.clear();
                    self.discarding = true;
                    self.dropped_lines += 1;
                }
                other => self.line.push(other),
            }
        }

        events
    }

    /// Drop any partially assembled event, e.g. after the stream broke
    pub fn reset(&mut self) {
        self.line.clear();
        self.discarding = false;
        self.data.clear();
        self.event = None;
        self.pending_cr = false;
    }

    fn end_line(&mut self, events: &mut Vec<SseEvent>) {
        if self.discarding {
            // The oversized line is gone; its terminator must not dispatch.
            self.discarding = false;
            return;
        }
        let line = String::from_utf8_lossy(&self.line).into_owned();
        self.line.clear();

        if line.is_empty() {
            if let Some(event) = self.dispatch() {
                events.push(event);
            }
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
            "data" => self.data.push(value.to_string()),
            "event" => self.event = Some(value.to_string()),
            "id" => {
                if !value.contains('\0') {
                    self.last_id = Some(value.to_string());
                }
            }
            _ => {}
        }
    }

    fn dispatch(&mut self) -> Option<SseEvent> {
        let event = self.event.take();
        if self.data.is_empty() {
            return None;
        }
        let data = self.data.join("\n");
        self.data.clear();
        Some(SseEvent {
            event,
            data,
            id: self.last_id.clone(),
        })
    }
}
