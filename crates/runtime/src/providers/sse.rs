//! Minimal server-sent-events decoder shared by the provider backends.
//!
//! Byte chunks from `bytes_stream` do not align with event boundaries, so
//! the decoder buffers until a blank line completes an event.

/// One decoded SSE event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct SseEvent {
    /// The `event:` field, if the server sent one.
    pub event: Option<String>,
    /// All `data:` lines joined with newlines.
    pub data: String,
}

#[derive(Debug, Default)]
pub(crate) struct SseDecoder {
    buffer: String,
}

impl SseDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk of bytes; returns every event completed by it.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<SseEvent> {
        self.buffer.push_str(&String::from_utf8_lossy(chunk));

        let mut events = Vec::new();
        while let Some(boundary) = find_boundary(&self.buffer) {
            let raw: String = self.buffer.drain(..boundary.end).collect();
            if let Some(event) = parse_event(&raw[..boundary.start]) {
                events.push(event);
            }
        }
        events
    }
}

struct Boundary {
    start: usize,
    end: usize,
}

fn find_boundary(buffer: &str) -> Option<Boundary> {
    // Events end at a blank line; servers may use \n\n or \r\n\r\n.
    let lf = buffer.find("\n\n").map(|i| Boundary { start: i, end: i + 2 });
    let crlf = buffer
        .find("\r\n\r\n")
        .map(|i| Boundary { start: i, end: i + 4 });
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a.start < b.start { a } else { b }),
        (a, b) => a.or(b),
    }
}

fn parse_event(raw: &str) -> Option<SseEvent> {
    let mut event = None;
    let mut data_lines = Vec::new();

    for line in raw.lines() {
        let line = line.trim_end_matches('\r');
        if let Some(rest) = line.strip_prefix("event:") {
            event = Some(rest.trim_start().to_string());
        } else if let Some(rest) = line.strip_prefix("data:") {
            data_lines.push(rest.strip_prefix(' ').unwrap_or(rest));
        }
        // Comments (":") and other fields are ignored.
    }

    if event.is_none() && data_lines.is_empty() {
        return None;
    }
    Some(SseEvent {
        event,
        data: data_lines.join("\n"),
    })
}
