//! Incremental reconstruction of a streamed reply.
//!
//! The backend streams newline-delimited event lines. Each event line is
//! the literal prefix `data:` followed by either the terminal token
//! `[DONE]` or a JSON object carrying the next text fragment at
//! `{"delta": "..."}`. Chunk boundaries are arbitrary: a chunk may hold
//! several lines or cut a line in half, so input is buffered until a full
//! line is available. A malformed line is logged and skipped; it never
//! aborts the stream. The final accumulated text is yielded exactly once,
//! on the terminal token or on connection close.

/// Event-line prefix on the wire.
const EVENT_PREFIX: &str = "data:";

/// Payload marking end-of-stream.
const TERMINAL_TOKEN: &str = "[DONE]";

/// Updates produced while a reply streams in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyEvent {
    /// A new fragment arrived. `accumulated` is the full text so far and
    /// feeds the advisory partial-state callback.
    Delta { text: String, accumulated: String },
    /// The reply is complete. Emitted at most once per stream.
    Complete { full_text: String },
}

/// Line-buffering parser that turns raw chunks into [`ReplyEvent`]s.
#[derive(Debug, Default)]
pub struct StreamReconstructor {
    /// Unconsumed input, at most one partial line.
    buffer: String,
    /// Accumulated reply text.
    text: String,
    finished: bool,
}

impl StreamReconstructor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consume one raw chunk, returning the events it completes.
    /// Chunks arriving after completion are ignored.
    pub fn feed(&mut self, chunk: &str) -> Vec<ReplyEvent> {
        let mut events = Vec::new();
        if self.finished {
            return events;
        }

        self.buffer.push_str(chunk);
        while let Some(newline) = self.buffer.find('\n') {
            let line: String = self.buffer.drain(..=newline).collect();
            self.handle_line(line.trim_end_matches(['\n', '\r']), &mut events);
            if self.finished {
                break;
            }
        }
        events
    }

    /// Close the stream. When no terminal token was seen, the connection
    /// close itself completes the reply: any trailing partial line is
    /// parsed, then the accumulated text is yielded. Returns `None` when
    /// the stream already completed.
    pub fn close(mut self) -> Option<ReplyEvent> {
        if self.finished {
            return None;
        }

        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            let mut trailing = Vec::new();
            self.handle_line(line.trim_end_matches('\r'), &mut trailing);
        }

        Some(ReplyEvent::Complete {
            full_text: self.text,
        })
    }

    fn handle_line(&mut self, line: &str, events: &mut Vec<ReplyEvent>) {
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        let Some(payload) = line.strip_prefix(EVENT_PREFIX) else {
            tracing::warn!(line, "discarding stream line without event prefix");
            return;
        };
        let payload = payload.trim();

        if payload == TERMINAL_TOKEN {
            self.finished = true;
            events.push(ReplyEvent::Complete {
                full_text: self.text.clone(),
            });
            return;
        }

        match serde_json::from_str::<serde_json::Value>(payload) {
            Ok(value) => match value.get("delta").and_then(|d| d.as_str()) {
                Some(delta) => {
                    self.text.push_str(delta);
                    events.push(ReplyEvent::Delta {
                        text: delta.to_string(),
                        accumulated: self.text.clone(),
                    });
                }
                None => {
                    tracing::warn!(payload, "stream event without delta field, skipping");
                }
            },
            Err(err) => {
                tracing::warn!(error = %err, "malformed stream event line, skipping");
            }
        }
    }
}
