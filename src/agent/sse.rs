//! Incremental parser for the agent's server-sent event stream.
//!
//! Converts raw byte fragments into decoded [`AgentEvent`]s, independent of
//! how the transport happens to split the stream. The protocol is
//! line-oriented: `event:` names the event kind, `data:` carries a single
//! JSON payload line (last write wins within one event), and an empty line
//! terminates the event. Kinds may also arrive as a `type` field inside the
//! payload when the `event:` field is absent.
//!
//! Malformed payloads drop that one event and nothing else: a corrupt event
//! in the middle of a run must not abort the session.

use crate::agent::events::{self, AgentEvent};
use tracing::debug;

/// Incrementally parse stream bytes, yielding events as they complete.
///
/// Feed fragments via [`EventStreamParser::push`] in arrival order; call
/// [`EventStreamParser::flush`] when the stream closes to emit a trailing
/// unterminated event. Splitting the same stream at any byte offsets yields
/// the same event sequence.
#[derive(Debug, Default)]
pub struct EventStreamParser {
    buffer: Vec<u8>,
    pending: FrameBuilder,
}

impl EventStreamParser {
    /// Create a new incremental parser.
    pub fn new() -> Self {
        Self::default()
    }

    /// Push a fragment of stream bytes into the parser.
    ///
    /// Returns the events completed by this fragment, in stream order.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<AgentEvent> {
        self.buffer.extend_from_slice(chunk);

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buffer.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line);
            if let Some(event) = self.pending.line(&line) {
                out.push(event);
            }
        }
        out
    }

    /// Flush a trailing event left unterminated when the stream closed.
    pub fn flush(&mut self) -> Option<AgentEvent> {
        if !self.buffer.is_empty() {
            let mut line = std::mem::take(&mut self.buffer);
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8_lossy(&line).into_owned();
            if let Some(event) = self.pending.line(&line) {
                return Some(event);
            }
        }
        self.pending.terminate()
    }
}

/// Accumulates the `event:` / `data:` fields of the event being built.
///
/// Field accumulation does not depend on the caller's fragmentation
/// boundaries; only complete lines reach this type.
#[derive(Debug, Default)]
struct FrameBuilder {
    event_type: Option<String>,
    data: Option<String>,
}

impl FrameBuilder {
    /// Process one complete line. Returns an event when the line terminates
    /// a frame that decodes successfully.
    fn line(&mut self, line: &str) -> Option<AgentEvent> {
        if line.is_empty() {
            return self.terminate();
        }

        // Comment line per the SSE wire format.
        if line.starts_with(':') {
            return None;
        }

        if let Some(value) = line.strip_prefix("event:") {
            self.event_type = Some(value.trim().to_owned());
        } else if let Some(value) = line.strip_prefix("data:") {
            // Last write wins: this protocol carries one data line per event.
            self.data = Some(strip_leading_space(value).to_owned());
        }
        // Unknown fields (id:, retry:, ...) are ignored.

        None
    }

    /// End of the current frame: decode if data is present, then reset the
    /// accumulators regardless of whether decoding succeeded. A blank line
    /// with no pending data terminates nothing and leaves a pending type
    /// in place.
    fn terminate(&mut self) -> Option<AgentEvent> {
        let data = self.data.take()?;
        let event_type = self.event_type.take();

        match events::decode_frame(event_type.as_deref(), &data) {
            Some(event) => Some(event),
            None => {
                debug!("dropping undecodable stream event");
                None
            }
        }
    }
}

/// Strip the single optional space after the field colon.
fn strip_leading_space(value: &str) -> &str {
    value.strip_prefix(' ').unwrap_or(value)
}
