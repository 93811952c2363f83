//! Server-sent-events decoding for the provider stream.
//!
//! [`lines`] splits the response body with tokio-util's [`LinesCodec`] under
//! a line-length cap; [`SseEvents`] assembles those lines into events.

use bytes::Buf;
use futures::{Stream, StreamExt};
use tokio_util::codec::{FramedRead, LinesCodec, LinesCodecError};
use tokio_util::io::StreamReader;

/// Longest line accepted from the provider.
pub const MAX_LINE_LEN: usize = 1024 * 1024; // 1 MiB

/// Split a chunked body into lines of at most `max_len` bytes.
///
/// Line terminators (`\n` or `\r\n`) are stripped. A line that grows past
/// `max_len` yields [`LinesCodecError::MaxLineLengthExceeded`].
pub fn lines<S, B, E>(body: S, max_len: usize) -> impl Stream<Item = Result<String, LinesCodecError>>
where
    S: Stream<Item = Result<B, E>>,
    B: Buf,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let reader = StreamReader::new(body.map(|chunk| chunk.map_err(std::io::Error::other)));
    FramedRead::new(reader, LinesCodec::new_with_max_length(max_len))
}

/// Assembles SSE lines into events and yields their `data` payloads.
///
/// Only the `data` field matters to the provider adapter; comments and other
/// fields (`event`, `id`, `retry`) are skipped.
#[derive(Debug, Default)]
pub struct SseEvents {
    data: Vec<String>,
}

impl SseEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one line; returns the event data when the line completes an event.
    pub fn push_line(&mut self, line: &str) -> Option<String> {
        let line = line.strip_suffix('\r').unwrap_or(line);
        if line.is_empty() {
            return self.dispatch();
        }
        if line.starts_with(':') {
            return None;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        if field == "data" {
            self.data.push(value.to_owned());
        }
        None
    }

    /// Flush the event left open when the stream ends without a blank line.
    pub fn finish(&mut self) -> Option<String> {
        self.dispatch()
    }

    fn dispatch(&mut self) -> Option<String> {
        if self.data.is_empty() {
            return None;
        }
        Some(std::mem::take(&mut self.data).join("\n"))
    }
}

// ── Tests ──────────────────────────────────────────────────────────────────────
