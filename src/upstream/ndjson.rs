//! Newline-delimited JSON framing for streamed generations.
//!
//! Raw body bytes arrive in arbitrary pieces. `LineBuffer` keeps the
//! incomplete tail until its newline shows up; `parse_line` turns one
//! complete line into a `StreamLine`, skipping blanks and garbage.

use crate::upstream::types::StreamChunk;

/// Longest line accepted before the stream is considered broken.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// A single line grew past the buffer's limit without a newline.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("stream line exceeds {limit} bytes")]
pub struct LineTooLong {
    pub limit: usize,
}

/// Accumulates bytes and yields complete lines in arrival order.
#[derive(Debug)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Bytes of `pending` already known to hold no newline.
    scanned: usize,
    max_line: usize,
}

impl Default for LineBuffer {
    fn default() -> Self {
        Self::with_max_line(MAX_LINE_BYTES)
    }
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            pending: Vec::new(),
            scanned: 0,
            max_line,
        }
    }

    /// Append bytes and drain every complete line (without the newline).
    ///
    /// Each byte is scanned once. Fails when the unterminated tail grows
    /// past the limit; the buffer is cleared in that case.
    pub fn push(&mut self, bytes: &[u8]) -> Result<Vec<Vec<u8>>, LineTooLong> {
        self.pending.extend_from_slice(bytes);

        let mut lines = Vec::new();
        let mut start = 0;
        let mut scan = self.scanned;
        while let Some(offset) = self.pending[scan..].iter().position(|&b| b == b'\n') {
            let end = scan + offset;
            let line = &self.pending[start..end];
            lines.push(line.strip_suffix(b"\r").unwrap_or(line).to_vec());
            start = end + 1;
            scan = start;
        }
        self.pending.drain(..start);
        self.scanned = self.pending.len();

        if self.pending.len() > self.max_line {
            self.pending.clear();
            self.scanned = 0;
            return Err(LineTooLong {
                limit: self.max_line,
            });
        }
        Ok(lines)
    }

    /// Take whatever is left once the body has ended.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        self.scanned = 0;
        if self.pending.is_empty() {
            None
        } else {
            Some(std::mem::take(&mut self.pending))
        }
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

/// Meaning of one complete NDJSON line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    /// Partial text (`done: false`).
    Chunk(String),
    /// Terminal marker, with any trailing text it carried.
    Done(Option<String>),
    /// Upstream reported an error object.
    Failed(String),
}

/// Parse a line; `None` for blank or malformed input.
pub fn parse_line(line: &[u8]) -> Option<StreamLine> {
    if line.iter().all(u8::is_ascii_whitespace) {
        return None;
    }

    let chunk: StreamChunk = match serde_json::from_slice(line) {
        Ok(chunk) => chunk,
        Err(e) => {
            tracing::trace!(error = %e, "Skipping malformed stream line");
            return None;
        }
    };

    if let Some(error) = chunk.error {
        return Some(StreamLine::Failed(error));
    }
    if chunk.done {
        return Some(StreamLine::Done(chunk.response.filter(|text| !text.is_empty())));
    }
    chunk.response.map(StreamLine::Chunk)
}
