//! Per-session output accumulator.

use std::fmt;

use bytes::{Bytes, BytesMut};

/// Output received from a process and not yet consumed by a match.
///
/// Bytes are appended in arrival order; a successful expectation consumes
/// everything up to the end of its match, so trailing output stays visible
/// to the next expectation.
#[derive(Clone, Default)]
pub struct OutputBuffer {
    data: BytesMut,
    total_received: usize,
}

impl OutputBuffer {
    /// Create an empty buffer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append newly received bytes.
    pub fn append(&mut self, chunk: &[u8]) {
        self.total_received += chunk.len();
        self.data.extend_from_slice(chunk);
    }

    /// The unconsumed bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Number of unconsumed bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Check if the buffer is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Total bytes ever appended.
    #[must_use]
    pub const fn total_received(&self) -> usize {
        self.total_received
    }

    /// Remove and return the first `end` bytes.
    pub fn consume(&mut self, end: usize) -> Bytes {
        let end = end.min(self.data.len());
        self.data.split_to(end).freeze()
    }

    /// Discard everything.
    pub fn clear(&mut self) {
        self.data.clear();
    }

    /// The last `max_bytes` bytes as lossy UTF-8.
    #[must_use]
    pub fn tail(&self, max_bytes: usize) -> String {
        let start = self.data.len().saturating_sub(max_bytes);
        String::from_utf8_lossy(&self.data[start..]).into_owned()
    }

    /// The whole buffer as lossy UTF-8.
    #[must_use]
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

impl fmt::Debug for OutputBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutputBuffer")
            .field("len", &self.data.len())
            .field("total_received", &self.total_received)
            .field("tail", &self.tail(64))
            .finish()
    }
}
