//! Test utilities: scripted output sources and shell-backed sessions.
//!
//! Enabled for this crate's own tests and, through the `test-utils`
//! feature, for downstream crates.

use std::collections::VecDeque;
use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;

use crate::channel::StreamState;
use crate::config::{SessionConfig, Transport};
use crate::expect::{OutputBuffer, OutputSource};

#[derive(Debug)]
enum Event {
    Chunk(Bytes),
    Pause(Duration),
}

/// An [`OutputSource`] that replays a fixed script of chunks.
///
/// Each `drain_into` call delivers at most one chunk, so matching sees the
/// output arrive piece by piece the way a real process would produce it.
///
/// ```
/// use std::time::Duration;
/// use vmm_expect::test_utils::ScriptedSource;
///
/// let source = ScriptedSource::new()
///     .chunk("Waiting for a debugger")
///     .pause(Duration::from_millis(10))
///     .chunk("Connection from debugger")
///     .end();
/// assert_eq!(source.remaining(), 3);
/// ```
#[derive(Debug, Default)]
pub struct ScriptedSource {
    events: VecDeque<Event>,
    ends: bool,
    resume_at: Option<Instant>,
}

impl ScriptedSource {
    /// Create an empty source whose stream stays open.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a chunk of output.
    #[must_use]
    pub fn chunk(mut self, data: impl AsRef<[u8]>) -> Self {
        self.events
            .push_back(Event::Chunk(Bytes::copy_from_slice(data.as_ref())));
        self
    }

    /// Queue a delay before the next chunk.
    #[must_use]
    pub fn pause(mut self, delay: Duration) -> Self {
        self.events.push_back(Event::Pause(delay));
        self
    }

    /// End the stream once every queued event was delivered.
    #[must_use]
    pub const fn end(mut self) -> Self {
        self.ends = true;
        self
    }

    /// Number of events not yet delivered.
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.events.len()
    }

    /// Drop a finished pause from the front of the queue.
    fn settle_pause(&mut self) {
        if let Some(Event::Pause(delay)) = self.events.front() {
            let resume_at = *self.resume_at.get_or_insert_with(|| Instant::now() + *delay);
            if Instant::now() >= resume_at {
                self.events.pop_front();
                self.resume_at = None;
            }
        }
    }
}

impl OutputSource for ScriptedSource {
    fn drain_into(&mut self, buffer: &mut OutputBuffer) -> StreamState {
        self.settle_pause();
        if matches!(self.events.front(), Some(Event::Chunk(_))) {
            if let Some(Event::Chunk(chunk)) = self.events.pop_front() {
                buffer.append(&chunk);
            }
        }
        if self.events.is_empty() && self.ends {
            StreamState::Ended
        } else {
            StreamState::Open
        }
    }

    async fn wait_readable(&mut self, deadline: Instant) {
        self.settle_pause();
        match self.events.front() {
            Some(Event::Chunk(_)) => tokio::task::yield_now().await,
            Some(Event::Pause(_)) => {
                let resume_at = self.resume_at.unwrap_or(deadline);
                tokio::time::sleep_until(resume_at.min(deadline)).await;
            }
            None if self.ends => {}
            None => tokio::time::sleep_until(deadline).await,
        }
    }
}

/// A pipe-backed session config running `script` under `/bin/sh -c`.
#[must_use]
pub fn sh(script: &str) -> SessionConfig {
    SessionConfig::new("/bin/sh")
        .args(["-c", script])
        .transport(Transport::Pipe)
}

/// Like [`sh`] but on a pseudo-terminal.
#[must_use]
pub fn sh_pty(script: &str) -> SessionConfig {
    SessionConfig::new("/bin/sh").args(["-c", script])
}
