//! The expect loop.
//!
//! Each iteration drains whatever the source has delivered into the
//! buffer, searches it, and otherwise suspends until more output arrives,
//! the stream ends, or the deadline passes. End of stream takes precedence
//! over the deadline: a process that died without printing the pattern is
//! reported as [`ExpectOutcome::ProcessEnded`], never as a timeout.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

use super::buffer::OutputBuffer;
use super::pattern::CompiledPattern;
use crate::channel::StreamState;
use crate::types::Match;
use crate::util::Deadline;

/// A producer of process output.
pub trait OutputSource: Send {
    /// Move every chunk delivered so far into `buffer` without blocking.
    ///
    /// Returns [`StreamState::Ended`] once the stream has ended and nothing
    /// more will arrive.
    fn drain_into(&mut self, buffer: &mut OutputBuffer) -> StreamState;

    /// Wait until more output may be available, the stream ends, or
    /// `deadline` passes.
    fn wait_readable(&mut self, deadline: Instant) -> impl Future<Output = ()> + Send;
}

/// Result of one expectation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpectOutcome {
    /// The pattern was found; buffered output up to the match end was
    /// consumed.
    Matched(Match),

    /// The deadline passed with the stream still open.
    TimedOut {
        /// Time spent waiting.
        elapsed: Duration,
    },

    /// The stream ended without a match.
    ProcessEnded {
        /// Time spent waiting.
        elapsed: Duration,
    },
}

impl ExpectOutcome {
    /// Check if the pattern matched.
    #[must_use]
    pub const fn is_match(&self) -> bool {
        matches!(self, Self::Matched(_))
    }

    /// Check if the deadline passed.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::TimedOut { .. })
    }

    /// Check if the stream ended.
    #[must_use]
    pub const fn is_process_ended(&self) -> bool {
        matches!(self, Self::ProcessEnded { .. })
    }

    /// Get the match if this is a successful match.
    #[must_use]
    pub fn into_match(self) -> Option<Match> {
        match self {
            Self::Matched(m) => Some(m),
            _ => None,
        }
    }
}

/// Wait for `pattern` in the output of `source`.
///
/// Output that was already buffered is searched before anything else, so a
/// zero deadline still matches text that has arrived.
pub async fn expect_pattern<S: OutputSource>(
    source: &mut S,
    buffer: &mut OutputBuffer,
    pattern: &CompiledPattern,
    deadline: Deadline,
) -> ExpectOutcome {
    let started = Instant::now();
    let mut scan_from = 0;

    loop {
        let state = source.drain_into(buffer);

        if let Some(found) = pattern.find(buffer.as_bytes(), scan_from) {
            let consumed = buffer.consume(found.end);
            let before = String::from_utf8_lossy(&consumed[..found.start]).into_owned();
            let matched = String::from_utf8_lossy(&consumed[found.start..]).into_owned();
            return ExpectOutcome::Matched(Match {
                pattern_index: found.index,
                matched,
                captures: found.captures,
                before,
            });
        }
        scan_from = pattern.resume_point(buffer.len());

        if state == StreamState::Ended {
            return ExpectOutcome::ProcessEnded {
                elapsed: started.elapsed(),
            };
        }
        if deadline.is_expired() {
            return ExpectOutcome::TimedOut {
                elapsed: started.elapsed(),
            };
        }

        source.wait_readable(deadline.instant()).await;
    }
}
