//! Pattern matching over process output.
//!
//! - [`Pattern`]: what to wait for (literal, regex, any-of).
//! - [`CompiledPattern`]: a pattern compiled once per expect call.
//! - [`OutputBuffer`]: unconsumed output of one session.
//! - [`expect_pattern`]: the wait loop, resolving to an [`ExpectOutcome`].

mod buffer;
mod matcher;
mod pattern;

pub use buffer::OutputBuffer;
pub use matcher::{ExpectOutcome, OutputSource, expect_pattern};
pub use pattern::{CompiledPattern, Found, Pattern};
