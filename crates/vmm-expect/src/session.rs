//! Sessions: one child process, its output buffer and its lifecycle.
//!
//! A [`Session`] owns exactly one [`LineChannel`](crate::LineChannel) and the
//! buffer its expectations consume. It is released exactly once, either by
//! an explicit [`Session::close`] or by dropping it, which kills the process
//! group.

mod builder;
mod command_line;
mod handle;
mod recovery;

pub use builder::SessionBuilder;
pub use command_line::CommandLine;
pub use handle::Session;
pub use recovery::RecoveryPolicy;
