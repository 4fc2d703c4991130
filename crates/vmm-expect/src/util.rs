//! Utilities: deadlines and duration serialization.

pub mod secs;
mod timeout;

pub use timeout::Deadline;
