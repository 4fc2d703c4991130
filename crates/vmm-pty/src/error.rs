//! Error types for the vmm-pty crate.

use std::io;

/// The error type for PTY and child-process operations.
#[derive(Debug, thiserror::Error)]
pub enum PtyError {
    /// Failed to create a new PTY.
    #[error("failed to create PTY: {0}")]
    Create(#[source] io::Error),

    /// Failed to spawn a child process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[source] io::Error),

    /// An I/O error occurred during PTY operations.
    #[error("PTY I/O error: {0}")]
    Io(#[from] io::Error),

    /// Failed to set terminal attributes.
    #[error("failed to set terminal attributes: {0}")]
    SetAttributes(#[source] io::Error),

    /// Failed to resize the PTY.
    #[error("failed to resize PTY: {0}")]
    Resize(#[source] io::Error),

    /// The child process has already been reaped.
    #[error("child process already exited: {0}")]
    ProcessExited(crate::status::ExitStatus),

    /// Failed to send a signal to the child process.
    #[error("failed to send signal: {0}")]
    Signal(#[source] io::Error),

    /// Failed to wait for the child process.
    #[error("failed to wait for child: {0}")]
    Wait(#[source] io::Error),
}

/// A specialized Result type for PTY operations.
pub type Result<T> = std::result::Result<T, PtyError>;

#[cfg(unix)]
impl From<rustix::io::Errno> for PtyError {
    fn from(errno: rustix::io::Errno) -> Self {
        Self::Io(io::Error::from_raw_os_error(errno.raw_os_error()))
    }
}

impl PtyError {
    /// The underlying I/O error kind, if this error wraps one.
    #[must_use]
    pub fn io_kind(&self) -> Option<io::ErrorKind> {
        match self {
            Self::Create(e)
            | Self::Spawn(e)
            | Self::Io(e)
            | Self::SetAttributes(e)
            | Self::Resize(e)
            | Self::Signal(e)
            | Self::Wait(e) => Some(e.kind()),
            Self::ProcessExited(_) => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ExitStatus;

    #[test]
    fn exited_child_display() {
        let err = PtyError::ProcessExited(ExitStatus::Exited(83));
        assert_eq!(err.to_string(), "child process already exited: exited with code 83");
        assert_eq!(err.io_kind(), None);
    }

    #[test]
    fn spawn_error_keeps_kind() {
        let err = PtyError::Spawn(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::NotFound));
        assert!(err.to_string().contains("no such file"));
    }

    #[test]
    fn wait_error_keeps_kind() {
        let err = PtyError::Wait(io::Error::from(io::ErrorKind::Interrupted));
        assert_eq!(err.io_kind(), Some(io::ErrorKind::Interrupted));
        assert!(err.to_string().starts_with("failed to wait for child"));
    }
}
