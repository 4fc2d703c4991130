//! Error types for vmm-expect.
//!
//! Failed expectations carry the pattern, a bounded tail of the output that
//! was buffered when the wait ended, and the elapsed time, so a failing
//! scenario report shows what the process actually said.

use std::fmt;
use std::time::Duration;

use thiserror::Error;
use vmm_pty::PtyError;

use crate::types::{ExitCodeClass, ExitStatus};

/// Maximum length of buffer content to display in error messages.
const MAX_BUFFER_DISPLAY: usize = 500;

/// Lines kept when a long buffer is shown.
const CONTEXT_LINES: usize = 6;

/// Format buffered output for display, keeping only the tail of long text.
pub(crate) fn format_buffer_snippet(buffer: &str) -> String {
    if buffer.is_empty() {
        return "(no output)".to_string();
    }

    let lines: Vec<&str> = buffer.lines().collect();
    if buffer.len() <= MAX_BUFFER_DISPLAY || lines.len() <= CONTEXT_LINES {
        return format!(
            "┌─ output tail ({} bytes) ──────────────────\n│ {}\n└────────────────────────────────────────",
            buffer.len(),
            lines.join("\n│ ")
        );
    }

    let tail = &lines[lines.len() - CONTEXT_LINES..];
    format!(
        "┌─ output tail ({} bytes, {} lines) ────────\n│ ... ({} lines hidden)\n│ {}\n└────────────────────────────────────────",
        buffer.len(),
        lines.len(),
        lines.len() - tail.len(),
        tail.join("\n│ ")
    )
}

/// Why an expectation did not match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// The deadline passed while the process was still producing output.
    Timeout,
    /// The output stream ended without the pattern appearing.
    ProcessEnded,
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timeout => f.write_str("timed out"),
            Self::ProcessEnded => f.write_str("process ended"),
        }
    }
}

fn format_expectation_failed(
    session: &str,
    pattern: &str,
    tail: &str,
    elapsed: Duration,
    reason: FailureReason,
) -> String {
    let headline = match reason {
        FailureReason::Timeout => format!("[{session}] timeout after {elapsed:.2?} waiting for pattern"),
        FailureReason::ProcessEnded => {
            format!("[{session}] process output ended after {elapsed:.2?} without matching pattern")
        }
    };
    format!(
        "{headline}\n\nPattern: {pattern}\n\n{}",
        format_buffer_snippet(tail)
    )
}

/// The main error type for vmm-expect operations.
#[derive(Debug, Error)]
pub enum ExpectError {
    /// Failed to spawn a process.
    #[error("failed to spawn process: {0}")]
    Spawn(#[from] SpawnError),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An I/O error occurred with additional context.
    #[error("{context}: {source}")]
    IoWithContext {
        /// What operation was being performed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A PTY or child-process operation failed.
    #[error(transparent)]
    Pty(#[from] PtyError),

    /// An expectation was not met: timeout or unexpected end of output.
    #[error("{}", format_expectation_failed(session, pattern, tail, *elapsed, *reason))]
    ExpectationFailed {
        /// Label of the session being observed.
        session: String,
        /// The pattern that was being waited for.
        pattern: String,
        /// Bounded tail of unmatched output.
        tail: String,
        /// How long the expectation waited.
        elapsed: Duration,
        /// Timeout or process end.
        reason: FailureReason,
    },

    /// A process exited with a status outside its accepted class.
    #[error("[{session}] {status}, expected exit class {expected}")]
    ExitCode {
        /// Label of the session.
        session: String,
        /// The observed exit status.
        status: ExitStatus,
        /// The accepted class.
        expected: ExitCodeClass,
    },

    /// Invalid pattern specification.
    #[error("invalid pattern: {message}")]
    InvalidPattern {
        /// Description of what's wrong with the pattern.
        message: String,
    },

    /// Invalid regex pattern.
    #[error("invalid regex pattern: {0}")]
    Regex(#[from] regex::Error),

    /// Session is closed.
    #[error("session '{session}' is closed")]
    SessionClosed {
        /// Label of the session.
        session: String,
    },

    /// Session not found in a scenario context.
    #[error("no session named '{name}'")]
    SessionNotFound {
        /// The name or id that was not found.
        name: String,
    },

    /// A scenario requirement such as root privilege is not met.
    #[error("privilege required: {message}")]
    Privilege {
        /// What was required.
        message: String,
    },

    /// A whole scenario ran past its overall deadline.
    #[error("scenario exceeded its overall timeout of {timeout:.2?}")]
    ScenarioTimeout {
        /// The overall timeout.
        timeout: Duration,
    },

    /// The run was interrupted by SIGINT or SIGTERM.
    #[error("interrupted")]
    Interrupted,

    /// A scenario body panicked.
    #[error("scenario panicked: {message}")]
    Panicked {
        /// The panic payload, if it was a string.
        message: String,
    },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

/// Errors related to process spawning.
#[derive(Debug, Error)]
pub enum SpawnError {
    /// Command not found.
    #[error("command not found: {command}")]
    CommandNotFound {
        /// The command that was not found.
        command: String,
    },

    /// Permission denied.
    #[error("permission denied: {path}")]
    PermissionDenied {
        /// The path that could not be executed.
        path: String,
    },

    /// PTY allocation failed.
    #[error("failed to allocate PTY: {reason}")]
    PtyAllocation {
        /// The reason for the failure.
        reason: String,
    },

    /// General I/O error during spawn.
    #[error("I/O error during spawn: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid command or argument.
    #[error("invalid {kind} '{value}': {reason}")]
    InvalidArgument {
        /// The kind of invalid input (e.g., "command", "argument").
        kind: String,
        /// The value that was invalid.
        value: String,
        /// The reason it's invalid.
        reason: String,
    },
}

impl SpawnError {
    /// Classify a launch failure of `command`.
    pub(crate) fn from_launch(command: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::CommandNotFound {
                command: command.to_string(),
            },
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied {
                path: command.to_string(),
            },
            _ => Self::Io(err),
        }
    }

    /// Classify a PTY-layer spawn failure of `command`.
    pub(crate) fn from_pty(command: &str, err: PtyError) -> Self {
        match err {
            PtyError::Spawn(e) => Self::from_launch(command, e),
            PtyError::Create(e) | PtyError::SetAttributes(e) | PtyError::Resize(e) => {
                Self::PtyAllocation {
                    reason: e.to_string(),
                }
            }
            other => Self::PtyAllocation {
                reason: other.to_string(),
            },
        }
    }
}

/// Result type alias for vmm-expect operations.
pub type Result<T> = std::result::Result<T, ExpectError>;

impl ExpectError {
    /// Create an I/O error with context.
    pub fn io_context(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::IoWithContext {
            context: context.into(),
            source,
        }
    }

    /// Create an invalid pattern error.
    pub fn invalid_pattern(message: impl Into<String>) -> Self {
        Self::InvalidPattern {
            message: message.into(),
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    /// Check if this is a failed expectation because of a timeout.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::ExpectationFailed {
                reason: FailureReason::Timeout,
                ..
            }
        )
    }

    /// Check if this is a failed expectation because the process ended.
    #[must_use]
    pub const fn is_process_ended(&self) -> bool {
        matches!(
            self,
            Self::ExpectationFailed {
                reason: FailureReason::ProcessEnded,
                ..
            }
        )
    }

    /// Check if this error came from spawning a process.
    #[must_use]
    pub const fn is_spawn(&self) -> bool {
        matches!(self, Self::Spawn(_))
    }
}
