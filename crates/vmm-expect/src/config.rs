//! Configuration types for sessions and timeouts.
//!
//! Timeouts and other tunables are plain values carried by
//! [`SessionConfig`] and [`TimeoutConfig`]; nothing is read from global
//! state except through the explicit [`EnvConfig`] overlay.

mod env;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use env::{DEFAULT_PREFIX, EnvConfig};

use crate::session::RecoveryPolicy;

/// Default timeout of a single expectation.
pub const DEFAULT_EXPECT_TIMEOUT: Duration = Duration::from_secs(3);

/// Default overall timeout of a scenario.
pub const DEFAULT_SCENARIO_TIMEOUT: Duration = Duration::from_secs(120);

/// Default time a process gets between SIGTERM and SIGKILL.
pub const DEFAULT_GRACE: Duration = Duration::from_secs(2);

/// Default number of trailing output bytes kept in failure reports.
pub const DEFAULT_TAIL_BYTES: usize = 2048;

/// Default terminal width.
pub const DEFAULT_TERMINAL_WIDTH: u16 = 80;

/// Default terminal height.
pub const DEFAULT_TERMINAL_HEIGHT: u16 = 24;

/// Default TERM for PTY sessions.
pub const DEFAULT_TERM: &str = "dumb";

/// How a session talks to its process.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// A pseudo-terminal; stdout and stderr arrive merged.
    #[default]
    Pty,
    /// Plain pipes; stdout and stderr are merged by the reader tasks.
    Pipe,
}

/// Line terminator appended by `send_line`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineEnding {
    /// `\n`
    #[default]
    Lf,
    /// `\r\n`
    CrLf,
    /// `\r`
    Cr,
}

impl LineEnding {
    /// The terminator as a string.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }
}

/// Timeouts used by sessions and scenarios.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeoutConfig {
    /// Default timeout of one expectation.
    pub expect: Duration,
    /// Overall timeout of a scenario.
    pub scenario: Duration,
    /// Grace period between SIGTERM and SIGKILL.
    pub grace: Duration,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            expect: DEFAULT_EXPECT_TIMEOUT,
            scenario: DEFAULT_SCENARIO_TIMEOUT,
            grace: DEFAULT_GRACE,
        }
    }
}

impl TimeoutConfig {
    /// Create a timeout configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the expect timeout.
    #[must_use]
    pub const fn expect(mut self, timeout: Duration) -> Self {
        self.expect = timeout;
        self
    }

    /// Set the scenario timeout.
    #[must_use]
    pub const fn scenario(mut self, timeout: Duration) -> Self {
        self.scenario = timeout;
        self
    }

    /// Set the termination grace period.
    #[must_use]
    pub const fn grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }
}

/// Configuration for one session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// The program to execute.
    pub command: String,

    /// Program arguments.
    pub args: Vec<String>,

    /// Environment variables to set.
    pub env: HashMap<String, String>,

    /// Whether to inherit the parent environment.
    pub inherit_env: bool,

    /// Working directory for the process.
    pub working_dir: Option<PathBuf>,

    /// PTY or pipes.
    pub transport: Transport,

    /// Terminator appended by `send_line`.
    pub line_ending: LineEnding,

    /// Timeouts.
    pub timeout: TimeoutConfig,

    /// Trailing bytes of output kept in failure reports.
    pub tail_bytes: usize,

    /// Terminal echo (PTY only).
    pub echo: bool,

    /// Terminal dimensions (PTY only).
    pub dimensions: (u16, u16),

    /// File that receives a copy of everything the process prints.
    pub transcript: Option<PathBuf>,

    /// Label used in logs and error messages. Defaults to the program name.
    pub label: Option<String>,

    /// What happens to the process when an expectation fails.
    pub recovery: RecoveryPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        let mut env = HashMap::new();
        env.insert("TERM".to_string(), DEFAULT_TERM.to_string());

        Self {
            command: String::new(),
            args: Vec::new(),
            env,
            inherit_env: true,
            working_dir: None,
            transport: Transport::default(),
            line_ending: LineEnding::default(),
            timeout: TimeoutConfig::default(),
            tail_bytes: DEFAULT_TAIL_BYTES,
            echo: true,
            dimensions: (DEFAULT_TERMINAL_WIDTH, DEFAULT_TERMINAL_HEIGHT),
            transcript: None,
            label: None,
            recovery: RecoveryPolicy::default(),
        }
    }
}

impl SessionConfig {
    /// Create a session configuration for `command`.
    #[must_use]
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Default::default()
        }
    }

    /// Set the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Set the transport.
    #[must_use]
    pub const fn transport(mut self, transport: Transport) -> Self {
        self.transport = transport;
        self
    }

    /// Set the default expect timeout.
    #[must_use]
    pub const fn expect_timeout(mut self, timeout: Duration) -> Self {
        self.timeout.expect = timeout;
        self
    }

    /// Set the label.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Set the recovery policy.
    #[must_use]
    pub const fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.recovery = recovery;
        self
    }

    /// The label, falling back to the program's file name.
    #[must_use]
    pub fn display_label(&self) -> String {
        self.label.clone().unwrap_or_else(|| {
            std::path::Path::new(&self.command)
                .file_name()
                .map_or_else(|| self.command.clone(), |n| n.to_string_lossy().into_owned())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SessionConfig::new("/bin/sh");
        assert_eq!(config.transport, Transport::Pty);
        assert_eq!(config.timeout.expect, DEFAULT_EXPECT_TIMEOUT);
        assert_eq!(config.env.get("TERM").map(String::as_str), Some(DEFAULT_TERM));
        assert_eq!(config.recovery, RecoveryPolicy::TerminateOnFailure);
    }

    #[test]
    fn display_label_uses_file_name() {
        assert_eq!(SessionConfig::new("test_hello/ukvm-bin").display_label(), "ukvm-bin");
        assert_eq!(SessionConfig::new("gdb").label("debugger").display_label(), "debugger");
    }

    #[test]
    fn line_endings() {
        assert_eq!(LineEnding::Lf.as_str(), "\n");
        assert_eq!(LineEnding::CrLf.as_str(), "\r\n");
    }

    #[test]
    fn timeout_builders() {
        let t = TimeoutConfig::new()
            .expect(Duration::from_secs(30))
            .grace(Duration::from_millis(500));
        assert_eq!(t.expect, Duration::from_secs(30));
        assert_eq!(t.grace, Duration::from_millis(500));
        assert_eq!(t.scenario, DEFAULT_SCENARIO_TIMEOUT);
    }
}
