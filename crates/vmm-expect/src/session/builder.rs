//! Session builder for constructing sessions with custom configuration.

use std::path::PathBuf;
use std::time::Duration;

use super::{RecoveryPolicy, Session};
use crate::config::{LineEnding, SessionConfig, TimeoutConfig, Transport};
use crate::error::Result;

/// Builder for [`SessionConfig`] values and the sessions they spawn.
///
/// ```
/// use std::time::Duration;
/// use vmm_expect::{RecoveryPolicy, SessionBuilder, Transport};
///
/// let config = SessionBuilder::new()
///     .command("ping")
///     .args(["-c", "10", "10.0.0.2"])
///     .transport(Transport::Pipe)
///     .timeout(Duration::from_secs(15))
///     .recovery(RecoveryPolicy::KeepAlive)
///     .build();
/// assert_eq!(config.args.len(), 3);
/// ```
#[derive(Debug, Clone, Default)]
pub struct SessionBuilder {
    config: SessionConfig,
}

impl SessionBuilder {
    /// Create a new session builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from an existing configuration.
    #[must_use]
    pub const fn from_config(config: SessionConfig) -> Self {
        Self { config }
    }

    /// Set the command to execute.
    #[must_use]
    pub fn command(mut self, command: impl Into<String>) -> Self {
        self.config.command = command.into();
        self
    }

    /// Set the command arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.args = args.into_iter().map(Into::into).collect();
        self
    }

    /// Add a single argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.config.args.push(arg.into());
        self
    }

    /// Set a single environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.env.insert(key.into(), value.into());
        self
    }

    /// Whether to inherit the parent environment.
    #[must_use]
    pub const fn inherit_env(mut self, inherit: bool) -> Self {
        self.config.inherit_env = inherit;
        self
    }

    /// Set the working directory.
    #[must_use]
    pub fn working_directory(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.working_dir = Some(path.into());
        self
    }

    /// Set the transport.
    #[must_use]
    pub const fn transport(mut self, transport: Transport) -> Self {
        self.config.transport = transport;
        self
    }

    /// Set the line ending style.
    #[must_use]
    pub const fn line_ending(mut self, line_ending: LineEnding) -> Self {
        self.config.line_ending = line_ending;
        self
    }

    /// Set the default expect timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout.expect = timeout;
        self
    }

    /// Set the timeout configuration.
    #[must_use]
    pub const fn timeout_config(mut self, config: TimeoutConfig) -> Self {
        self.config.timeout = config;
        self
    }

    /// Set the SIGTERM to SIGKILL grace period.
    #[must_use]
    pub const fn grace(mut self, grace: Duration) -> Self {
        self.config.timeout.grace = grace;
        self
    }

    /// Set how many trailing output bytes failure reports keep.
    #[must_use]
    pub const fn tail_bytes(mut self, bytes: usize) -> Self {
        self.config.tail_bytes = bytes;
        self
    }

    /// Enable or disable terminal echo.
    #[must_use]
    pub const fn echo(mut self, echo: bool) -> Self {
        self.config.echo = echo;
        self
    }

    /// Set the terminal dimensions (width, height).
    #[must_use]
    pub const fn dimensions(mut self, cols: u16, rows: u16) -> Self {
        self.config.dimensions = (cols, rows);
        self
    }

    /// Copy all output to a transcript file.
    #[must_use]
    pub fn transcript(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.transcript = Some(path.into());
        self
    }

    /// Set the label used in logs.
    #[must_use]
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.config.label = Some(label.into());
        self
    }

    /// Set the recovery policy.
    #[must_use]
    pub const fn recovery(mut self, recovery: RecoveryPolicy) -> Self {
        self.config.recovery = recovery;
        self
    }

    /// Finish building the configuration.
    #[must_use]
    pub fn build(self) -> SessionConfig {
        self.config
    }

    /// Spawn a session with the built configuration.
    pub async fn spawn(self) -> Result<Session> {
        Session::spawn(self.config).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let config = SessionBuilder::new()
            .command("gdb")
            .arg("--ex=target remote localhost:8888")
            .arg("kernel")
            .env("LANG", "C")
            .grace(Duration::from_millis(200))
            .echo(false)
            .label("debugger")
            .build();
        assert_eq!(config.command, "gdb");
        assert_eq!(config.args.len(), 2);
        assert_eq!(config.env.get("LANG").map(String::as_str), Some("C"));
        assert_eq!(config.timeout.grace, Duration::from_millis(200));
        assert!(!config.echo);
        assert_eq!(config.display_label(), "debugger");
    }
}
