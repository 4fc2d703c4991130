//! The session handle.

use std::time::Duration;

use tokio::time::Instant;

use super::{CommandLine, RecoveryPolicy, SessionBuilder};
use crate::channel::{LineChannel, StreamState};
use crate::config::SessionConfig;
use crate::error::{ExpectError, FailureReason, Result};
use crate::expect::{ExpectOutcome, OutputBuffer, Pattern, expect_pattern};
use crate::types::{ControlChar, ExitCodeClass, ExitStatus, Match, SessionState, Signal};
use crate::util::Deadline;

/// Pattern text reported when waiting for end of output fails.
const EOF_PATTERN: &str = "<end of output>";

/// Pattern text reported when waiting for process exit fails.
const EXIT_PATTERN: &str = "<process exit>";

/// One spawned process and the output its expectations consume.
///
/// Expectations take `&mut self`, so at most one is in flight per session;
/// output keeps being collected by the channel's reader task meanwhile.
#[derive(Debug)]
pub struct Session {
    channel: Option<LineChannel>,
    buffer: OutputBuffer,
    config: SessionConfig,
    label: String,
    pid: u32,
    status: Option<ExitStatus>,
}

impl Session {
    /// Spawn a session from a configuration.
    pub async fn spawn(config: SessionConfig) -> Result<Self> {
        let channel = LineChannel::spawn(&config).await?;
        let label = channel.label().to_string();
        let pid = channel.pid();
        tracing::info!(session = %label, pid, command = %config.command, "session opened");

        Ok(Self {
            channel: Some(channel),
            buffer: OutputBuffer::new(),
            config,
            label,
            pid,
            status: None,
        })
    }

    /// Parse `command_line` and spawn it on a PTY with `default_timeout` for
    /// expectations.
    pub async fn open(command_line: &str, default_timeout: Duration) -> Result<Self> {
        let config = CommandLine::parse(command_line)?
            .into_config()
            .expect_timeout(default_timeout);
        Self::spawn(config).await
    }

    /// Create a builder.
    #[must_use]
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    /// Label used in logs and errors.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Process ID of the child.
    #[must_use]
    pub const fn pid(&self) -> u32 {
        self.pid
    }

    /// The configuration the session was spawned with.
    #[must_use]
    pub const fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Output received and not yet consumed by a match.
    ///
    /// Only reflects what expectations have drained so far; call
    /// [`Session::refresh`] first for an up-to-date view.
    #[must_use]
    pub const fn buffer(&self) -> &OutputBuffer {
        &self.buffer
    }

    /// Move output that has arrived into the buffer without waiting.
    pub fn refresh(&mut self) {
        if let Some(channel) = self.channel.as_mut() {
            channel.read_available(&mut self.buffer);
        }
    }

    /// The exit status, once the process has been reaped.
    #[must_use]
    pub const fn exit_status(&self) -> Option<ExitStatus> {
        self.status
    }

    /// Current lifecycle state, reaping the process if it exited.
    pub fn state(&mut self) -> SessionState {
        self.poll_exit();
        match (&self.channel, self.status) {
            (None, _) => SessionState::Closed,
            (Some(_), Some(status)) => SessionState::Exited(status),
            (Some(_), None) => SessionState::Running,
        }
    }

    /// Check if the process is still running.
    pub fn is_alive(&mut self) -> bool {
        self.state() == SessionState::Running
    }

    fn poll_exit(&mut self) {
        if self.status.is_some() {
            return;
        }
        if let Some(channel) = self.channel.as_mut() {
            match channel.try_wait() {
                Ok(status) => self.status = status,
                Err(e) => tracing::debug!(session = %self.label, error = %e, "try_wait failed"),
            }
        }
    }

    fn channel_mut(&mut self) -> Result<&mut LineChannel> {
        let label = &self.label;
        self.channel.as_mut().ok_or_else(|| ExpectError::SessionClosed {
            session: label.clone(),
        })
    }

    /// Write raw bytes to the process.
    pub async fn send(&mut self, data: impl AsRef<[u8]>) -> Result<()> {
        let data = data.as_ref();
        tracing::trace!(session = %self.label, bytes = data.len(), "send");
        self.channel_mut()?.send(data).await
    }

    /// Write a string without a line ending.
    pub async fn send_str(&mut self, s: &str) -> Result<()> {
        self.send(s.as_bytes()).await
    }

    /// Write `line` followed by the configured line ending.
    pub async fn send_line(&mut self, line: &str) -> Result<()> {
        tracing::debug!(session = %self.label, line, "send line");
        self.channel_mut()?.write_line(line).await
    }

    /// Write a control character.
    pub async fn send_control(&mut self, ctrl: ControlChar) -> Result<()> {
        tracing::debug!(session = %self.label, ?ctrl, "send control");
        self.send([ctrl.as_byte()]).await
    }

    /// Deliver a signal to the process group.
    pub fn signal(&mut self, signal: Signal) -> Result<()> {
        tracing::debug!(session = %self.label, %signal, "signal");
        self.channel_mut()?.signal(signal)
    }

    /// Wait for `pattern` with the default timeout.
    ///
    /// On failure the recovery policy is applied before the error returns.
    pub async fn expect(&mut self, pattern: impl Into<Pattern>) -> Result<Match> {
        let timeout = self.config.timeout.expect;
        self.expect_timeout(pattern, timeout).await
    }

    /// Wait for `pattern` with an explicit timeout.
    pub async fn expect_timeout(
        &mut self,
        pattern: impl Into<Pattern>,
        timeout: Duration,
    ) -> Result<Match> {
        let pattern = pattern.into();
        let outcome = self
            .expect_until(&pattern, Deadline::from_now(timeout))
            .await?;
        self.settle(&pattern, outcome).await
    }

    /// Wait for `pattern` and return the raw outcome.
    ///
    /// Timeouts and process end are values here, not errors, and the
    /// recovery policy is not applied: the process and the unmatched output
    /// are left exactly as they were.
    pub async fn expect_outcome(
        &mut self,
        pattern: impl Into<Pattern>,
        timeout: Duration,
    ) -> Result<ExpectOutcome> {
        self.expect_until(&pattern.into(), Deadline::from_now(timeout))
            .await
    }

    /// Wait for each pattern in order, all within one `timeout`.
    pub async fn expect_sequence<I, P>(&mut self, patterns: I, timeout: Duration) -> Result<Vec<Match>>
    where
        I: IntoIterator<Item = P>,
        P: Into<Pattern>,
    {
        let deadline = Deadline::from_now(timeout);
        let mut matches = Vec::new();
        for pattern in patterns {
            let pattern = pattern.into();
            let outcome = self.expect_until(&pattern, deadline).await?;
            matches.push(self.settle(&pattern, outcome).await?);
        }
        Ok(matches)
    }

    async fn expect_until(&mut self, pattern: &Pattern, deadline: Deadline) -> Result<ExpectOutcome> {
        let compiled = pattern.compile()?;
        let Some(channel) = self.channel.as_mut() else {
            return Err(ExpectError::SessionClosed {
                session: self.label.clone(),
            });
        };

        tracing::debug!(
            session = %self.label,
            pattern = compiled.display(),
            timeout = ?deadline.remaining(),
            "expect"
        );
        let outcome = expect_pattern(channel, &mut self.buffer, &compiled, deadline).await;
        match &outcome {
            ExpectOutcome::Matched(m) => {
                tracing::debug!(session = %self.label, matched = %m.matched, "matched");
            }
            ExpectOutcome::TimedOut { elapsed } => {
                tracing::debug!(session = %self.label, ?elapsed, "expect timed out");
            }
            ExpectOutcome::ProcessEnded { elapsed } => {
                tracing::debug!(session = %self.label, ?elapsed, "output ended before match");
                self.poll_exit();
            }
        }
        Ok(outcome)
    }

    /// Turn an outcome into a match or a failure with recovery applied.
    async fn settle(&mut self, pattern: &Pattern, outcome: ExpectOutcome) -> Result<Match> {
        match outcome {
            ExpectOutcome::Matched(m) => Ok(m),
            ExpectOutcome::TimedOut { elapsed } => {
                Err(self.fail(pattern.to_string(), elapsed, FailureReason::Timeout).await)
            }
            ExpectOutcome::ProcessEnded { elapsed } => {
                Err(self
                    .fail(pattern.to_string(), elapsed, FailureReason::ProcessEnded)
                    .await)
            }
        }
    }

    async fn fail(&mut self, pattern: String, elapsed: Duration, reason: FailureReason) -> ExpectError {
        let tail = self.buffer.tail(self.config.tail_bytes);
        tracing::warn!(session = %self.label, %pattern, ?elapsed, %reason, "expectation failed");

        if self.config.recovery == RecoveryPolicy::TerminateOnFailure && self.channel.is_some() {
            if let Err(e) = self.terminate().await {
                tracing::warn!(session = %self.label, error = %e, "terminate after failure failed");
            }
        }

        ExpectError::ExpectationFailed {
            session: self.label.clone(),
            pattern,
            tail,
            elapsed,
            reason,
        }
    }

    /// Wait until the output stream ends, then for the process to exit.
    ///
    /// Output printed meanwhile stays in the buffer.
    pub async fn expect_eof(&mut self, timeout: Duration) -> Result<ExitStatus> {
        let started = Instant::now();
        let deadline = Deadline::from_now(timeout);
        let Some(channel) = self.channel.as_mut() else {
            return Err(ExpectError::SessionClosed {
                session: self.label.clone(),
            });
        };
        loop {
            if channel.read_available(&mut self.buffer) == StreamState::Ended {
                break;
            }
            if deadline.is_expired() {
                return Err(self
                    .fail(EOF_PATTERN.to_string(), started.elapsed(), FailureReason::Timeout)
                    .await);
            }
            channel.readable(deadline.instant()).await;
        }
        self.wait_exit_until(deadline, started).await
    }

    /// Wait for the process to exit within `timeout`.
    pub async fn wait_exit(&mut self, timeout: Duration) -> Result<ExitStatus> {
        self.wait_exit_until(Deadline::from_now(timeout), Instant::now())
            .await
    }

    async fn wait_exit_until(&mut self, deadline: Deadline, started: Instant) -> Result<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        let channel = self.channel_mut()?;
        let waited = tokio::time::timeout_at(deadline.instant(), channel.wait()).await;
        match waited {
            Ok(status) => {
                let status = status?;
                self.status = Some(status);
                self.refresh();
                tracing::info!(session = %self.label, %status, "process exited");
                Ok(status)
            }
            Err(_) => {
                self.refresh();
                Err(self
                    .fail(EXIT_PATTERN.to_string(), started.elapsed(), FailureReason::Timeout)
                    .await)
            }
        }
    }

    /// Wait for exit and check the status against `class`.
    pub async fn expect_exit(&mut self, class: &ExitCodeClass, timeout: Duration) -> Result<ExitStatus> {
        let status = self.wait_exit(timeout).await?;
        if class.accepts(status) {
            Ok(status)
        } else {
            Err(ExpectError::ExitCode {
                session: self.label.clone(),
                status,
                expected: class.clone(),
            })
        }
    }

    /// SIGTERM, escalating to SIGKILL after the grace period.
    pub async fn terminate(&mut self) -> Result<ExitStatus> {
        let grace = self.config.timeout.grace;
        let status = self.channel_mut()?.terminate(grace).await?;
        self.status = Some(status);
        self.refresh();
        tracing::debug!(session = %self.label, %status, "terminated");
        Ok(status)
    }

    /// Release the process and its streams.
    ///
    /// A running process is terminated, an exited one is reaped. Safe to
    /// call any number of times; later calls return the status recorded by
    /// the first.
    pub async fn close(&mut self) -> Result<Option<ExitStatus>> {
        if self.channel.is_none() {
            return Ok(self.status);
        }

        self.poll_exit();
        let result = if self.status.is_some() {
            Ok(self.status)
        } else {
            self.terminate().await.map(Some)
        };
        self.refresh();
        self.channel = None;
        tracing::info!(session = %self.label, status = ?self.status, "session closed");
        result
    }
}
