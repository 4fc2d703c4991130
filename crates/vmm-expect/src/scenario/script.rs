//! Scripted scenarios.
//!
//! A script is an ordered list of steps over named sessions. Steps that
//! omit `session` address the session named `main`. In TOML:
//!
//! ```toml
//! [[scenario.steps]]
//! op = "spawn"
//! command = "{ukvm} --net=tap100 {kernel}"
//!
//! [[scenario.steps]]
//! op = "expect"
//! pattern = "Serving ping on 10.0.0.2"
//!
//! [[scenario.steps]]
//! op = "spawn"
//! session = "ping"
//! command = "ping -c 10 -i 0.2 10.0.0.2"
//! transport = "pipe"
//!
//! [[scenario.steps]]
//! op = "expect"
//! session = "ping"
//! pattern = { regex = "icmp_seq=10 " }
//! ```

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::{Cleanup, Scenario, ScenarioContext};
use crate::config::Transport;
use crate::error::{ExpectError, Result};
use crate::expect::Pattern;
use crate::session::{CommandLine, RecoveryPolicy};
use crate::types::{ExitCodeClass, Signal};
use crate::util::secs;

fn main_session() -> String {
    "main".to_string()
}

/// One scripted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Spawn a session from a command line.
    Spawn {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// The command line (already expanded).
        command: String,
        /// PTY or pipes.
        #[serde(default)]
        transport: Transport,
        /// Default expect timeout of the session.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
        /// Terminal echo.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        echo: Option<bool>,
        /// Extra environment.
        #[serde(default, skip_serializing_if = "HashMap::is_empty")]
        env: HashMap<String, String>,
        /// What a failed expectation does to the process.
        #[serde(default)]
        recovery: RecoveryPolicy,
    },

    /// Send a line.
    Send {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// Text, without line ending.
        line: String,
    },

    /// Wait for a pattern.
    Expect {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// What to wait for.
        pattern: Pattern,
        /// Overrides the session default.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },

    /// Wait for several patterns in order under one timeout.
    ExpectSequence {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// Patterns in expected order.
        patterns: Vec<Pattern>,
        /// Overrides the session default.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
    },

    /// Deliver a signal to the session's process group.
    Signal {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// The signal.
        signal: Signal,
    },

    /// SIGTERM, escalating to SIGKILL.
    Terminate {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
    },

    /// Wait for the process to exit and check its status.
    WaitExit {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// Overrides the session default.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
        /// Accepted exit results.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit: Option<ExitCodeClass>,
    },

    /// Wait for end of output, then exit, and check the status.
    ExpectEof {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
        /// Overrides the session default.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
        /// Accepted exit results.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit: Option<ExitCodeClass>,
    },

    /// Close a session.
    Close {
        /// Session name.
        #[serde(default = "main_session")]
        session: String,
    },

    /// Run a command to completion (setup work such as creating a disk
    /// image).
    Run {
        /// The command line.
        command: String,
        /// Time allowed.
        #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
        timeout: Option<Duration>,
        /// Accepted exit results.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        exit: Option<ExitCodeClass>,
    },

    /// Run a command after the scenario, whatever its outcome.
    DeferCommand {
        /// The command line.
        command: String,
    },

    /// Remove a file after the scenario, whatever its outcome.
    DeferRemove {
        /// The file.
        path: PathBuf,
    },

    /// Pause.
    Sleep {
        /// How long.
        #[serde(with = "secs")]
        duration: Duration,
    },
}

impl Step {
    /// The `op` name of the step.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Spawn { .. } => "spawn",
            Self::Send { .. } => "send",
            Self::Expect { .. } => "expect",
            Self::ExpectSequence { .. } => "expect_sequence",
            Self::Signal { .. } => "signal",
            Self::Terminate { .. } => "terminate",
            Self::WaitExit { .. } => "wait_exit",
            Self::ExpectEof { .. } => "expect_eof",
            Self::Close { .. } => "close",
            Self::Run { .. } => "run",
            Self::DeferCommand { .. } => "defer_command",
            Self::DeferRemove { .. } => "defer_remove",
            Self::Sleep { .. } => "sleep",
        }
    }

    /// The session the step addresses, if any.
    #[must_use]
    pub fn session(&self) -> Option<&str> {
        match self {
            Self::Spawn { session, .. }
            | Self::Send { session, .. }
            | Self::Expect { session, .. }
            | Self::ExpectSequence { session, .. }
            | Self::Signal { session, .. }
            | Self::Terminate { session }
            | Self::WaitExit { session, .. }
            | Self::ExpectEof { session, .. }
            | Self::Close { session } => Some(session),
            Self::Run { .. }
            | Self::DeferCommand { .. }
            | Self::DeferRemove { .. }
            | Self::Sleep { .. } => None,
        }
    }

    async fn execute(&self, ctx: &mut ScenarioContext) -> Result<()> {
        match self {
            Self::Spawn {
                session,
                command,
                transport,
                timeout,
                echo,
                env,
                recovery,
            } => {
                let mut config = CommandLine::parse(command)?.into_config();
                config.transport = *transport;
                config.recovery = *recovery;
                config.timeout.grace = ctx.timeouts().grace;
                config.timeout.expect = timeout.unwrap_or(ctx.timeouts().expect);
                if let Some(echo) = echo {
                    config.echo = *echo;
                }
                config.env.extend(env.clone());
                ctx.open_named(session.clone(), config).await?;
            }
            Self::Send { session, line } => {
                ctx.session_named(session)?.send_line(line).await?;
            }
            Self::Expect {
                session,
                pattern,
                timeout,
            } => {
                let s = ctx.session_named(session)?;
                let timeout = timeout.unwrap_or(s.config().timeout.expect);
                s.expect_timeout(pattern, timeout).await?;
            }
            Self::ExpectSequence {
                session,
                patterns,
                timeout,
            } => {
                let s = ctx.session_named(session)?;
                let timeout = timeout.unwrap_or(s.config().timeout.expect);
                s.expect_sequence(patterns, timeout).await?;
            }
            Self::Signal { session, signal } => {
                ctx.session_named(session)?.signal(*signal)?;
            }
            Self::Terminate { session } => {
                ctx.session_named(session)?.terminate().await?;
            }
            Self::WaitExit {
                session,
                timeout,
                exit,
            } => {
                let class = ctx.resolve_exit_class(exit.as_ref(), ExitCodeClass::success);
                let s = ctx.session_named(session)?;
                let timeout = timeout.unwrap_or(s.config().timeout.expect);
                s.expect_exit(&class, timeout).await?;
            }
            Self::ExpectEof {
                session,
                timeout,
                exit,
            } => {
                let class = ctx.resolve_exit_class(exit.as_ref(), ExitCodeClass::success);
                let s = ctx.session_named(session)?;
                let timeout = timeout.unwrap_or(s.config().timeout.expect);
                let status = s.expect_eof(timeout).await?;
                if !class.accepts(status) {
                    return Err(ExpectError::ExitCode {
                        session: s.label().to_string(),
                        status,
                        expected: class,
                    });
                }
            }
            Self::Close { session } => {
                ctx.session_named(session)?.close().await?;
            }
            Self::Run {
                command,
                timeout,
                exit,
            } => {
                let class = ctx.resolve_exit_class(exit.as_ref(), ExitCodeClass::success);
                let timeout = timeout.unwrap_or(ctx.timeouts().expect);
                ctx.run_command(command, timeout, &class).await?;
            }
            Self::DeferCommand { command } => ctx.defer(Cleanup::Command(command.clone())),
            Self::DeferRemove { path } => ctx.defer(Cleanup::RemoveFile(path.clone())),
            Self::Sleep { duration } => tokio::time::sleep(*duration).await,
        }
        Ok(())
    }
}

/// A scenario made of [`Step`]s executed in order; the first failing step
/// ends it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptScenario {
    /// The steps.
    pub steps: Vec<Step>,
}

impl ScriptScenario {
    /// Create a script from steps.
    #[must_use]
    pub const fn new(steps: Vec<Step>) -> Self {
        Self { steps }
    }
}

impl Scenario for ScriptScenario {
    fn run<'a>(&'a self, ctx: &'a mut ScenarioContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            for (i, step) in self.steps.iter().enumerate() {
                let stage = match step.session() {
                    Some(session) => format!("step {} {} [{session}]", i + 1, step.op()),
                    None => format!("step {} {}", i + 1, step.op()),
                };
                ctx.set_stage(stage);
                step.execute(ctx).await?;
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TimeoutConfig;

    fn parse(json: &str) -> ScriptScenario {
        serde_json::from_str(json).expect("parse script")
    }

    #[test]
    fn steps_default_to_main_session() {
        let script = parse(
            r#"{"steps": [
                {"op": "spawn", "command": "ukvm-bin kernel"},
                {"op": "expect", "pattern": "Hello", "timeout": 1.5},
                {"op": "expect", "session": "gdb", "pattern": {"regex": "Breakpoint \\d"}},
                {"op": "wait_exit", "exit": {"codes": [0, 2, 83]}}
            ]}"#,
        );
        assert_eq!(script.steps.len(), 4);
        assert_eq!(script.steps[0].session(), Some("main"));
        assert_eq!(
            script.steps[1],
            Step::Expect {
                session: "main".into(),
                pattern: Pattern::literal("Hello"),
                timeout: Some(Duration::from_millis(1500)),
            }
        );
        assert_eq!(script.steps[2].session(), Some("gdb"));
        assert_eq!(script.steps[3].op(), "wait_exit");
    }

    #[tokio::test]
    async fn runs_steps_in_order() {
        let script = parse(
            r#"{"steps": [
                {"op": "spawn", "command": "/bin/sh -c 'read x; echo got:$x; exit 2'", "transport": "pipe"},
                {"op": "send", "line": "hello"},
                {"op": "expect", "pattern": "got:hello"},
                {"op": "wait_exit", "exit": {"codes": [2]}}
            ]}"#,
        );
        let mut ctx = ScenarioContext::new("script", TimeoutConfig::default());
        script.run(&mut ctx).await.expect("script passes");
        assert_eq!(ctx.stage(), Some("step 4 wait_exit [main]"));
        assert!(ctx.close_all().await.is_empty());
    }

    #[tokio::test]
    async fn context_exit_class_applies_to_steps_without_one() {
        let script = parse(
            r#"{"steps": [
                {"op": "spawn", "command": "/bin/sh -c 'exit 83'", "transport": "pipe"},
                {"op": "expect_eof"}
            ]}"#,
        );
        let mut ctx = ScenarioContext::new("override", TimeoutConfig::default())
            .with_exit_class(Some(ExitCodeClass::codes([0, 83])));
        script.run(&mut ctx).await.expect("83 accepted");
        ctx.close_all().await;

        let mut ctx = ScenarioContext::new("default", TimeoutConfig::default());
        let err = script.run(&mut ctx).await.expect_err("83 rejected");
        assert!(matches!(err, ExpectError::ExitCode { .. }));
        ctx.close_all().await;
    }

    #[tokio::test]
    async fn missing_session_is_an_error() {
        let script = parse(r#"{"steps": [{"op": "send", "session": "gdb", "line": "quit"}]}"#);
        let mut ctx = ScenarioContext::new("missing", TimeoutConfig::default());
        let err = script.run(&mut ctx).await.expect_err("no such session");
        assert!(matches!(err, ExpectError::SessionNotFound { .. }));
    }
}
