//! Remote-debugger scenarios.
//!
//! The monitor is started with its debug stub enabled and waits for a
//! debugger client. The scenario attaches the client, optionally walks
//! through breakpoints, and ends in one of three terminal states:
//!
//! ```text
//! WAITING_FOR_DEBUGGER -> CONNECTED -> (BREAKPOINT_SET -> BREAKPOINT_HIT)*
//!     +-> QUIT_REQUESTED
//!     +-> RESUMED -> EXITED_NORMALLY
//!     +-> RESUMED -> SIGNAL_TERMINATED
//! ```
//!
//! The terminal is chosen up front. A quit is issued while the target is
//! stopped: right after CONNECTED, or after the last breakpoint's
//! exchanges. A resumed target is never asked to quit.
//!
//! Every transition is one send/expect pair; a missing marker fails the
//! scenario with the stage it was waiting in.

use std::fmt;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};

use super::{Scenario, ScenarioContext};
use crate::config::SessionConfig;
use crate::error::{ExpectError, Result};
use crate::expect::Pattern;
use crate::types::{ExitCodeClass, SessionId, Signal};

const MONITOR: &str = "monitor";
const DEBUGGER: &str = "debugger";

/// Progress of a debugger scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebuggerState {
    /// The monitor announced its debug stub.
    WaitingForDebugger,
    /// Both sides confirmed the connection.
    Connected,
    /// The debugger acknowledged breakpoint `n`.
    BreakpointSet(u32),
    /// Execution stopped at breakpoint `n`.
    BreakpointHit(u32),
    /// Execution continued after the last stop.
    Resumed,
    /// The guest ran to completion.
    ExitedNormally,
    /// The debugger quit and the monitor reported it.
    QuitRequested,
    /// The monitor was interrupted and its output ended.
    SignalTerminated,
}

impl fmt::Display for DebuggerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WaitingForDebugger => f.write_str("WAITING_FOR_DEBUGGER"),
            Self::Connected => f.write_str("CONNECTED"),
            Self::BreakpointSet(n) => write!(f, "BREAKPOINT_SET({n})"),
            Self::BreakpointHit(n) => write!(f, "BREAKPOINT_HIT({n})"),
            Self::Resumed => f.write_str("RESUMED"),
            Self::ExitedNormally => f.write_str("EXITED_NORMALLY"),
            Self::QuitRequested => f.write_str("QUIT_REQUESTED"),
            Self::SignalTerminated => f.write_str("SIGNAL_TERMINATED"),
        }
    }
}

/// How the scenario ends.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Terminal {
    /// Continue until the guest exits, then quit the debugger.
    #[default]
    ExitNormally,
    /// Quit the debugger, confirm, and expect the monitor to follow.
    Quit,
    /// Continue, then interrupt the monitor.
    Interrupt,
}

impl Terminal {
    /// Exit results accepted from the monitor when nothing else is stated.
    #[must_use]
    pub fn default_exit_class(self) -> ExitCodeClass {
        match self {
            Self::ExitNormally => ExitCodeClass::success(),
            Self::Quit => ExitCodeClass::codes([1]),
            Self::Interrupt => ExitCodeClass::signaled_only(),
        }
    }
}

/// Which process an [`Exchange`] talks to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    /// The monitor.
    Monitor,
    /// The debugger client.
    #[default]
    Debugger,
}

/// A send and/or expect performed while stopped at a breakpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
    /// Target process.
    #[serde(default)]
    pub on: Side,
    /// Line to send first.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub send: Option<String>,
    /// Pattern to wait for afterwards.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<Pattern>,
}

impl Exchange {
    /// Send a debugger command and wait for its answer.
    #[must_use]
    pub fn command(send: impl Into<String>, expect: impl Into<Pattern>) -> Self {
        Self {
            on: Side::Debugger,
            send: Some(send.into()),
            expect: Some(expect.into()),
        }
    }
}

/// A breakpoint to set, reach, and inspect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Breakpoint {
    /// Location as the debugger understands it (`solo5_app_main`,
    /// `test_hello.c:12`).
    pub location: String,
    /// Exchanges performed once stopped there.
    #[serde(default)]
    pub then: Vec<Exchange>,
}

impl Breakpoint {
    /// A breakpoint with no follow-up exchanges.
    #[must_use]
    pub fn at(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            then: Vec::new(),
        }
    }

    /// Add an exchange.
    #[must_use]
    pub fn then(mut self, exchange: Exchange) -> Self {
        self.then.push(exchange);
        self
    }
}

/// Output markers and commands of the monitor and debugger.
///
/// Defaults match the solo5 monitor's gdb stub and GNU gdb.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DebuggerMarkers {
    /// Monitor: stub is listening.
    pub waiting: Pattern,
    /// Monitor: a client connected.
    pub connected: Pattern,
    /// Debugger: attached to the remote target.
    pub attached: Pattern,
    /// Debugger: prefix of breakpoint acknowledgements and stops, followed
    /// by the breakpoint number.
    pub breakpoint: String,
    /// Debugger: the inferior exited normally.
    pub exited_normally: Pattern,
    /// Debugger: confirmation prompt after `quit`.
    pub quit_prompt: Pattern,
    /// Monitor: acknowledges the debugger's quit.
    pub quit_reported: Pattern,
    /// Monitor: printed on interrupt, if it prints anything.
    pub interrupted: Option<Pattern>,
    /// Debugger command that resumes execution.
    pub continue_command: String,
    /// Debugger command that quits.
    pub quit_command: String,
    /// Answer to the quit prompt.
    pub confirm: String,
}

impl Default for DebuggerMarkers {
    fn default() -> Self {
        Self {
            waiting: Pattern::literal("Waiting for a debugger"),
            connected: Pattern::literal("Connection from debugger at 127.0.0.1"),
            attached: Pattern::literal("Remote debugging using localhost"),
            breakpoint: "Breakpoint".to_string(),
            exited_normally: Pattern::literal("exited normally"),
            quit_prompt: Pattern::literal("Quit anyway?"),
            quit_reported: Pattern::literal("Debugger asked us to quit"),
            interrupted: None,
            continue_command: "c".to_string(),
            quit_command: "quit".to_string(),
            confirm: "y".to_string(),
        }
    }
}

/// A monitor plus a remote debugger client, driven through the state
/// machine described in the module docs.
#[derive(Debug, Clone)]
pub struct DebuggerScenario {
    /// The monitor, started with its debug stub enabled.
    pub monitor: SessionConfig,
    /// The debugger client, pointed at the stub.
    pub debugger: SessionConfig,
    /// Markers and commands.
    pub markers: DebuggerMarkers,
    /// Breakpoints visited in order.
    pub breakpoints: Vec<Breakpoint>,
    /// Patterns the monitor prints after the final resume (guest output).
    pub monitor_output: Vec<Pattern>,
    /// How the scenario ends.
    pub terminal: Terminal,
    /// Exit results accepted from the monitor; see
    /// [`Terminal::default_exit_class`].
    pub exit: Option<ExitCodeClass>,
}

impl DebuggerScenario {
    /// A scenario with default markers that continues to a normal exit.
    #[must_use]
    pub fn new(monitor: SessionConfig, debugger: SessionConfig) -> Self {
        Self {
            monitor,
            debugger,
            markers: DebuggerMarkers::default(),
            breakpoints: Vec::new(),
            monitor_output: Vec::new(),
            terminal: Terminal::default(),
            exit: None,
        }
    }

    /// Set the terminal state.
    #[must_use]
    pub const fn terminal(mut self, terminal: Terminal) -> Self {
        self.terminal = terminal;
        self
    }

    /// Add a breakpoint.
    #[must_use]
    pub fn breakpoint(mut self, breakpoint: Breakpoint) -> Self {
        self.breakpoints.push(breakpoint);
        self
    }

    /// Expect `pattern` on the monitor after the final resume.
    #[must_use]
    pub fn monitor_prints(mut self, pattern: impl Into<Pattern>) -> Self {
        self.monitor_output.push(pattern.into());
        self
    }

    async fn drive(&self, ctx: &mut ScenarioContext) -> Result<()> {
        let m = &self.markers;

        let monitor = ctx.open_named(MONITOR, self.monitor.clone()).await?;
        ctx.session(monitor)?.expect(&m.waiting).await?;
        enter(ctx, DebuggerState::WaitingForDebugger);

        let debugger = ctx.open_named(DEBUGGER, self.debugger.clone()).await?;
        ctx.session(monitor)?.expect(&m.connected).await?;
        ctx.session(debugger)?.expect(&m.attached).await?;
        enter(ctx, DebuggerState::Connected);

        for (number, bp) in (1u32..).zip(&self.breakpoints) {
            let marker = Pattern::literal(format!("{} {number}", m.breakpoint));

            let gdb = ctx.session(debugger)?;
            gdb.send_line(&format!("break {}", bp.location)).await?;
            gdb.expect(&marker).await?;
            enter(ctx, DebuggerState::BreakpointSet(number));

            let gdb = ctx.session(debugger)?;
            gdb.send_line(&m.continue_command).await?;
            gdb.expect(&marker).await?;
            enter(ctx, DebuggerState::BreakpointHit(number));

            for exchange in &bp.then {
                let id = match exchange.on {
                    Side::Monitor => monitor,
                    Side::Debugger => debugger,
                };
                let session = ctx.session(id)?;
                if let Some(line) = &exchange.send {
                    session.send_line(line).await?;
                }
                if let Some(pattern) = &exchange.expect {
                    session.expect(pattern).await?;
                }
            }
        }

        let class = ctx.resolve_exit_class(self.exit.as_ref(), || {
            self.terminal.default_exit_class()
        });

        match self.terminal {
            Terminal::Quit => self.quit(ctx, monitor, debugger, &class).await,
            Terminal::ExitNormally => {
                self.resume(ctx, monitor, debugger).await?;
                let gdb = ctx.session(debugger)?;
                gdb.expect(&m.exited_normally).await?;
                enter(ctx, DebuggerState::ExitedNormally);

                ctx.session(debugger)?.send_line(&m.quit_command).await?;
                let mon = ctx.session(monitor)?;
                let timeout = mon.config().timeout.expect;
                mon.expect_exit(&class, timeout).await?;
                Ok(())
            }
            Terminal::Interrupt => {
                self.resume(ctx, monitor, debugger).await?;
                let mon = ctx.session(monitor)?;
                mon.signal(Signal::Interrupt)?;
                if let Some(marker) = &m.interrupted {
                    mon.expect(marker).await?;
                }
                let timeout = mon.config().timeout.expect;
                let status = mon.expect_eof(timeout).await?;
                if !class.accepts(status) {
                    return Err(ExpectError::ExitCode {
                        session: mon.label().to_string(),
                        status,
                        expected: class,
                    });
                }
                enter(ctx, DebuggerState::SignalTerminated);
                Ok(())
            }
        }
    }

    async fn resume(&self, ctx: &mut ScenarioContext, monitor: SessionId, debugger: SessionId) -> Result<()> {
        ctx.session(debugger)?
            .send_line(&self.markers.continue_command)
            .await?;
        enter(ctx, DebuggerState::Resumed);

        let mon = ctx.session(monitor)?;
        for pattern in &self.monitor_output {
            mon.expect(pattern).await?;
        }
        Ok(())
    }

    async fn quit(
        &self,
        ctx: &mut ScenarioContext,
        monitor: SessionId,
        debugger: SessionId,
        class: &ExitCodeClass,
    ) -> Result<()> {
        let m = &self.markers;
        let gdb = ctx.session(debugger)?;
        gdb.send_line(&m.quit_command).await?;
        gdb.expect(&m.quit_prompt).await?;
        gdb.send_line(&m.confirm).await?;

        let mon = ctx.session(monitor)?;
        mon.expect(&m.quit_reported).await?;
        enter(ctx, DebuggerState::QuitRequested);

        let mon = ctx.session(monitor)?;
        let timeout = mon.config().timeout.expect;
        mon.expect_exit(class, timeout).await?;
        Ok(())
    }
}

fn enter(ctx: &mut ScenarioContext, state: DebuggerState) {
    ctx.set_stage(state.to_string());
}

impl Scenario for DebuggerScenario {
    fn run<'a>(&'a self, ctx: &'a mut ScenarioContext) -> BoxFuture<'a, Result<()>> {
        Box::pin(self.drive(ctx))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names() {
        assert_eq!(DebuggerState::WaitingForDebugger.to_string(), "WAITING_FOR_DEBUGGER");
        assert_eq!(DebuggerState::BreakpointHit(2).to_string(), "BREAKPOINT_HIT(2)");
    }

    #[test]
    fn terminal_exit_classes() {
        assert_eq!(Terminal::ExitNormally.default_exit_class(), ExitCodeClass::success());
        assert!(Terminal::Interrupt.default_exit_class().signaled);
        assert!(Terminal::Quit.default_exit_class().accepts(crate::ExitStatus::Exited(1)));
    }

    #[test]
    fn markers_deserialize_partially() {
        let markers: DebuggerMarkers =
            serde_json::from_str(r#"{"quit_prompt": {"regex": "Quit anyway\\? \\(y or n\\)"}}"#)
                .expect("parse");
        assert!(matches!(markers.quit_prompt, Pattern::Regex(_)));
        assert_eq!(markers.waiting, Pattern::literal("Waiting for a debugger"));
    }

    #[test]
    fn breakpoints_deserialize() {
        let bp: Breakpoint = serde_json::from_str(
            r#"{"location": "solo5_app_main", "then": [
                {"send": "info local", "expect": "len ="},
                {"on": "monitor", "expect": "Hello"}
            ]}"#,
        )
        .expect("parse");
        assert_eq!(bp.then.len(), 2);
        assert_eq!(bp.then[0], Exchange::command("info local", "len ="));
        assert_eq!(bp.then[1].on, Side::Monitor);
    }
}
