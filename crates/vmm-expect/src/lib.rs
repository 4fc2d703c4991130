//! vmm-expect: expectation-driven orchestration of monitor processes.
//!
//! The crate drives a unikernel monitor (and its collaborators: a debugger
//! client, a traffic generator) as external processes and asserts that
//! their output and exit codes follow an expected sequence within time
//! bounds.
//!
//! Layers, bottom-up:
//!
//! - [`LineChannel`]: one spawned process, line-oriented writes, output
//!   drained continuously by a background reader task.
//! - [`expect`](mod@expect): incremental matching of literal, regex and
//!   any-of [`Pattern`]s against an [`OutputBuffer`] under a [`Deadline`].
//! - [`Session`]: process lifecycle, expectations with a recovery policy,
//!   idempotent close.
//! - [`Scenario`]: scripted steps over several sessions, including the
//!   [`DebuggerScenario`] state machine.
//! - [`Runner`]: runs a catalog of scenarios and turns them into
//!   [`Verdict`]s and a process exit code.
//!
//! # Example
//!
//! ```ignore
//! use vmm_expect::prelude::*;
//!
//! let mut monitor = Session::open("ukvm-bin --net=tap100 test_ping_serve.ukvm",
//!     Duration::from_secs(3)).await?;
//! monitor.expect("Serving ping on 10.0.0.2").await?;
//! let mut ping = Session::open("ping -c 10 -i 0.2 10.0.0.2", Duration::from_secs(3)).await?;
//! ping.expect("64 bytes from 10.0.0.2: icmp_seq=10").await?;
//! monitor.close().await?;
//! ```

// Lets the macros' `::vmm_expect::` paths resolve inside this crate too.
extern crate self as vmm_expect;

pub use vmm_expect_macros::{any_of, regex};

pub mod channel;
pub mod config;
pub mod error;
pub mod expect;
pub mod prelude;
pub mod runner;
pub mod scenario;
pub mod session;
pub mod types;
pub mod util;
pub mod verdict;

pub use channel::{LineChannel, StreamState};
pub use config::{
    EnvConfig, LineEnding, SessionConfig, TimeoutConfig, Transport, DEFAULT_EXPECT_TIMEOUT,
};
pub use error::{ExpectError, FailureReason, Result, SpawnError};
pub use expect::{
    CompiledPattern, ExpectOutcome, OutputBuffer, OutputSource, Pattern, expect_pattern,
};
pub use runner::{Interrupt, Runner, RunnerConfig, ScenarioEntry, ScenarioOptions};
pub use scenario::{
    Breakpoint, Cleanup, DebuggerMarkers, DebuggerScenario, DebuggerState, Exchange, Scenario,
    ScenarioContext, ScriptScenario, Side, Step, Terminal,
};
pub use session::{CommandLine, RecoveryPolicy, Session, SessionBuilder};
pub use types::{ControlChar, ExitCodeClass, ExitStatus, Match, SessionId, SessionState, Signal};
pub use util::Deadline;
pub use verdict::{FailureDetail, Outcome, Report, Verdict};

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
