//! Convenience re-exports for scenario authors.

pub use std::time::Duration;

pub use crate::{
    ExitCodeClass, ExpectError, ExpectOutcome, Match, Outcome, Pattern, RecoveryPolicy, Result,
    Runner, RunnerConfig, Scenario, ScenarioContext, ScenarioEntry, ScenarioOptions, Session,
    SessionBuilder, SessionConfig, Signal, Transport, Verdict, any_of, regex,
};
