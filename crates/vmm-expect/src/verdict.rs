//! Verdicts and run reports.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ExpectError;
use crate::util::secs;

/// Result class of one scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    /// Every expectation was met.
    Pass,
    /// An expectation, exit-code check or the overall deadline failed.
    Fail,
    /// The scenario could not run properly: spawn failure, I/O error,
    /// panic, interruption.
    Error,
    /// A requirement such as root privilege was not met.
    Skipped,
}

impl Outcome {
    /// Whether this outcome lets the run succeed.
    #[must_use]
    pub const fn is_success(self) -> bool {
        matches!(self, Self::Pass | Self::Skipped)
    }

    /// Classify the error a scenario returned.
    #[must_use]
    pub fn of_error(err: &ExpectError) -> Self {
        match err {
            ExpectError::ExpectationFailed { .. }
            | ExpectError::ExitCode { .. }
            | ExpectError::ScenarioTimeout { .. } => Self::Fail,
            ExpectError::Privilege { .. } => Self::Skipped,
            _ => Self::Error,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Error => "ERROR",
            Self::Skipped => "SKIP",
        };
        f.pad(s)
    }
}

/// Why a scenario did not pass.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FailureDetail {
    /// Human-readable message.
    pub message: String,
    /// Session the failure happened on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session: Option<String>,
    /// Pattern that was being waited for.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    /// Bounded tail of unmatched output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tail: Option<String>,
    /// How long the failing wait lasted.
    #[serde(default, with = "secs::option", skip_serializing_if = "Option::is_none")]
    pub elapsed: Option<Duration>,
    /// Last stage the scenario recorded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage: Option<String>,
}

impl FailureDetail {
    /// A detail with only a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }

    /// Extract the structured parts of `err`.
    #[must_use]
    pub fn from_error(err: &ExpectError, stage: Option<&str>) -> Self {
        let mut detail = Self::message(err.to_string());
        detail.stage = stage.map(str::to_string);
        match err {
            ExpectError::ExpectationFailed {
                session,
                pattern,
                tail,
                elapsed,
                reason,
            } => {
                detail.message = format!("{reason} waiting for {pattern}");
                detail.session = Some(session.clone());
                detail.pattern = Some(pattern.clone());
                detail.tail = Some(tail.clone());
                detail.elapsed = Some(*elapsed);
            }
            ExpectError::ExitCode { session, .. } => {
                detail.session = Some(session.clone());
            }
            ExpectError::ScenarioTimeout { timeout } => {
                detail.elapsed = Some(*timeout);
            }
            _ => {}
        }
        detail
    }
}

impl fmt::Display for FailureDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(session) = &self.session {
            write!(f, "[{session}] ")?;
        }
        f.write_str(&self.message)?;
        if let Some(elapsed) = self.elapsed {
            write!(f, " (after {elapsed:.2?})")?;
        }
        if let Some(stage) = &self.stage {
            write!(f, "\n  stage: {stage}")?;
        }
        if let Some(tail) = &self.tail {
            write!(f, "\n  {}", crate::error::format_buffer_snippet(tail).replace('\n', "\n  "))?;
        }
        Ok(())
    }
}

/// The result of one scenario.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verdict {
    /// Scenario name.
    pub scenario: String,
    /// Result class.
    pub outcome: Outcome,
    /// Why it did not pass.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<FailureDetail>,
    /// Wall-clock time the scenario took, cleanup included.
    #[serde(with = "secs")]
    pub duration: Duration,
}

impl Verdict {
    /// A passing verdict.
    #[must_use]
    pub fn pass(scenario: impl Into<String>, duration: Duration) -> Self {
        Self {
            scenario: scenario.into(),
            outcome: Outcome::Pass,
            detail: None,
            duration,
        }
    }

    /// A skipped verdict with a reason.
    #[must_use]
    pub fn skipped(scenario: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            scenario: scenario.into(),
            outcome: Outcome::Skipped,
            detail: Some(FailureDetail::message(reason)),
            duration: Duration::ZERO,
        }
    }

    /// The verdict for a scenario that returned `err`.
    #[must_use]
    pub fn from_error(
        scenario: impl Into<String>,
        err: &ExpectError,
        stage: Option<&str>,
        duration: Duration,
    ) -> Self {
        Self {
            scenario: scenario.into(),
            outcome: Outcome::of_error(err),
            detail: Some(FailureDetail::from_error(err, stage)),
            duration,
        }
    }

    /// Whether the verdict lets the run succeed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.outcome.is_success()
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<5} {} ({:.2?})", self.outcome, self.scenario, self.duration)?;
        if let Some(detail) = &self.detail {
            write!(f, "\n      {}", detail.to_string().replace('\n', "\n      "))?;
        }
        Ok(())
    }
}

/// All verdicts of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Report {
    /// Verdicts in execution order.
    pub verdicts: Vec<Verdict>,
    /// Total wall-clock time.
    #[serde(with = "secs")]
    pub duration: Duration,
}

impl Report {
    /// Number of verdicts with `outcome`.
    #[must_use]
    pub fn count(&self, outcome: Outcome) -> usize {
        self.verdicts.iter().filter(|v| v.outcome == outcome).count()
    }

    /// Whether every verdict passed or was skipped.
    #[must_use]
    pub fn success(&self) -> bool {
        self.verdicts.iter().all(Verdict::is_success)
    }

    /// Process exit code for the run: 0 on success, 1 otherwise.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        i32::from(!self.success())
    }

    /// Look up a verdict by scenario name.
    #[must_use]
    pub fn verdict(&self, scenario: &str) -> Option<&Verdict> {
        self.verdicts.iter().find(|v| v.scenario == scenario)
    }

    /// One-line summary.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "{} passed, {} failed, {} errors, {} skipped in {:.2?}",
            self.count(Outcome::Pass),
            self.count(Outcome::Fail),
            self.count(Outcome::Error),
            self.count(Outcome::Skipped),
            self.duration
        )
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for verdict in &self.verdicts {
            writeln!(f, "{verdict}")?;
        }
        write!(f, "{}", self.summary())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{FailureReason, SpawnError};

    fn expectation_failed() -> ExpectError {
        ExpectError::ExpectationFailed {
            session: "ukvm-bin".into(),
            pattern: "'SUCCESS'".into(),
            tail: "Serving ping on 10.0.0.2\n".into(),
            elapsed: Duration::from_secs(3),
            reason: FailureReason::Timeout,
        }
    }

    #[test]
    fn error_classification() {
        assert_eq!(Outcome::of_error(&expectation_failed()), Outcome::Fail);
        assert_eq!(
            Outcome::of_error(&ExpectError::Spawn(SpawnError::CommandNotFound {
                command: "ukvm-bin".into()
            })),
            Outcome::Error
        );
        assert_eq!(
            Outcome::of_error(&ExpectError::Privilege {
                message: "root".into()
            }),
            Outcome::Skipped
        );
        assert_eq!(
            Outcome::of_error(&ExpectError::ScenarioTimeout {
                timeout: Duration::from_secs(1)
            }),
            Outcome::Fail
        );
        assert_eq!(
            Outcome::of_error(&ExpectError::Panicked {
                message: "boom".into()
            }),
            Outcome::Error
        );
    }

    #[test]
    fn detail_carries_pattern_tail_and_stage() {
        let v = Verdict::from_error(
            "ping_serve",
            &expectation_failed(),
            Some("step 2 expect [main]"),
            Duration::from_secs(4),
        );
        let detail = v.detail.as_ref().expect("detail");
        assert_eq!(detail.pattern.as_deref(), Some("'SUCCESS'"));
        assert_eq!(detail.elapsed, Some(Duration::from_secs(3)));
        assert_eq!(detail.stage.as_deref(), Some("step 2 expect [main]"));
        let text = v.to_string();
        assert!(text.starts_with("FAIL  ping_serve"));
        assert!(text.contains("Serving ping"));
    }

    #[test]
    fn report_exit_code() {
        let mut report = Report::default();
        report.verdicts.push(Verdict::pass("hello", Duration::from_millis(10)));
        report.verdicts.push(Verdict::skipped("flood", "requires root"));
        assert_eq!(report.exit_code(), 0);

        report.verdicts.push(Verdict::from_error(
            "no_tap",
            &expectation_failed(),
            None,
            Duration::ZERO,
        ));
        assert_eq!(report.exit_code(), 1);
        assert_eq!(report.count(Outcome::Fail), 1);
        assert!(report.summary().starts_with("1 passed, 1 failed, 0 errors, 1 skipped"));
    }

    #[test]
    fn report_json_shape() {
        let mut report = Report::default();
        report.verdicts.push(Verdict::pass("hello", Duration::from_millis(500)));
        let json = serde_json::to_value(&report).expect("serialize");
        assert_eq!(json["verdicts"][0]["outcome"], "pass");
        assert_eq!(json["verdicts"][0]["duration"], 0.5);
    }
}
