//! The scenario runner.
//!
//! Runs an ordered catalog of scenarios, isolates their failures and
//! aggregates a [`Report`]. Each scenario gets a fresh [`ScenarioContext`];
//! whatever the body does (passes, fails, panics, overruns its deadline or
//! is interrupted) the context's sessions are closed and its cleanups run
//! before the verdict is recorded.

mod interrupt;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::Instrument;

pub use interrupt::Interrupt;

use crate::config::TimeoutConfig;
use crate::error::{ExpectError, Result};
use crate::scenario::{Scenario, ScenarioContext};
use crate::types::ExitCodeClass;
use crate::util::secs;
use crate::verdict::{FailureDetail, Outcome, Report, Verdict};

/// Per-scenario run options.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScenarioOptions {
    /// Overall deadline for this scenario; falls back to the runner's.
    #[serde(with = "secs::option", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// The scenario needs root (tap devices, flood ping).
    pub requires_root: bool,

    /// Exit-code class applied to steps that do not state their own.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_codes: Option<ExitCodeClass>,

    /// Free-form tags for selection.
    pub tags: Vec<String>,

    /// Named resources (a tap device, a disk image) the scenario uses
    /// exclusively.
    pub resources: Vec<String>,

    /// May run concurrently with adjacent parallel-safe scenarios.
    pub parallel_safe: bool,
}

impl ScenarioOptions {
    /// Whether the scenario shares an exclusive resource with `other`.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        self.resources.iter().any(|r| other.resources.contains(r))
    }
}

/// One named scenario in the catalog.
#[derive(Clone)]
pub struct ScenarioEntry {
    /// Unique name.
    pub name: String,
    /// The scenario body.
    pub scenario: Arc<dyn Scenario>,
    /// Run options.
    pub options: ScenarioOptions,
}

impl std::fmt::Debug for ScenarioEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScenarioEntry")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

impl ScenarioEntry {
    /// Create an entry.
    pub fn new(
        name: impl Into<String>,
        scenario: impl Scenario + 'static,
        options: ScenarioOptions,
    ) -> Self {
        Self {
            name: name.into(),
            scenario: Arc::new(scenario),
            options,
        }
    }

    /// Whether the entry is selected by `names` or `tags`.
    ///
    /// Empty filters select everything; otherwise a name or tag match is
    /// enough.
    #[must_use]
    pub fn selected_by(&self, names: &[String], tags: &[String]) -> bool {
        if names.is_empty() && tags.is_empty() {
            return true;
        }
        names.iter().any(|n| *n == self.name)
            || tags.iter().any(|t| self.options.tags.contains(t))
    }
}

/// Runner-wide settings.
#[derive(Debug, Clone, Default)]
pub struct RunnerConfig {
    /// Default timeouts handed to every scenario context.
    pub timeouts: TimeoutConfig,

    /// Overall deadline that wins over every per-scenario timeout.
    pub timeout_override: Option<Duration>,

    /// Skip scenarios that require root without checking the effective
    /// user.
    pub skip_privileged: bool,

    /// Directory for per-session transcripts.
    pub transcripts: Option<PathBuf>,
}

/// Runs scenarios and collects their verdicts.
#[derive(Debug, Default)]
pub struct Runner {
    config: RunnerConfig,
    entries: Vec<ScenarioEntry>,
}

impl Runner {
    /// Create an empty runner.
    #[must_use]
    pub const fn new(config: RunnerConfig) -> Self {
        Self {
            config,
            entries: Vec::new(),
        }
    }

    /// Append a scenario.
    pub fn add(
        &mut self,
        name: impl Into<String>,
        scenario: impl Scenario + 'static,
        options: ScenarioOptions,
    ) -> &mut Self {
        self.entries.push(ScenarioEntry::new(name, scenario, options));
        self
    }

    /// Append a prepared entry.
    pub fn push(&mut self, entry: ScenarioEntry) -> &mut Self {
        self.entries.push(entry);
        self
    }

    /// The scenarios in run order.
    #[must_use]
    pub fn entries(&self) -> &[ScenarioEntry] {
        &self.entries
    }

    /// The runner settings.
    #[must_use]
    pub const fn config(&self) -> &RunnerConfig {
        &self.config
    }

    /// Keep only the entries selected by `names` or `tags`.
    ///
    /// Returns an error naming the first requested scenario that does not
    /// exist.
    pub fn select(&mut self, names: &[String], tags: &[String]) -> Result<usize> {
        if let Some(missing) = names
            .iter()
            .find(|n| !self.entries.iter().any(|e| e.name == **n))
        {
            return Err(ExpectError::config(format!("unknown scenario '{missing}'")));
        }
        self.entries.retain(|e| e.selected_by(names, tags));
        Ok(self.entries.len())
    }

    /// Run every entry, stopping early when `cancel` turns `true`.
    ///
    /// The scenario that is running when the run is cancelled is cleaned
    /// up and reported as an error; the ones that never started are
    /// skipped.
    pub async fn run(&self, cancel: watch::Receiver<bool>) -> Report {
        let started = Instant::now();
        let mut verdicts = Vec::with_capacity(self.entries.len());
        let is_root = rustix::process::geteuid().is_root();

        for batch in self.batches() {
            let interrupted = *cancel.borrow();
            if interrupted {
                verdicts.extend(
                    batch
                        .iter()
                        .map(|e| Verdict::skipped(&e.name, "run interrupted")),
                );
                continue;
            }

            if let [entry] = batch.as_slice() {
                verdicts.push(self.run_entry(entry, is_root, cancel.clone()).await);
            } else {
                tracing::debug!(
                    scenarios = ?batch.iter().map(|e| &e.name).collect::<Vec<_>>(),
                    "running batch concurrently"
                );
                let runs = batch
                    .iter()
                    .map(|entry| self.run_entry(entry, is_root, cancel.clone()));
                verdicts.extend(join_all(runs).await);
            }
        }

        let report = Report {
            verdicts,
            duration: started.elapsed(),
        };
        tracing::info!(
            passed = report.count(Outcome::Pass),
            failed = report.count(Outcome::Fail),
            errors = report.count(Outcome::Error),
            skipped = report.count(Outcome::Skipped),
            duration = ?report.duration,
            "run finished"
        );
        report
    }

    /// Run every entry, cancelling on SIGINT or SIGTERM.
    pub async fn run_until_signalled(&self) -> Result<Report> {
        let interrupt = Interrupt::install()?;
        let report = self.run(interrupt.subscribe()).await;
        interrupt.close().await;
        Ok(report)
    }

    /// Group adjacent parallel-safe entries that share no resource.
    fn batches(&self) -> Vec<Vec<&ScenarioEntry>> {
        let mut batches: Vec<Vec<&ScenarioEntry>> = Vec::new();
        for entry in &self.entries {
            let joins = batches.last().is_some_and(|batch| {
                entry.options.parallel_safe
                    && batch.iter().all(|other| {
                        other.options.parallel_safe
                            && !other.options.conflicts_with(&entry.options)
                    })
            });
            match batches.last_mut() {
                Some(batch) if joins => batch.push(entry),
                _ => batches.push(vec![entry]),
            }
        }
        batches
    }

    fn scenario_timeout(&self, options: &ScenarioOptions) -> Duration {
        self.config
            .timeout_override
            .or(options.timeout)
            .unwrap_or(self.config.timeouts.scenario)
    }

    async fn run_entry(
        &self,
        entry: &ScenarioEntry,
        is_root: bool,
        cancel: watch::Receiver<bool>,
    ) -> Verdict {
        if entry.options.requires_root {
            if self.config.skip_privileged {
                tracing::info!(scenario = %entry.name, "skipping privileged scenario");
                return Verdict::skipped(&entry.name, "requires root; privileged scenarios skipped");
            }
            if !is_root {
                let err = ExpectError::Privilege {
                    message: "scenario requires root".into(),
                };
                tracing::warn!(scenario = %entry.name, "not running as root, skipping");
                return Verdict::from_error(&entry.name, &err, None, Duration::ZERO);
            }
        }

        let span = tracing::info_span!("scenario", name = %entry.name);
        self.execute(entry, cancel).instrument(span).await
    }

    async fn execute(&self, entry: &ScenarioEntry, mut cancel: watch::Receiver<bool>) -> Verdict {
        let started = Instant::now();
        let timeout = self.scenario_timeout(&entry.options);

        let mut ctx = ScenarioContext::new(entry.name.clone(), self.config.timeouts)
            .with_exit_class(entry.options.exit_codes.clone());
        if let Some(dir) = &self.config.transcripts {
            ctx = ctx.with_transcripts(dir.clone());
        }

        tracing::info!(timeout = ?timeout, "scenario started");
        let result = {
            let body = AssertUnwindSafe(entry.scenario.run(&mut ctx)).catch_unwind();
            tokio::select! {
                outcome = body => match outcome {
                    Ok(result) => result,
                    Err(payload) => Err(ExpectError::Panicked {
                        message: panic_message(payload.as_ref()),
                    }),
                },
                () = tokio::time::sleep(timeout) => Err(ExpectError::ScenarioTimeout { timeout }),
                () = cancelled(&mut cancel) => Err(ExpectError::Interrupted),
            }
        };

        let cleanup_errors = ctx.close_all().await;
        let duration = started.elapsed();
        let stage = ctx.stage().map(str::to_string);

        let verdict = match (result, cleanup_errors.into_iter().next()) {
            (Ok(()), None) => Verdict::pass(&entry.name, duration),
            (Ok(()), Some(err)) => Verdict {
                scenario: entry.name.clone(),
                outcome: Outcome::Error,
                detail: Some(FailureDetail::from_error(&err, Some("cleanup"))),
                duration,
            },
            (Err(err), _) => Verdict::from_error(&entry.name, &err, stage.as_deref(), duration),
        };

        match verdict.outcome {
            Outcome::Pass => tracing::info!(duration = ?duration, "scenario passed"),
            outcome => tracing::warn!(
                %outcome,
                duration = ?duration,
                detail = %verdict.detail.as_ref().map(ToString::to_string).unwrap_or_default(),
                "scenario did not pass"
            ),
        }
        verdict
    }
}

/// Resolves once `cancel` holds `true`; never if the sender is gone.
async fn cancelled(cancel: &mut watch::Receiver<bool>) {
    loop {
        let set = *cancel.borrow_and_update();
        if set {
            return;
        }
        if cancel.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::scenario::{Cleanup, from_fn};
    use crate::test_utils::sh;

    fn never_cancelled() -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        std::mem::forget(tx);
        rx
    }

    async fn explode(message: &'static str) -> Result<()> {
        panic!("{message}")
    }

    fn quick() -> RunnerConfig {
        RunnerConfig {
            timeouts: TimeoutConfig::new()
                .expect(Duration::from_secs(2))
                .grace(Duration::from_millis(200)),
            ..RunnerConfig::default()
        }
    }

    #[tokio::test]
    async fn failures_are_isolated() {
        let mut runner = Runner::new(quick());
        runner
            .add(
                "hello",
                from_fn(|ctx| {
                    Box::pin(async move {
                        let id = ctx.open(sh("echo 'Hello, World'")).await?;
                        ctx.session(id)?.expect("Hello, World").await?;
                        Ok(())
                    })
                }),
                ScenarioOptions::default(),
            )
            .add(
                "no_tap",
                from_fn(|ctx| {
                    Box::pin(async move {
                        let id = ctx
                            .open(sh("echo 'Could not attach interface: tapxxx'; exit 1"))
                            .await?;
                        ctx.session(id)?.expect("Serving ping").await?;
                        Ok(())
                    })
                }),
                ScenarioOptions::default(),
            )
            .add(
                "missing_binary",
                from_fn(|ctx| {
                    Box::pin(async move {
                        ctx.open(crate::SessionConfig::new("/nonexistent/ukvm-bin"))
                            .await?;
                        Ok(())
                    })
                }),
                ScenarioOptions::default(),
            )
            .add(
                "after",
                from_fn(|_| Box::pin(async { Ok(()) })),
                ScenarioOptions::default(),
            );

        let report = runner.run(never_cancelled()).await;
        let outcomes: Vec<_> = report.verdicts.iter().map(|v| v.outcome).collect();
        assert_eq!(
            outcomes,
            [Outcome::Pass, Outcome::Fail, Outcome::Error, Outcome::Pass]
        );
        assert_eq!(report.exit_code(), 1);
        let detail = report.verdict("no_tap").and_then(|v| v.detail.as_ref());
        assert!(detail.and_then(|d| d.tail.as_deref()).is_some_and(|t| t.contains("tapxxx")));
    }

    #[tokio::test]
    async fn overall_timeout_fails_and_cleans_up() {
        let cleaned = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&cleaned);
        let mut runner = Runner::new(quick());
        runner.add(
            "hangs",
            from_fn(move |ctx| {
                let counter = Arc::clone(&counter);
                Box::pin(async move {
                    ctx.defer(Cleanup::custom(move || async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }));
                    ctx.open(sh("sleep 30")).await?;
                    ctx.set_stage("waiting forever");
                    std::future::pending::<()>().await;
                    Ok(())
                })
            }),
            ScenarioOptions {
                timeout: Some(Duration::from_millis(300)),
                ..ScenarioOptions::default()
            },
        );

        let report = runner.run(never_cancelled()).await;
        let verdict = &report.verdicts[0];
        assert_eq!(verdict.outcome, Outcome::Fail);
        assert_eq!(
            verdict.detail.as_ref().and_then(|d| d.stage.as_deref()),
            Some("waiting forever")
        );
        assert_eq!(cleaned.load(Ordering::SeqCst), 1);
        assert!(verdict.duration < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn panics_become_errors() {
        let mut runner = Runner::new(quick());
        runner.add(
            "panics",
            from_fn(|_| Box::pin(explode("boom"))),
            ScenarioOptions::default(),
        );
        let report = runner.run(never_cancelled()).await;
        assert_eq!(report.verdicts[0].outcome, Outcome::Error);
        assert!(
            report.verdicts[0]
                .detail
                .as_ref()
                .is_some_and(|d| d.message.contains("boom"))
        );
    }

    #[tokio::test]
    async fn privileged_scenarios_are_skipped_on_request() {
        let mut runner = Runner::new(RunnerConfig {
            skip_privileged: true,
            ..quick()
        });
        runner.add(
            "ping_serve_flood",
            from_fn(|_| Box::pin(explode("must not run"))),
            ScenarioOptions {
                requires_root: true,
                ..ScenarioOptions::default()
            },
        );
        let report = runner.run(never_cancelled()).await;
        assert_eq!(report.verdicts[0].outcome, Outcome::Skipped);
        assert_eq!(report.exit_code(), 0);
    }

    #[tokio::test]
    async fn interrupt_skips_the_rest() {
        let (tx, rx) = watch::channel(false);
        let mut runner = Runner::new(quick());
        runner
            .add(
                "long",
                from_fn(|ctx| {
                    Box::pin(async move {
                        ctx.open(sh("sleep 30")).await?;
                        std::future::pending::<()>().await;
                        Ok(())
                    })
                }),
                ScenarioOptions::default(),
            )
            .add(
                "never",
                from_fn(|_| Box::pin(async { Ok(()) })),
                ScenarioOptions::default(),
            );

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let _ = tx.send(true);
        });
        let report = runner.run(rx).await;
        assert_eq!(report.verdicts[0].outcome, Outcome::Error);
        assert_eq!(report.verdicts[1].outcome, Outcome::Skipped);
    }

    #[test]
    fn batches_respect_resources() {
        let noop = || from_fn(|_| Box::pin(async { Ok(()) }));
        let parallel = |resources: &[&str]| ScenarioOptions {
            parallel_safe: true,
            resources: resources.iter().map(|r| (*r).to_string()).collect(),
            ..ScenarioOptions::default()
        };

        let mut runner = Runner::new(RunnerConfig::default());
        runner
            .add("a", noop(), parallel(&["tap100"]))
            .add("b", noop(), parallel(&["tap101"]))
            .add("c", noop(), parallel(&["tap100"]))
            .add("d", noop(), ScenarioOptions::default())
            .add("e", noop(), parallel(&[]));

        let names: Vec<Vec<&str>> = runner
            .batches()
            .iter()
            .map(|b| b.iter().map(|e| e.name.as_str()).collect())
            .collect();
        assert_eq!(names, [vec!["a", "b"], vec!["c"], vec!["d"], vec!["e"]]);
    }

    #[test]
    fn selection_by_name_and_tag() {
        let noop = || from_fn(|_| Box::pin(async { Ok(()) }));
        let tagged = |tag: &str| ScenarioOptions {
            tags: vec![tag.to_string()],
            ..ScenarioOptions::default()
        };

        let mut runner = Runner::new(RunnerConfig::default());
        runner
            .add("hello", noop(), tagged("smoke"))
            .add("ping_serve", noop(), tagged("net"))
            .add("gdb_quit", noop(), tagged("gdb"));

        assert_eq!(
            runner
                .select(&["hello".to_string()], &["gdb".to_string()])
                .expect("select"),
            2
        );
        assert!(runner.select(&["blk".to_string()], &[]).is_err());
    }

    #[test]
    fn timeout_precedence() {
        let runner = Runner::new(RunnerConfig {
            timeouts: TimeoutConfig::new().scenario(Duration::from_secs(120)),
            ..RunnerConfig::default()
        });
        let own = ScenarioOptions {
            timeout: Some(Duration::from_secs(5)),
            ..ScenarioOptions::default()
        };
        assert_eq!(runner.scenario_timeout(&own), Duration::from_secs(5));
        assert_eq!(
            runner.scenario_timeout(&ScenarioOptions::default()),
            Duration::from_secs(120)
        );

        let overridden = Runner::new(RunnerConfig {
            timeout_override: Some(Duration::from_secs(1)),
            ..RunnerConfig::default()
        });
        assert_eq!(overridden.scenario_timeout(&own), Duration::from_secs(1));
    }
}
