//! The TOML scenario catalog.
//!
//! ```toml
//! [vars]
//! ukvm = "./ukvm-bin"
//! tests = "tests"
//!
//! [defaults]
//! expect_timeout = 3
//!
//! [[scenario]]
//! name = "hello"
//! tags = ["smoke"]
//!
//! [[scenario.steps]]
//! op = "spawn"
//! command = "{ukvm} {tests}/test_hello/test_hello.ukvm"
//!
//! [[scenario.steps]]
//! op = "expect"
//! pattern = "Hello, World"
//! ```
//!
//! Command lines (`spawn`, `run`, `defer_command`, debugger `monitor` and
//! `debugger`) and `defer_remove` paths go through `{var}` substitution;
//! patterns never do, so regex braces need no escaping.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use serde::Deserialize;
use vmm_expect::util::secs;
use vmm_expect::{
    Breakpoint, CommandLine, DebuggerMarkers, DebuggerScenario, ExitCodeClass, Pattern,
    ScenarioEntry, ScenarioOptions, ScriptScenario, SessionConfig, Step, Terminal, TimeoutConfig,
    Transport,
};

/// A parsed catalog file.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Catalog {
    /// Template variables.
    #[serde(default)]
    pub vars: HashMap<String, String>,

    /// Catalog-wide timeouts.
    #[serde(default)]
    pub defaults: Defaults,

    /// Scenarios in run order.
    #[serde(default, rename = "scenario")]
    pub scenarios: Vec<ScenarioSpec>,
}

/// Catalog-wide timeouts, in seconds.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Defaults {
    /// Default expectation timeout.
    #[serde(default, with = "secs::option")]
    pub expect_timeout: Option<Duration>,

    /// Default overall scenario timeout.
    #[serde(default, with = "secs::option")]
    pub scenario_timeout: Option<Duration>,

    /// SIGTERM to SIGKILL grace period.
    #[serde(default, with = "secs::option")]
    pub grace: Option<Duration>,
}

impl Defaults {
    /// Overlay the catalog values onto `timeouts`.
    pub fn apply(&self, mut timeouts: TimeoutConfig) -> TimeoutConfig {
        if let Some(t) = self.expect_timeout {
            timeouts.expect = t;
        }
        if let Some(t) = self.scenario_timeout {
            timeouts.scenario = t;
        }
        if let Some(t) = self.grace {
            timeouts.grace = t;
        }
        timeouts
    }
}

/// Scenario body kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Kind {
    /// Ordered steps.
    #[default]
    Script,
    /// Monitor plus remote debugger.
    Debugger,
}

/// One `[[scenario]]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScenarioSpec {
    /// Unique name.
    pub name: String,

    /// Body kind.
    #[serde(default)]
    pub kind: Kind,

    /// Selection tags.
    #[serde(default)]
    pub tags: Vec<String>,

    /// Needs root.
    #[serde(default)]
    pub requires_root: bool,

    /// Overall timeout in seconds.
    #[serde(default, with = "secs::option")]
    pub timeout: Option<Duration>,

    /// Exit-code class for steps that do not state their own.
    #[serde(default)]
    pub exit_codes: Option<ExitCodeClass>,

    /// Exclusive resources.
    #[serde(default)]
    pub resources: Vec<String>,

    /// May run alongside adjacent parallel-safe scenarios.
    #[serde(default)]
    pub parallel_safe: bool,

    /// Steps of a script scenario.
    #[serde(default)]
    pub steps: Vec<Step>,

    /// Body of a debugger scenario.
    #[serde(default)]
    pub debugger: Option<DebuggerSpec>,
}

/// The `[scenario.debugger]` table.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DebuggerSpec {
    /// Monitor command line, debug stub enabled.
    pub monitor: String,

    /// Debugger command line.
    pub debugger: String,

    /// Monitor transport.
    #[serde(default)]
    pub monitor_transport: Transport,

    /// Debugger transport.
    #[serde(default)]
    pub debugger_transport: Transport,

    /// Expectation timeout of both sessions, in seconds.
    #[serde(default, with = "secs::option")]
    pub expect_timeout: Option<Duration>,

    /// How the scenario ends.
    #[serde(default)]
    pub terminal: Terminal,

    /// Breakpoints in order.
    #[serde(default)]
    pub breakpoints: Vec<Breakpoint>,

    /// Monitor output expected after the final resume.
    #[serde(default)]
    pub monitor_prints: Vec<Pattern>,

    /// Marker overrides.
    #[serde(default)]
    pub markers: DebuggerMarkers,

    /// Accepted monitor exit results.
    #[serde(default)]
    pub exit: Option<ExitCodeClass>,
}

impl Catalog {
    /// Read and parse `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading catalog {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing catalog {}", path.display()))
    }

    /// Parse catalog text.
    pub fn parse(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `--var` overrides.
    pub fn override_vars(&mut self, vars: impl IntoIterator<Item = (String, String)>) {
        self.vars.extend(vars);
    }

    /// Build runner entries, expanding templates.
    ///
    /// `timeouts` supplies session defaults for debugger scenarios.
    pub fn entries(&self, timeouts: &TimeoutConfig) -> Result<Vec<ScenarioEntry>> {
        let mut seen = HashSet::new();
        let mut entries = Vec::with_capacity(self.scenarios.len());
        for spec in &self.scenarios {
            if !seen.insert(spec.name.as_str()) {
                bail!("duplicate scenario name '{}'", spec.name);
            }
            let entry = spec
                .entry(&self.vars, timeouts)
                .with_context(|| format!("scenario '{}'", spec.name))?;
            entries.push(entry);
        }
        Ok(entries)
    }
}

impl ScenarioSpec {
    /// The runner options of this scenario.
    pub fn options(&self) -> ScenarioOptions {
        ScenarioOptions {
            timeout: self.timeout,
            requires_root: self.requires_root,
            exit_codes: self.exit_codes.clone(),
            tags: self.tags.clone(),
            resources: self.resources.clone(),
            parallel_safe: self.parallel_safe,
        }
    }

    fn entry(
        &self,
        vars: &HashMap<String, String>,
        timeouts: &TimeoutConfig,
    ) -> Result<ScenarioEntry> {
        match (self.kind, &self.debugger) {
            (Kind::Script, None) => {
                if self.steps.is_empty() {
                    bail!("script scenario has no steps");
                }
                let steps = self
                    .steps
                    .iter()
                    .map(|step| expand_step(step, vars))
                    .collect::<Result<Vec<_>>>()?;
                Ok(ScenarioEntry::new(
                    &self.name,
                    ScriptScenario::new(steps),
                    self.options(),
                ))
            }
            (Kind::Debugger, Some(spec)) => {
                if !self.steps.is_empty() {
                    bail!("debugger scenario cannot have steps");
                }
                Ok(ScenarioEntry::new(
                    &self.name,
                    spec.scenario(vars, timeouts)?,
                    self.options(),
                ))
            }
            (Kind::Script, Some(_)) => bail!("[scenario.debugger] requires kind = \"debugger\""),
            (Kind::Debugger, None) => bail!("kind = \"debugger\" requires a [scenario.debugger] table"),
        }
    }
}

impl DebuggerSpec {
    fn session(
        &self,
        line: &str,
        transport: Transport,
        vars: &HashMap<String, String>,
        timeouts: &TimeoutConfig,
    ) -> Result<SessionConfig> {
        let mut config = CommandLine::expand(line, vars)?.into_config();
        config.transport = transport;
        config.timeout = *timeouts;
        if let Some(t) = self.expect_timeout {
            config.timeout.expect = t;
        }
        Ok(config)
    }

    fn scenario(
        &self,
        vars: &HashMap<String, String>,
        timeouts: &TimeoutConfig,
    ) -> Result<DebuggerScenario> {
        let monitor = self.session(&self.monitor, self.monitor_transport, vars, timeouts)?;
        let debugger = self.session(&self.debugger, self.debugger_transport, vars, timeouts)?;
        let mut scenario = DebuggerScenario::new(monitor, debugger).terminal(self.terminal);
        scenario.markers = self.markers.clone();
        scenario.breakpoints = self.breakpoints.clone();
        scenario.monitor_output = self.monitor_prints.clone();
        scenario.exit = self.exit.clone();
        Ok(scenario)
    }
}

fn expand_line(line: &str, vars: &HashMap<String, String>) -> Result<String> {
    Ok(CommandLine::expand(line, vars)?.to_string())
}

fn expand_path(path: &Path, vars: &HashMap<String, String>) -> Result<PathBuf> {
    let expanded = CommandLine::expand(&path.to_string_lossy(), vars)?;
    if !expanded.args.is_empty() {
        bail!("path '{}' expands to more than one word", path.display());
    }
    Ok(PathBuf::from(expanded.program))
}

fn expand_step(step: &Step, vars: &HashMap<String, String>) -> Result<Step> {
    let mut step = step.clone();
    match &mut step {
        Step::Spawn { command, .. }
        | Step::Run { command, .. }
        | Step::DeferCommand { command } => *command = expand_line(command, vars)?,
        Step::DeferRemove { path } => *path = expand_path(path, vars)?,
        _ => {}
    }
    Ok(step)
}
