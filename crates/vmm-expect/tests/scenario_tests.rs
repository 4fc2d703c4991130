//! Integration tests for scripted and debugger scenarios run through the
//! runner.

mod common;

use std::time::Duration;

use common::{FAKE_DEBUGGER, FAKE_MONITOR, quick_timeouts, scratch, sh};
use tokio::sync::watch;
use vmm_expect::{
    Breakpoint, DebuggerScenario, Exchange, Outcome, Report, Runner, RunnerConfig,
    ScenarioOptions, ScriptScenario, SessionConfig, Terminal,
};

async fn run_one(name: &str, scenario: impl vmm_expect::Scenario + 'static) -> Report {
    run_with(name, scenario, ScenarioOptions::default()).await
}

async fn run_with(
    name: &str,
    scenario: impl vmm_expect::Scenario + 'static,
    options: ScenarioOptions,
) -> Report {
    let mut runner = Runner::new(RunnerConfig {
        timeouts: quick_timeouts(),
        ..RunnerConfig::default()
    });
    runner.add(name, scenario, options);
    let (_tx, rx) = watch::channel(false);
    runner.run(rx).await
}

fn script(toml_text: &str) -> ScriptScenario {
    toml::from_str(toml_text).expect("parse script")
}

fn detail(report: &Report) -> String {
    report.verdicts[0]
        .detail
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_default()
}

#[tokio::test]
async fn script_with_setup_and_teardown() {
    let image = scratch("disk.img");
    let scenario = script(&format!(
        r#"
[[steps]]
op = "run"
command = "/bin/sh -c 'echo blocks > {image}'"

[[steps]]
op = "defer_remove"
path = "{image}"

[[steps]]
op = "spawn"
command = "/bin/sh -c 'cat {image}; echo SUCCESS; exit 83'"
transport = "pipe"

[[steps]]
op = "expect"
pattern = "blocks"

[[steps]]
op = "expect"
pattern = {{ regex = "SUCC?ESS" }}
timeout = 2

[[steps]]
op = "wait_exit"
exit = {{ codes = [0, 2, 83] }}
"#,
        image = image.display()
    ));

    let report = run_one("blk", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));
    assert!(!image.exists(), "deferred removal ran");
}

#[tokio::test]
async fn two_session_script() {
    let scenario = script(
        r#"
[[steps]]
op = "spawn"
command = "/bin/sh -c 'echo \"Serving ping on 10.0.0.2\"; sleep 30'"
transport = "pipe"

[[steps]]
op = "expect"
pattern = "Serving ping on 10.0.0.2"

[[steps]]
op = "spawn"
session = "ping"
command = "/bin/sh -c 'for i in 1 2 3; do echo \"64 bytes from 10.0.0.2: icmp_seq=$i\"; done'"
transport = "pipe"

[[steps]]
op = "expect_sequence"
session = "ping"
patterns = ["icmp_seq=1", "icmp_seq=2", "icmp_seq=3"]

[[steps]]
op = "wait_exit"
session = "ping"
"#,
    );

    let report = run_one("ping_serve", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));
}

#[tokio::test]
async fn failing_step_reports_stage_and_runs_cleanup() {
    let marker = scratch("tap-deleted");
    let scenario = script(&format!(
        r#"
[[steps]]
op = "defer_command"
command = "/bin/sh -c 'touch {marker}'"

[[steps]]
op = "spawn"
command = "/bin/sh -c 'echo \"Could not attach interface: tapxxx\"; exit 1'"
transport = "pipe"

[[steps]]
op = "expect"
pattern = "Serving ping"
"#,
        marker = marker.display()
    ));

    let report = run_one("no_tap_expect_serving", scenario).await;
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.outcome, Outcome::Fail);
    let detail = verdict.detail.as_ref().expect("detail");
    assert_eq!(detail.stage.as_deref(), Some("step 3 expect [main]"));
    assert!(detail.tail.as_deref().is_some_and(|t| t.contains("tapxxx")));
    assert!(marker.exists(), "deferred command ran");
    let _ = std::fs::remove_file(&marker);
}

#[tokio::test]
async fn exit_class_option_applies_to_script_steps() {
    let scenario = script(
        r#"
[[steps]]
op = "spawn"
command = "/bin/sh -c 'echo \"Solo5: solo5_abort() called\"; exit 83'"
transport = "pipe"

[[steps]]
op = "expect_eof"
"#,
    );

    let failing = run_one("abort_default_class", scenario.clone()).await;
    assert_eq!(failing.verdicts[0].outcome, Outcome::Fail);

    let passing = run_with(
        "abort",
        scenario,
        ScenarioOptions {
            exit_codes: Some(vmm_expect::ExitCodeClass::codes([83])),
            ..ScenarioOptions::default()
        },
    )
    .await;
    assert_eq!(passing.verdicts[0].outcome, Outcome::Pass, "{}", detail(&passing));
}

#[tokio::test]
async fn missing_binary_errors_the_scenario() {
    let scenario = script(
        r#"
[[steps]]
op = "spawn"
command = "/nonexistent/ukvm-bin test_hello.ukvm"
"#,
    );
    let report = run_one("hello", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Error);
    assert_eq!(report.exit_code(), 1);
}

fn debugger_pair(hang: bool) -> (SessionConfig, SessionConfig) {
    let flag = scratch("gdb-flag");
    let flag = flag.display().to_string();
    let mut monitor = sh(FAKE_MONITOR).env("FLAG", flag.clone());
    if hang {
        monitor = monitor.env("HANG", "1");
    }
    let debugger = sh(FAKE_DEBUGGER).env("FLAG", flag);
    (monitor, debugger)
}

#[tokio::test]
async fn debugger_quit_path() {
    let (monitor, debugger) = debugger_pair(false);
    let scenario = DebuggerScenario::new(monitor, debugger).terminal(Terminal::Quit);
    let report = run_one("gdb_quit", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));
}

#[tokio::test]
async fn debugger_breakpoints_then_normal_exit() {
    let (monitor, debugger) = debugger_pair(false);
    let scenario = DebuggerScenario::new(monitor, debugger)
        .breakpoint(
            Breakpoint::at("solo5_app_main")
                .then(Exchange::command("info local", "len = 12")),
        )
        .breakpoint(Breakpoint::at("test_hello.c:14"))
        .monitor_prints("Hello, World");
    let report = run_one("gdb_continue", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));
}

#[tokio::test]
async fn debugger_interrupt_path() {
    let (monitor, debugger) = debugger_pair(true);
    let scenario = DebuggerScenario::new(monitor, debugger)
        .terminal(Terminal::Interrupt)
        .monitor_prints("Hello, World");
    let report = run_one("gdb_ctrl_c", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));
}

#[tokio::test]
async fn debugger_missing_marker_fails_in_its_state() {
    let (monitor, debugger) = debugger_pair(false);
    let mut scenario = DebuggerScenario::new(monitor, debugger).terminal(Terminal::Quit);
    scenario.markers.quit_reported = "Debugger asked us to leave".into();
    scenario.monitor.timeout.expect = Duration::from_millis(500);

    let report = run_one("gdb_quit_wrong_marker", scenario).await;
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(
        verdict.detail.as_ref().and_then(|d| d.stage.as_deref()),
        Some("CONNECTED")
    );
}

#[tokio::test]
async fn debugger_quit_after_breakpoint_skips_resume() {
    let (monitor, debugger) = debugger_pair(false);
    let scenario = DebuggerScenario::new(monitor, debugger)
        .terminal(Terminal::Quit)
        .breakpoint(Breakpoint::at("solo5_app_main"));
    let report = run_one("gdb_quit_at_break", scenario).await;
    assert_eq!(report.verdicts[0].outcome, Outcome::Pass, "{}", detail(&report));

    // A missing quit marker fails while still stopped at the breakpoint.
    let (monitor, debugger) = debugger_pair(false);
    let mut scenario = DebuggerScenario::new(monitor, debugger)
        .terminal(Terminal::Quit)
        .breakpoint(Breakpoint::at("solo5_app_main"));
    scenario.markers.quit_reported = "Debugger asked us to leave".into();
    scenario.monitor.timeout.expect = Duration::from_millis(500);
    let report = run_one("gdb_quit_at_break_wrong_marker", scenario).await;
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.outcome, Outcome::Fail);
    assert_eq!(
        verdict.detail.as_ref().and_then(|d| d.stage.as_deref()),
        Some("BREAKPOINT_HIT(1)")
    );
}

#[tokio::test]
async fn debugger_spawn_failure_is_an_error() {
    let (monitor, _) = debugger_pair(false);
    let scenario = DebuggerScenario::new(monitor, SessionConfig::new("/nonexistent/gdb"));
    let report = run_one("gdb_missing", scenario).await;
    let verdict = &report.verdicts[0];
    assert_eq!(verdict.outcome, Outcome::Error);
    assert_eq!(
        verdict.detail.as_ref().and_then(|d| d.stage.as_deref()),
        Some("WAITING_FOR_DEBUGGER")
    );
}
