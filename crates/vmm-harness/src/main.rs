//! vmm-harness: run unikernel monitor scenarios from a TOML catalog.

use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use vmm_expect::{EnvConfig, Runner, RunnerConfig, TimeoutConfig};

mod catalog;
mod cli;
mod logging;
mod report;

use catalog::Catalog;
use cli::Cli;

/// Exit code when the harness itself could not run.
const EXIT_HARNESS_ERROR: u8 = 2;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(cli.verbose, cli.log_format);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            eprintln!("vmm-harness: {e:#}");
            ExitCode::from(EXIT_HARNESS_ERROR)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut catalog = Catalog::load(&cli.catalog)?;
    catalog.override_vars(cli.vars.iter().cloned());

    let mut timeouts = catalog.defaults.apply(TimeoutConfig::default());
    timeouts = EnvConfig::default().apply(timeouts);
    if let Some(secs) = cli.expect_timeout {
        timeouts.expect = cli::seconds("expect-timeout", secs)?;
    }
    let timeout_override = cli
        .timeout
        .map(|secs| cli::seconds("timeout", secs))
        .transpose()?;

    let mut runner = Runner::new(RunnerConfig {
        timeouts,
        timeout_override,
        skip_privileged: cli.skip_privileged,
        transcripts: cli.transcripts.clone(),
    });
    for entry in catalog.entries(&timeouts)? {
        runner.push(entry);
    }
    let selected = runner
        .select(&cli.select, &cli.tags)
        .context("selecting scenarios")?;

    let mut stdout = std::io::stdout().lock();
    if cli.list {
        report::list(runner.entries(), &mut stdout)?;
        return Ok(ExitCode::SUCCESS);
    }
    drop(stdout);

    tracing::info!(
        catalog = %cli.catalog.display(),
        scenarios = selected,
        ?timeouts,
        "starting run"
    );
    let report = runner.run_until_signalled().await?;

    report::print(&report, &mut std::io::stdout().lock())?;
    if let Some(path) = &cli.report {
        report::write_json(&report, path)?;
    }
    Ok(ExitCode::from(u8::from(!report.success())))
}
