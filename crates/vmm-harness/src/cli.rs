//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

/// Run unikernel monitor scenarios and report their verdicts.
///
/// Exits 0 when every selected scenario passed or was skipped, 1 when any
/// failed or errored, and 2 when the catalog could not be loaded.
#[derive(Debug, Parser)]
#[command(name = "vmm-harness")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Scenario catalog (TOML).
    #[arg(long, short = 'c', env = "VMM_HARNESS_CATALOG", default_value = "catalog/unikernel.toml")]
    pub catalog: PathBuf,

    /// Run only the named scenarios (repeatable).
    #[arg(long = "select", short = 's', value_name = "NAME")]
    pub select: Vec<String>,

    /// Run only scenarios carrying this tag (repeatable).
    #[arg(long = "tag", short = 't', value_name = "TAG")]
    pub tags: Vec<String>,

    /// Override a catalog template variable (repeatable).
    #[arg(long = "var", value_name = "NAME=VALUE", value_parser = parse_var)]
    pub vars: Vec<(String, String)>,

    /// Overall timeout per scenario in seconds, overriding the catalog.
    #[arg(long, value_name = "SECONDS")]
    pub timeout: Option<f64>,

    /// Default expectation timeout in seconds.
    #[arg(long, value_name = "SECONDS")]
    pub expect_timeout: Option<f64>,

    /// Skip scenarios that need root instead of checking the effective
    /// user.
    #[arg(long, env = "VMM_HARNESS_SKIP_PRIVILEGED")]
    pub skip_privileged: bool,

    /// Print the selected scenarios and exit.
    #[arg(long)]
    pub list: bool,

    /// Write per-session transcripts into this directory.
    #[arg(long, value_name = "DIR")]
    pub transcripts: Option<PathBuf>,

    /// Write a JSON report to this file.
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Log output format.
    #[arg(long, value_enum, env = "VMM_HARNESS_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,

    /// More logging (-v, -vv, -vvv).
    #[arg(long, short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Text,
    /// One JSON object per event.
    Json,
}

fn parse_var(s: &str) -> Result<(String, String), String> {
    let (name, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected NAME=VALUE, got '{s}'"))?;
    if name.is_empty() {
        return Err(format!("empty variable name in '{s}'"));
    }
    Ok((name.to_string(), value.to_string()))
}

/// Convert a seconds flag into a duration.
pub fn seconds(flag: &str, secs: f64) -> anyhow::Result<std::time::Duration> {
    std::time::Duration::try_from_secs_f64(secs)
        .map_err(|e| anyhow::anyhow!("invalid --{flag} value {secs}: {e}"))
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_selection_and_vars() {
        let cli = Cli::try_parse_from([
            "vmm-harness",
            "--select",
            "hello",
            "-t",
            "gdb",
            "--var",
            "ukvm=./ukvm-bin",
            "--timeout",
            "30",
            "-vv",
        ])
        .expect("parse");
        assert_eq!(cli.select, ["hello"]);
        assert_eq!(cli.tags, ["gdb"]);
        assert_eq!(cli.vars, [("ukvm".to_string(), "./ukvm-bin".to_string())]);
        assert_eq!(cli.timeout, Some(30.0));
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.log_format, LogFormat::Text);
    }

    #[test]
    fn rejects_malformed_vars() {
        assert!(parse_var("novalue").is_err());
        assert!(parse_var("=x").is_err());
        assert_eq!(
            parse_var("args=a=b").expect("parse"),
            ("args".to_string(), "a=b".to_string())
        );
    }

    #[test]
    fn negative_seconds_are_rejected() {
        assert!(seconds("timeout", -1.0).is_err());
        assert_eq!(
            seconds("timeout", 1.5).expect("valid"),
            std::time::Duration::from_millis(1500)
        );
    }
}
