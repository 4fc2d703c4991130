//! Logging setup.
//!
//! `RUST_LOG` wins when set; otherwise the filter follows the `-v` count.
//! Logs go to stderr so the report on stdout stays clean.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use crate::cli::LogFormat;

/// The default filter for a verbosity level.
pub fn default_filter(verbose: u8) -> &'static str {
    match verbose {
        0 => "vmm_harness=info,vmm_expect=warn",
        1 => "vmm_harness=debug,vmm_expect=info",
        2 => "vmm_harness=debug,vmm_expect=debug,vmm_pty=debug",
        _ => "trace",
    }
}

/// Install the global subscriber.
pub fn init(verbose: u8, format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter(verbose).into());

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Text => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}
