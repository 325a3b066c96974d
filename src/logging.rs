//! Tracing subscriber setup. Logs go to stderr so command output on stdout
//! stays machine-readable.

use anyhow::{Result, anyhow};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LogOptions {
    pub verbose: bool,
    pub json: bool,
}

/// `RUST_LOG` wins when set; otherwise `debug` for our crate under
/// `--verbose`, `info` without.
pub fn env_filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)))
}

fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,issue_assistant=debug"
    } else {
        "info"
    }
}

pub fn init(options: LogOptions) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(options.verbose))
        .with_writer(std::io::stderr)
        .with_target(options.verbose);

    let installed = if options.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("Failed to install tracing subscriber: {}", e))
}
