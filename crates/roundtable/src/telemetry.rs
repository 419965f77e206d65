//! Log subscriber setup.
//!
//! Logs go to stderr so they never interleave with the transcript on stdout.
//! `RUST_LOG` controls verbosity (default `info`).

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str = "info";

pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into()),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
