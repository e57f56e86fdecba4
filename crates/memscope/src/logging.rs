//! Tracing subscriber setup.
//!
//! Logs go to stderr so stdout stays free for whatever the host prints.
//! `RUST_LOG` wins over the configured filter.

use crate::error::{Error, Result};
use tracing_subscriber::EnvFilter;

fn filter(default_filter: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter))
}

/// Install the global subscriber. Panics if one is already installed.
pub fn init_tracing(default_filter: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_writer(std::io::stderr)
        .init();
}

/// Like [`init_tracing`], but reports an already-installed subscriber as an error.
pub fn try_init_tracing(default_filter: &str) -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(filter(default_filter))
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| Error::Logging(e.to_string()))
}
