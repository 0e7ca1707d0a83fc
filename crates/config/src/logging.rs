//! Logging setup for the tilde CLI
//!
//! Terminal output is compact and goes to stderr. An optional log file gets
//! everything at debug level, appended.

use crate::{Error, Result};
use std::path::Path;
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const CRATES: [&str; 6] = [
    "tilde",
    "tilde_engine",
    "tilde_crypto",
    "tilde_template",
    "tilde_config",
    "tilde_core",
];

fn default_filter(level: &str) -> String {
    CRATES
        .iter()
        .map(|krate| format!("{krate}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// Install the global subscriber
///
/// `RUST_LOG` overrides the default filter, which is `info`, or `debug`
/// when `verbose` is set.
///
/// # Errors
///
/// Returns error if the log file cannot be opened or a subscriber is
/// already installed
pub fn init(verbose: bool, log_file: Option<&Path>) -> Result<()> {
    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter(level)))
        .map_err(|e| Error::Message(format!("invalid log filter: {e}")))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(false)
        .with_line_number(false)
        .without_time()
        .compact()
        .with_filter(env_filter);

    let file_layer = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let filter = EnvFilter::try_new(default_filter("debug"))
                .map_err(|e| Error::Message(format!("invalid log filter: {e}")))?;
            Some(
                fmt::layer()
                    .with_writer(file)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true)
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| Error::Message(format!("cannot install logger: {e}")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::panic)]
    use super::*;
    use serial_test::serial;

    #[test]
    fn test_default_filter_names_every_crate() {
        let filter = default_filter("debug");
        assert!(filter.starts_with("tilde=debug,tilde_engine=debug"));
        assert_eq!(filter.matches("=debug").count(), CRATES.len());
    }

    #[test]
    #[serial]
    fn test_init_writes_log_file_and_installs_once() {
        let temp = tempfile::TempDir::new().unwrap();
        let log = temp.path().join("tilde.log");
        init(true, Some(&log)).unwrap();
        tracing::debug!(path = %log.display(), "Logging initialized");
        assert!(log.exists());
        assert!(init(false, None).is_err());
    }
}
