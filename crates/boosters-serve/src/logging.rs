//! Tracing subscriber setup for the binary.

use thiserror::Error;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

#[derive(Debug, Error)]
#[error("failed to install log subscriber: {0}")]
pub struct LoggingError(#[from] tracing_subscriber::util::TryInitError);

/// Install the global subscriber. Logs go to stderr so stdout stays
/// reserved for command output.
///
/// `RUST_LOG`, when set and valid, takes precedence over `config.level`.
pub fn init(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        subscriber.with(fmt::layer().with_writer(std::io::stderr)).try_init()?;
    }
    Ok(())
}
