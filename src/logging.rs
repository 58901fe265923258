//! Structured logging setup for both binaries.
//!
//! `RUST_LOG` wins over the configured level so a single module can be
//! turned up without touching the deployment flags.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ConfigError;

/// Output format of log lines.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable single lines.
    #[default]
    Text,
    /// One JSON object per line.
    Json,
}

/// Builds the level filter: `RUST_LOG` if set and valid, otherwise `level`.
pub fn build_env_filter(level: &str) -> Result<EnvFilter, ConfigError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(level).map_err(|e| ConfigError::Invalid {
        setting: "log-level",
        reason: e.to_string(),
    })
}

/// Installs the global subscriber, writing to stderr.
pub fn init_logging(level: &str, format: LogFormat) -> Result<(), ConfigError> {
    let filter = build_env_filter(level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let res = match format {
        LogFormat::Json => registry
            .with(
                fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
        LogFormat::Text => registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(std::io::stderr),
            )
            .try_init(),
    };
    res.map_err(|e| ConfigError::Invalid {
        setting: "log",
        reason: e.to_string(),
    })
}
