//! # Watchdog configuration.
//!
//! Loaded with the `config` crate, lowest to highest priority:
//! 1. Defaults (hardcoded below)
//! 2. Optional TOML file (`--config`)
//! 3. `WATCHDOG__*` environment variables (`__` separates nesting levels)
//!
//! ```toml
//! framework_name = "mongodb-replicaset"
//! poll_interval_ms = 5000
//! exit_policy = "prune"
//!
//! [[replsets]]
//! name = "rs0"
//! members = [{ host = "rs0-0.mongo", port = 27017 }]
//! ```

use std::path::Path;
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::ConfigError;
use crate::policies::{BackoffPolicy, JitterPolicy};
use crate::replset::Replset;

use super::DEFAULT_FRAMEWORK_NAME;

/// What the manager does with a watcher entry once its task has terminated.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExitPolicy {
    /// Keep the terminated entry; the name stays "watched" until removed explicitly.
    Retain,
    /// Drop the entry so a later `watch` starts a fresh watcher.
    #[default]
    Prune,
}

/// Backoff applied between polls after consecutive failures.
#[derive(Clone, Copy, Debug, Deserialize)]
pub struct PollBackoffConfig {
    #[serde(default = "default_backoff_first_ms")]
    pub first_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    pub max_ms: u64,
    #[serde(default = "default_backoff_factor")]
    pub factor: f64,
    #[serde(default)]
    pub jitter: JitterPolicy,
}

impl Default for PollBackoffConfig {
    fn default() -> Self {
        Self {
            first_ms: default_backoff_first_ms(),
            max_ms: default_backoff_max_ms(),
            factor: default_backoff_factor(),
            jitter: JitterPolicy::Equal,
        }
    }
}

impl PollBackoffConfig {
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            first: Duration::from_millis(self.first_ms),
            max: Duration::from_millis(self.max_ms),
            factor: self.factor,
            jitter: self.jitter,
        }
    }
}

/// Cluster-central watchdog settings.
#[derive(Clone, Debug, Deserialize)]
pub struct WatchdogConfig {
    /// Deployment/cluster identifier.
    #[serde(default = "default_framework_name")]
    pub framework_name: String,

    /// Delay between two successful polls of one replset.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Upper bound for a single poll.
    #[serde(default = "default_poll_timeout_ms")]
    pub poll_timeout_ms: u64,

    /// Consecutive failed polls before a watcher gives up (`0` = never).
    #[serde(default = "default_max_poll_failures")]
    pub max_poll_failures: u32,

    /// Delay growth between failed polls.
    #[serde(default)]
    pub poll_backoff: PollBackoffConfig,

    /// Handling of terminated watcher entries.
    #[serde(default)]
    pub exit_policy: ExitPolicy,

    /// How long `stop_all` waits for watchers to finish.
    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,

    /// Capacity of the watcher event bus.
    #[serde(default = "default_bus_capacity")]
    pub bus_capacity: usize,

    /// Replsets registered at startup.
    #[serde(default)]
    pub replsets: Vec<Replset>,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            framework_name: default_framework_name(),
            poll_interval_ms: default_poll_interval_ms(),
            poll_timeout_ms: default_poll_timeout_ms(),
            max_poll_failures: default_max_poll_failures(),
            poll_backoff: PollBackoffConfig::default(),
            exit_policy: ExitPolicy::default(),
            shutdown_grace_ms: default_shutdown_grace_ms(),
            bus_capacity: default_bus_capacity(),
            replsets: Vec::new(),
        }
    }
}

impl WatchdogConfig {
    /// Loads defaults, then `path` (if any), then `WATCHDOG__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();
        if let Some(p) = path {
            builder = builder.add_source(File::from(p).required(true));
        }
        builder = builder.add_source(
            Environment::with_prefix("WATCHDOG")
                .separator("__")
                .ignore_empty(true)
                .try_parsing(true),
        );

        let cfg: WatchdogConfig = builder.build()?.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Rejects settings the runtime cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.framework_name.trim().is_empty() {
            return Err(ConfigError::Missing {
                setting: "framework_name",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                setting: "poll_interval_ms",
                reason: "must be positive".into(),
            });
        }
        if self.poll_timeout_ms == 0 {
            return Err(ConfigError::Invalid {
                setting: "poll_timeout_ms",
                reason: "must be positive".into(),
            });
        }
        if self.poll_backoff.factor < 1.0 || !self.poll_backoff.factor.is_finite() {
            return Err(ConfigError::Invalid {
                setting: "poll_backoff.factor",
                reason: format!("{} is below 1.0", self.poll_backoff.factor),
            });
        }
        for rs in &self.replsets {
            rs.validate().map_err(|e| ConfigError::Invalid {
                setting: "replsets",
                reason: e.to_string(),
            })?;
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

fn default_framework_name() -> String {
    DEFAULT_FRAMEWORK_NAME.to_string()
}
fn default_poll_interval_ms() -> u64 {
    5_000
}
fn default_poll_timeout_ms() -> u64 {
    3_000
}
fn default_max_poll_failures() -> u32 {
    0
}
fn default_shutdown_grace_ms() -> u64 {
    10_000
}
fn default_bus_capacity() -> usize {
    1024
}
fn default_backoff_first_ms() -> u64 {
    1_000
}
fn default_backoff_max_ms() -> u64 {
    30_000
}
fn default_backoff_factor() -> f64 {
    2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use temp_env::with_vars;

    #[test]
    #[serial]
    fn load_without_sources_gives_defaults() {
        with_vars(Vec::<(&str, Option<&str>)>::new(), || {
            let cfg = WatchdogConfig::load(None).unwrap();
            assert_eq!(cfg.framework_name, "mongodb-replicaset");
            assert_eq!(cfg.exit_policy, ExitPolicy::Prune);
            assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
            assert!(cfg.replsets.is_empty());
        });
    }

    #[test]
    #[serial]
    fn file_then_env_overlay() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("watchdog.toml");
        std::fs::write(
            &path,
            r#"
            framework_name = "prod-mongo"
            poll_interval_ms = 1000
            exit_policy = "retain"

            [poll_backoff]
            first_ms = 200
            jitter = "none"

            [[replsets]]
            name = "rs0"
            members = [{ host = "rs0-0.mongo" }, { host = "rs0-1.mongo", port = 27018 }]
            "#,
        )
        .unwrap();

        with_vars(vec![("WATCHDOG__POLL_INTERVAL_MS", Some("250"))], || {
            let cfg = WatchdogConfig::load(Some(&path)).unwrap();
            assert_eq!(cfg.framework_name, "prod-mongo");
            assert_eq!(cfg.poll_interval_ms, 250);
            assert_eq!(cfg.exit_policy, ExitPolicy::Retain);
            assert_eq!(cfg.poll_backoff.policy().first, Duration::from_millis(200));
            assert_eq!(cfg.poll_backoff.jitter, JitterPolicy::None);
            assert_eq!(cfg.replsets.len(), 1);
            assert_eq!(cfg.replsets[0].members[0].port, 27017);
            assert_eq!(cfg.replsets[0].members[1].port, 27018);
        });
    }

    #[test]
    #[serial]
    fn missing_file_is_an_error() {
        let err = WatchdogConfig::load(Some(Path::new("/nonexistent/watchdog.toml"))).unwrap_err();
        assert_eq!(err.as_label(), "config_load");
    }

    #[test]
    fn unnamed_replset_is_rejected() {
        let cfg = WatchdogConfig {
            replsets: vec![Replset::new("")],
            ..WatchdogConfig::default()
        };
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::Invalid { setting: "replsets", .. }
        ));
    }
}
