//! Configuration for both deployment roles.
//!
//! - [`ExecutorConfig`] node-local executor settings, built from CLI flags
//!   and their environment variable defaults (see `cli`).
//! - [`WatchdogConfig`] cluster-central watchdog settings, layered from an
//!   optional TOML file and `WATCHDOG__*` environment variables.
//! - [`Dirs`] runtime directory resolution with the sandbox fallback chain.
//!
//! Configuration objects are immutable once built and are passed to the
//! components that need them; nothing reads process-wide state afterwards.

mod dirs;
mod executor;
mod watchdog;

pub use dirs::{DirFlags, Dirs, sandbox_dir};
pub use executor::{ExecutorConfig, MetricsConfig, MonitoringAgentConfig};
pub use watchdog::{ExitPolicy, PollBackoffConfig, WatchdogConfig};

use std::time::Duration;

/// Environment variable holding the orchestrator-provided sandbox directory.
pub const ENV_MESOS_SANDBOX: &str = "MESOS_SANDBOX";
/// Environment variable naming the framework (deployment).
pub const ENV_FRAMEWORK_NAME: &str = "FRAMEWORK_NAME";
/// Environment variable toggling the status reporter job.
pub const ENV_METRICS_ENABLED: &str = "METRICS_ENABLED";
/// Environment variable for the status reporter cadence, in seconds.
pub const ENV_METRICS_INTERVAL_SECS: &str = "METRICS_INTERVAL_SECS";
/// Environment variable holding the task name, used as monitoring client name.
pub const ENV_TASK_NAME: &str = "TASK_NAME";

/// Framework name when neither flag nor environment provide one.
pub const DEFAULT_FRAMEWORK_NAME: &str = "mongodb-replicaset";
/// Directory holding the mongod/mongos executables.
pub const DEFAULT_BIN_DIR: &str = "/usr/bin";
/// Config directory used when no sandbox is available.
pub const DEFAULT_CONFIG_DIR_FALLBACK: &str = "/etc";
/// Temp directory used when no sandbox is available.
pub const DEFAULT_TMP_DIR_FALLBACK: &str = "/tmp";
/// User the managed process runs as.
pub const DEFAULT_USER: &str = "mongodb";
/// Group the managed process runs as.
pub const DEFAULT_GROUP: &str = "root";
/// Connection attempts made after launch.
pub const DEFAULT_CONNECT_TRIES: u32 = 30;
/// Sleep between connection attempts.
pub const DEFAULT_CONNECT_RETRY_SLEEP: Duration = Duration::from_secs(3);
/// Delay before background jobs start.
pub const DEFAULT_DELAY_BACKGROUND_JOBS: Duration = Duration::from_secs(15);
/// Status reporter cadence.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(10);
/// Address the executor probes after launch.
pub const DEFAULT_HOST: &str = "127.0.0.1";
/// mongod listen port.
pub const DEFAULT_PORT: u16 = 27017;
