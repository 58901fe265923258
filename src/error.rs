//! Error types used by the executor, the watchdog runtime and watchers.
//!
//! - [`ConfigError`] invalid or missing settings, reported before anything is launched.
//! - [`ExecutorError`] fatal startup/supervision failures of the node-local executor.
//! - [`WatchError`] registration failures returned synchronously by the watcher manager.
//! - [`PollError`] failures of a single replica set poll inside a running watcher.
//! - [`RuntimeError`] failures of the watchdog runtime itself (shutdown).
//! - [`JobError`] failures of deferred background jobs.
//!
//! Every type exposes `as_label` for logs/metrics.

use std::time::Duration;
use thiserror::Error;

/// # Invalid configuration.
///
/// Always fatal and always raised before a process launch is attempted.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ConfigError {
    /// A required setting is empty.
    #[error("missing required setting `{setting}`")]
    Missing {
        /// Flag/field name of the setting.
        setting: &'static str,
    },

    /// A setting has a value that cannot be used.
    #[error("invalid value for `{setting}`: {reason}")]
    Invalid {
        /// Flag/field name of the setting.
        setting: &'static str,
        /// Why the value was rejected.
        reason: String,
    },

    /// Loading layered configuration (file + environment) failed.
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),
}

impl ConfigError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ConfigError::Missing { .. } => "config_missing",
            ConfigError::Invalid { .. } => "config_invalid",
            ConfigError::Load(_) => "config_load",
        }
    }
}

/// # Fatal executor errors.
///
/// Each variant terminates the node process with its own exit status,
/// see [`ExecutorError::exit_code`].
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ExecutorError {
    /// Configuration was rejected during validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The requested node role has no startup protocol.
    #[error("{role} nodes are not supported yet")]
    UnsupportedRole {
        /// Name of the rejected role.
        role: &'static str,
    },

    /// Spawning the managed process failed.
    #[error("failed to launch {binary}: {source}")]
    Launch {
        /// Path of the executable that failed to start.
        binary: String,
        /// Underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Every connection attempt failed.
    #[error("could not connect to the managed process after {tries} attempts: {last_error}")]
    ConnectRetriesExhausted {
        /// The configured attempt budget.
        tries: u32,
        /// Error reported by the last probe.
        last_error: String,
    },

    /// The managed process exited with a failure status.
    #[error("managed process exited with {status}")]
    ProcessExited {
        /// Exit status, rendered for logs.
        status: String,
    },

    /// Shutdown was requested before startup completed.
    #[error("startup cancelled")]
    Cancelled,

    /// Any other IO failure while supervising the process.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ExecutorError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            ExecutorError::Config(e) => e.as_label(),
            ExecutorError::UnsupportedRole { .. } => "executor_unsupported_role",
            ExecutorError::Launch { .. } => "executor_launch_failed",
            ExecutorError::ConnectRetriesExhausted { .. } => "executor_connect_exhausted",
            ExecutorError::ProcessExited { .. } => "executor_process_exited",
            ExecutorError::Cancelled => "executor_cancelled",
            ExecutorError::Io(_) => "executor_io",
        }
    }

    /// Process exit status for this failure.
    ///
    /// | code | condition |
    /// |------|-----------|
    /// | 1 | io error / cancelled startup |
    /// | 3 | configuration error |
    /// | 4 | unsupported node role |
    /// | 5 | launch failure |
    /// | 6 | connect retries exhausted |
    /// | 7 | managed process exited abnormally |
    pub fn exit_code(&self) -> i32 {
        match self {
            ExecutorError::Io(_) | ExecutorError::Cancelled => 1,
            ExecutorError::Config(_) => 3,
            ExecutorError::UnsupportedRole { .. } => 4,
            ExecutorError::Launch { .. } => 5,
            ExecutorError::ConnectRetriesExhausted { .. } => 6,
            ExecutorError::ProcessExited { .. } => 7,
        }
    }
}

/// # Watcher registration errors.
///
/// Returned by [`Manager::watch`](crate::watcher::Manager::watch); an
/// already-watched replset is *not* an error.
#[non_exhaustive]
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WatchError {
    /// The descriptor cannot be watched (for example an empty name).
    #[error("invalid replset: {reason}")]
    InvalidReplset {
        /// Why the descriptor was rejected.
        reason: String,
    },

    /// The shared stop signal already fired; no new watchers are started.
    #[error("watchdog is shutting down, not watching replset {replset}")]
    ShuttingDown {
        /// Name of the rejected replset.
        replset: String,
    },
}

impl WatchError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            WatchError::InvalidReplset { .. } => "watch_invalid_replset",
            WatchError::ShuttingDown { .. } => "watch_shutting_down",
        }
    }
}

/// # Errors produced by a single replset poll.
///
/// `Fail` and `Timeout` count toward the watcher's failure budget,
/// `Fatal` terminates the watcher immediately.
#[non_exhaustive]
#[derive(Error, Debug, Clone)]
pub enum PollError {
    /// Poll did not finish within the configured timeout.
    #[error("poll timed out after {timeout:?}")]
    Timeout {
        /// The timeout that was exceeded.
        timeout: Duration,
    },

    /// Poll failed but the next one may succeed.
    #[error("poll failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// Non-recoverable error; the watcher stops.
    #[error("fatal poll error: {error}")]
    Fatal {
        /// The underlying error message.
        error: String,
    },
}

impl PollError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            PollError::Timeout { .. } => "poll_timeout",
            PollError::Fail { .. } => "poll_failed",
            PollError::Fatal { .. } => "poll_fatal",
        }
    }

    /// Returns `true` for [`PollError::Fail`] and [`PollError::Timeout`].
    pub fn is_retryable(&self) -> bool {
        matches!(self, PollError::Fail { .. } | PollError::Timeout { .. })
    }
}

/// # Errors produced by the watchdog runtime.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum RuntimeError {
    /// Shutdown grace period was exceeded; some watchers did not stop in time.
    #[error("shutdown timeout {grace:?} exceeded; stuck: {stuck:?}")]
    GraceExceeded {
        /// The configured grace duration.
        grace: Duration,
        /// Replsets whose watchers did not stop in time.
        stuck: Vec<String>,
    },

    /// Registering OS signal handlers failed.
    #[error("signal handling failed: {0}")]
    Signal(#[from] std::io::Error),
}

impl RuntimeError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            RuntimeError::GraceExceeded { .. } => "runtime_grace_exceeded",
            RuntimeError::Signal(_) => "runtime_signal",
        }
    }

    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            RuntimeError::GraceExceeded { .. } => 8,
            RuntimeError::Signal(_) => 1,
        }
    }
}

/// # Errors produced by background jobs.
///
/// Jobs are best-effort: the executor logs these and keeps supervising.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum JobError {
    /// The job failed.
    #[error("job failed: {error}")]
    Fail {
        /// The underlying error message.
        error: String,
    },

    /// The job observed cancellation and stopped.
    #[error("job cancelled")]
    Canceled,
}

impl JobError {
    /// Returns a short stable label (snake_case) for use in logs/metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            JobError::Fail { .. } => "job_failed",
            JobError::Canceled => "job_canceled",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn executor_errors_map_to_distinct_exit_codes() {
        let errors = [
            ExecutorError::Config(ConfigError::Missing { setting: "user" }),
            ExecutorError::UnsupportedRole { role: "mongos" },
            ExecutorError::Launch {
                binary: "/usr/bin/mongod".into(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            },
            ExecutorError::ConnectRetriesExhausted {
                tries: 3,
                last_error: "refused".into(),
            },
            ExecutorError::ProcessExited {
                status: "exit status: 100".into(),
            },
        ];
        let mut codes: Vec<i32> = errors.iter().map(ExecutorError::exit_code).collect();
        assert!(codes.iter().all(|c| *c != 0));
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }

    #[test]
    fn poll_error_retryability() {
        assert!(PollError::Fail { error: "x".into() }.is_retryable());
        assert!(PollError::Timeout { timeout: Duration::from_secs(1) }.is_retryable());
        assert!(!PollError::Fatal { error: "x".into() }.is_retryable());
    }

    #[test]
    fn unsupported_role_message_names_role() {
        let err = ExecutorError::UnsupportedRole { role: "mongos" };
        assert_eq!(err.to_string(), "mongos nodes are not supported yet");
        assert_eq!(err.as_label(), "executor_unsupported_role");
    }
}
