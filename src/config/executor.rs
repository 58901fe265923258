//! # Executor configuration.
//!
//! [`ExecutorConfig`] gathers everything the node-local executor needs:
//! directories, process identity, the connect retry budget, the background
//! job delay and the settings of the optional collaborators (status
//! reporter, monitoring agent).
//!
//! ## Sentinel values
//! - `connect_tries = 0` is rejected (at least one probe is required)
//! - `delay_background_jobs = 0s` starts background jobs right after connect

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;
use crate::executor::NodeType;

use super::{
    DEFAULT_CONNECT_RETRY_SLEEP, DEFAULT_CONNECT_TRIES, DEFAULT_DELAY_BACKGROUND_JOBS,
    DEFAULT_FRAMEWORK_NAME, DEFAULT_GROUP, DEFAULT_HOST, DEFAULT_METRICS_INTERVAL, DEFAULT_PORT,
    DEFAULT_USER, DirFlags, Dirs,
};

/// Node-local executor settings.
#[derive(Clone, Debug)]
pub struct ExecutorConfig {
    /// Deployment/cluster identifier.
    pub framework_name: String,
    /// Which node role to start.
    pub node_type: NodeType,
    /// Resolved runtime directories.
    pub dirs: Dirs,
    /// User the managed process runs as.
    pub user: String,
    /// Group the managed process runs as.
    pub group: String,
    /// Host probed after launch.
    pub host: String,
    /// Port the managed process listens on.
    pub port: u16,
    /// Number of connection attempts after launch.
    pub connect_tries: u32,
    /// Sleep between two consecutive connection attempts.
    pub connect_retry_sleep: Duration,
    /// Delay between a verified connection and the start of background jobs.
    pub delay_background_jobs: Duration,
    /// Status reporter settings.
    pub metrics: MetricsConfig,
    /// External monitoring agent settings.
    pub monitoring_agent: MonitoringAgentConfig,
}

impl ExecutorConfig {
    /// Creates a config with defaults for every setting and directories
    /// resolved from the environment.
    pub fn new(node_type: NodeType) -> Self {
        Self {
            framework_name: DEFAULT_FRAMEWORK_NAME.to_string(),
            node_type,
            dirs: Dirs::resolve(&DirFlags::default()),
            user: DEFAULT_USER.to_string(),
            group: DEFAULT_GROUP.to_string(),
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            connect_tries: DEFAULT_CONNECT_TRIES,
            connect_retry_sleep: DEFAULT_CONNECT_RETRY_SLEEP,
            delay_background_jobs: DEFAULT_DELAY_BACKGROUND_JOBS,
            metrics: MetricsConfig::default(),
            monitoring_agent: MonitoringAgentConfig::default(),
        }
    }

    /// Address probed by the connect step.
    pub fn probe_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects settings that make a launch impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_empty("framework", &self.framework_name)?;
        non_empty("user", &self.user)?;
        non_empty("group", &self.group)?;
        non_empty("host", &self.host)?;
        non_empty_path("binDir", &self.dirs.bin)?;
        non_empty_path("configDir", &self.dirs.config)?;
        non_empty_path("tmpDir", &self.dirs.tmp)?;

        if self.port == 0 {
            return Err(ConfigError::Invalid {
                setting: "port",
                reason: "port must be non-zero".into(),
            });
        }
        if self.connect_tries == 0 {
            return Err(ConfigError::Invalid {
                setting: "connectTries",
                reason: "at least one connection attempt is required".into(),
            });
        }
        if self.metrics.enabled && self.metrics.interval.is_zero() {
            return Err(ConfigError::Invalid {
                setting: "metrics.intervalSecs",
                reason: "interval must be positive when metrics are enabled".into(),
            });
        }
        self.monitoring_agent.validate()
    }
}

/// Periodic status reporting.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: DEFAULT_METRICS_INTERVAL,
        }
    }
}

/// Settings forwarded to the external monitoring agent.
///
/// The agent itself is not managed here; these values are validated and
/// logged so a misconfigured agent fails the node early.
#[derive(Clone, Debug, Default)]
pub struct MonitoringAgentConfig {
    pub enabled: bool,
    pub enable_query_analytics: bool,
    /// Directory containing the agent's config file.
    pub config_dir: Option<PathBuf>,
    pub server_address: Option<String>,
    pub client_name: Option<String>,
    pub server_ssl: bool,
    pub server_insecure_ssl: bool,
    pub linux_metrics_exporter_port: Option<u16>,
    pub mongodb_metrics_exporter_port: Option<u16>,
    pub cluster_name: Option<String>,
}

impl MonitoringAgentConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if !self.enabled {
            return Ok(());
        }
        match self.server_address.as_deref() {
            Some(addr) if !addr.trim().is_empty() => {}
            _ => {
                return Err(ConfigError::Missing {
                    setting: "pmm.serverAddress",
                });
            }
        }
        if self.server_insecure_ssl && !self.server_ssl {
            return Err(ConfigError::Invalid {
                setting: "pmm.serverInsecureSSL",
                reason: "insecure SSL requires pmm.serverSSL".into(),
            });
        }
        if let (Some(linux), Some(mongo)) = (
            self.linux_metrics_exporter_port,
            self.mongodb_metrics_exporter_port,
        ) {
            if linux == mongo {
                return Err(ConfigError::Invalid {
                    setting: "pmm.mongodbMetricsExporterPort",
                    reason: format!("port {mongo} is already used by the linux exporter"),
                });
            }
        }
        Ok(())
    }
}

fn non_empty(setting: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.trim().is_empty() {
        Err(ConfigError::Missing { setting })
    } else {
        Ok(())
    }
}

fn non_empty_path(setting: &'static str, value: &std::path::Path) -> Result<(), ConfigError> {
    if value.as_os_str().is_empty() {
        Err(ConfigError::Missing { setting })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> ExecutorConfig {
        let mut cfg = ExecutorConfig::new(NodeType::Mongod);
        cfg.dirs = Dirs {
            bin: "/usr/bin".into(),
            config: "/etc".into(),
            tmp: "/tmp".into(),
        };
        cfg
    }

    #[test]
    fn defaults_are_valid() {
        config().validate().unwrap();
    }

    #[test]
    fn empty_user_is_missing() {
        let mut cfg = config();
        cfg.user = String::new();
        let err = cfg.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Missing { setting: "user" }));
    }

    #[test]
    fn zero_connect_tries_is_invalid() {
        let mut cfg = config();
        cfg.connect_tries = 0;
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::Invalid { setting: "connectTries", .. }
        ));
    }

    #[test]
    fn enabled_agent_requires_server_address() {
        let mut cfg = config();
        cfg.monitoring_agent.enabled = true;
        assert!(matches!(
            cfg.validate().unwrap_err(),
            ConfigError::Missing { setting: "pmm.serverAddress" }
        ));

        cfg.monitoring_agent.server_address = Some("pmm.local:443".into());
        cfg.validate().unwrap();
    }

    #[test]
    fn insecure_ssl_needs_ssl() {
        let mut cfg = config();
        cfg.monitoring_agent = MonitoringAgentConfig {
            enabled: true,
            server_address: Some("pmm.local".into()),
            server_insecure_ssl: true,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn disabled_agent_is_not_checked() {
        let mut cfg = config();
        cfg.monitoring_agent.server_insecure_ssl = true;
        cfg.validate().unwrap();
    }
}
