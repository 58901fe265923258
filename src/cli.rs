//! Command line interfaces of the two binaries.
//!
//! Flag names follow the deployment templates (`--configDir`,
//! `--connectTries`, `--metrics.enable`, ...). Most flags fall back to an
//! environment variable set by the orchestrator.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::config::{
    DEFAULT_CONNECT_RETRY_SLEEP, DEFAULT_CONNECT_TRIES, DEFAULT_DELAY_BACKGROUND_JOBS,
    DEFAULT_FRAMEWORK_NAME, DEFAULT_GROUP, DEFAULT_HOST, DEFAULT_METRICS_INTERVAL, DEFAULT_PORT,
    DEFAULT_USER, DirFlags, Dirs, ENV_FRAMEWORK_NAME, ENV_MESOS_SANDBOX, ENV_METRICS_ENABLED,
    ENV_METRICS_INTERVAL_SECS, ENV_TASK_NAME, ExecutorConfig, MetricsConfig, MonitoringAgentConfig,
};
use crate::executor::NodeType;
use crate::logging::LogFormat;

/// Node-local executor: launches and supervises one database process.
#[derive(Parser, Debug)]
#[command(name = "replvisor-executor", version)]
pub struct ExecutorCli {
    #[command(subcommand)]
    pub node: NodeCommand,

    #[command(flatten)]
    pub opts: ExecutorOpts,

    #[command(flatten)]
    pub log: LogArgs,
}

#[derive(Subcommand, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Run a mongod instance
    Mongod,
    /// Run a mongos instance
    Mongos,
}

impl From<NodeCommand> for NodeType {
    fn from(cmd: NodeCommand) -> Self {
        match cmd {
            NodeCommand::Mongod => NodeType::Mongod,
            NodeCommand::Mongos => NodeType::Mongos,
        }
    }
}

#[derive(Args, Debug)]
pub struct ExecutorOpts {
    /// Framework (deployment) name
    #[arg(long, global = true, env = ENV_FRAMEWORK_NAME, default_value = DEFAULT_FRAMEWORK_NAME)]
    pub framework: String,

    /// Directory of mongod.conf [default: $MESOS_SANDBOX, then /etc]
    #[arg(long = "configDir", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Directory of the mongod/mongos binaries [default: /usr/bin]
    #[arg(long = "binDir", global = true)]
    pub bin_dir: Option<PathBuf>,

    /// Temporary directory [default: $MESOS_SANDBOX/tmp, then /tmp]
    #[arg(long = "tmpDir", global = true)]
    pub tmp_dir: Option<PathBuf>,

    /// User to run the database process as
    #[arg(long, global = true, default_value = DEFAULT_USER)]
    pub user: String,

    /// Group to run the database process as
    #[arg(long, global = true, default_value = DEFAULT_GROUP)]
    pub group: String,

    /// Host probed after launch
    #[arg(long, global = true, default_value = DEFAULT_HOST)]
    pub host: String,

    /// Port the database process listens on
    #[arg(long, global = true, default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Number of connection attempts after launch
    #[arg(long = "connectTries", global = true, default_value_t = DEFAULT_CONNECT_TRIES)]
    pub connect_tries: u32,

    /// Wait between connection attempts [default: 3s]
    #[arg(long = "connectRetrySleep", global = true, value_parser = parse_duration)]
    pub connect_retry_sleep: Option<Duration>,

    /// Delay before background jobs start [default: 15s]
    #[arg(long = "delayBackgroundJobs", global = true, value_parser = parse_duration)]
    pub delay_background_jobs: Option<Duration>,

    #[command(flatten)]
    pub metrics: MetricsArgs,

    #[command(flatten)]
    pub pmm: PmmArgs,
}

#[derive(Args, Debug)]
pub struct MetricsArgs {
    /// Enable the periodic status reporter
    #[arg(id = "metrics_enabled", long = "metrics.enable", global = true, env = ENV_METRICS_ENABLED)]
    pub enabled: bool,

    /// Status report frequency in seconds
    #[arg(
        long = "metrics.intervalSecs",
        global = true,
        env = ENV_METRICS_INTERVAL_SECS,
        default_value_t = DEFAULT_METRICS_INTERVAL.as_secs()
    )]
    pub interval_secs: u64,
}

#[derive(Args, Debug)]
pub struct PmmArgs {
    /// Directory containing the monitoring agent config file
    #[arg(id = "pmm_config_dir", long = "pmm.configDir", global = true, env = ENV_MESOS_SANDBOX)]
    pub config_dir: Option<PathBuf>,

    /// Enable the monitoring agent
    #[arg(id = "pmm_enabled", long = "pmm.enable", global = true, env = "PMM_ENABLED")]
    pub enabled: bool,

    /// Enable query analytics in the monitoring agent
    #[arg(long = "pmm.enableQueryAnalytics", global = true, env = "PMM_ENABLE_QUERY_ANALYTICS")]
    pub enable_query_analytics: bool,

    /// Monitoring server address
    #[arg(long = "pmm.serverAddress", global = true, env = "PMM_SERVER_ADDRESS")]
    pub server_address: Option<String>,

    /// Monitoring client name
    #[arg(long = "pmm.clientName", global = true, env = ENV_TASK_NAME)]
    pub client_name: Option<String>,

    /// Use SSL between monitoring client and server
    #[arg(long = "pmm.serverSSL", global = true, env = "PMM_SERVER_SSL")]
    pub server_ssl: bool,

    /// Accept invalid server certificates
    #[arg(long = "pmm.serverInsecureSSL", global = true, env = "PMM_SERVER_INSECURE_SSL")]
    pub server_insecure_ssl: bool,

    /// Port of the OS metrics exporter
    #[arg(long = "pmm.linuxMetricsExporterPort", global = true, env = "PMM_LINUX_METRICS_EXPORTER_PORT")]
    pub linux_metrics_exporter_port: Option<u16>,

    /// Port of the database metrics exporter
    #[arg(long = "pmm.mongodbMetricsExporterPort", global = true, env = "PMM_MONGODB_METRICS_EXPORTER_PORT")]
    pub mongodb_metrics_exporter_port: Option<u16>,

    /// Cluster name reported by the monitoring agent
    #[arg(long = "pmm.mongodb.clusterName", global = true, env = ENV_FRAMEWORK_NAME)]
    pub cluster_name: Option<String>,
}

#[derive(Args, Debug)]
pub struct LogArgs {
    /// Log level or filter directives (RUST_LOG takes precedence)
    #[arg(long = "log-level", global = true, env = "REPLVISOR_LOG_LEVEL", default_value = "info")]
    pub level: String,

    /// Log output format
    #[arg(long = "log-format", global = true, env = "REPLVISOR_LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub format: LogFormat,
}

impl ExecutorCli {
    /// Builds the executor config, resolving directories against the sandbox.
    pub fn into_config(self) -> ExecutorConfig {
        let node_type = NodeType::from(self.node);
        let o = self.opts;
        let dirs = Dirs::resolve(&DirFlags {
            bin: o.bin_dir,
            config: o.config_dir,
            tmp: o.tmp_dir,
        });

        ExecutorConfig {
            framework_name: o.framework,
            node_type,
            dirs,
            user: o.user,
            group: o.group,
            host: o.host,
            port: o.port,
            connect_tries: o.connect_tries,
            connect_retry_sleep: o.connect_retry_sleep.unwrap_or(DEFAULT_CONNECT_RETRY_SLEEP),
            delay_background_jobs: o
                .delay_background_jobs
                .unwrap_or(DEFAULT_DELAY_BACKGROUND_JOBS),
            metrics: MetricsConfig {
                enabled: o.metrics.enabled,
                interval: Duration::from_secs(o.metrics.interval_secs),
            },
            monitoring_agent: MonitoringAgentConfig {
                enabled: o.pmm.enabled,
                enable_query_analytics: o.pmm.enable_query_analytics,
                config_dir: o.pmm.config_dir,
                server_address: o.pmm.server_address,
                client_name: o.pmm.client_name,
                server_ssl: o.pmm.server_ssl,
                server_insecure_ssl: o.pmm.server_insecure_ssl,
                linux_metrics_exporter_port: o.pmm.linux_metrics_exporter_port,
                mongodb_metrics_exporter_port: o.pmm.mongodb_metrics_exporter_port,
                cluster_name: o.pmm.cluster_name,
            },
        }
    }
}

/// Cluster-central watchdog: one watcher per replica set.
#[derive(Parser, Debug)]
#[command(name = "replvisor-watchdog", version)]
pub struct WatchdogCli {
    /// TOML config file; `WATCHDOG__*` variables override it
    #[arg(long, env = "WATCHDOG_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(flatten)]
    pub log: LogArgs,
}

/// Parses `500ms`, `15s`, `2m`, `1h`; a bare number means seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (num, unit) = s.split_at(split);
    let value: u64 = num
        .parse()
        .map_err(|_| format!("invalid duration `{s}`: expected a number followed by ms, s, m or h"))?;

    match unit.trim() {
        "ms" => Ok(Duration::from_millis(value)),
        "" | "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 3600)),
        other => Err(format!("invalid duration unit `{other}` in `{s}`")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serial_test::serial;
    use temp_env::with_vars;

    const ENV: [&str; 14] = [
        "FRAMEWORK_NAME",
        "MESOS_SANDBOX",
        "METRICS_ENABLED",
        "METRICS_INTERVAL_SECS",
        "TASK_NAME",
        "PMM_ENABLED",
        "PMM_ENABLE_QUERY_ANALYTICS",
        "PMM_SERVER_ADDRESS",
        "PMM_SERVER_SSL",
        "PMM_SERVER_INSECURE_SSL",
        "PMM_LINUX_METRICS_EXPORTER_PORT",
        "PMM_MONGODB_METRICS_EXPORTER_PORT",
        "REPLVISOR_LOG_LEVEL",
        "REPLVISOR_LOG_FORMAT",
    ];

    fn clean_env<'a>(set: &[(&'a str, &'a str)]) -> Vec<(&'a str, Option<&'a str>)> {
        let mut vars: Vec<(&str, Option<&str>)> = ENV.iter().map(|k| (*k, None)).collect();
        for (k, v) in set {
            vars.retain(|(name, _)| name != k);
            vars.push((*k, Some(*v)));
        }
        vars
    }

    #[test]
    fn command_definitions_are_consistent() {
        ExecutorCli::command().debug_assert();
        WatchdogCli::command().debug_assert();
    }

    #[test]
    #[serial]
    fn metrics_and_agent_flags_are_independent() {
        with_vars(clean_env(&[]), || {
            let cli = ExecutorCli::try_parse_from([
                "replvisor-executor",
                "mongod",
                "--pmm.enable",
                "--pmm.configDir",
                "/srv/pmm",
                "--configDir",
                "/srv/conf",
            ])
            .unwrap();
            let cfg = cli.into_config();

            assert!(!cfg.metrics.enabled);
            assert!(cfg.monitoring_agent.enabled);
            assert_eq!(cfg.dirs.config, PathBuf::from("/srv/conf"));
            assert_eq!(cfg.monitoring_agent.config_dir, Some(PathBuf::from("/srv/pmm")));
        });
    }

    #[test]
    fn durations() {
        assert_eq!(parse_duration("500ms"), Ok(Duration::from_millis(500)));
        assert_eq!(parse_duration("15s"), Ok(Duration::from_secs(15)));
        assert_eq!(parse_duration("2m"), Ok(Duration::from_secs(120)));
        assert_eq!(parse_duration("1h"), Ok(Duration::from_secs(3600)));
        assert_eq!(parse_duration("3"), Ok(Duration::from_secs(3)));
        assert!(parse_duration("s").is_err());
        assert!(parse_duration("10d").is_err());
    }

    #[test]
    #[serial]
    fn defaults_without_environment() {
        with_vars(clean_env(&[]), || {
            let cli = ExecutorCli::try_parse_from(["replvisor-executor", "mongod"]).unwrap();
            assert_eq!(cli.log.format, LogFormat::Text);
            let cfg = cli.into_config();

            assert_eq!(cfg.node_type, NodeType::Mongod);
            assert_eq!(cfg.framework_name, "mongodb-replicaset");
            assert_eq!(cfg.user, "mongodb");
            assert_eq!(cfg.group, "root");
            assert_eq!(cfg.connect_tries, 30);
            assert_eq!(cfg.connect_retry_sleep, Duration::from_secs(3));
            assert_eq!(cfg.delay_background_jobs, Duration::from_secs(15));
            assert_eq!(cfg.dirs.config, PathBuf::from("/etc"));
            assert_eq!(cfg.dirs.tmp, PathBuf::from("/tmp"));
            assert!(!cfg.metrics.enabled);
            assert_eq!(cfg.metrics.interval, Duration::from_secs(10));
        });
    }

    #[test]
    #[serial]
    fn flags_after_subcommand_and_env_fallbacks() {
        let env = clean_env(&[
            ("MESOS_SANDBOX", "/mnt/sandbox"),
            ("METRICS_ENABLED", "true"),
            ("FRAMEWORK_NAME", "prod-rs"),
            ("TASK_NAME", "rs0-1"),
        ]);
        with_vars(env, || {
            let cli = ExecutorCli::try_parse_from([
                "replvisor-executor",
                "mongos",
                "--connectTries",
                "5",
                "--connectRetrySleep",
                "250ms",
                "--binDir",
                "/opt/mongo/bin",
            ])
            .unwrap();
            let cfg = cli.into_config();

            assert_eq!(cfg.node_type, NodeType::Mongos);
            assert_eq!(cfg.framework_name, "prod-rs");
            assert_eq!(cfg.connect_tries, 5);
            assert_eq!(cfg.connect_retry_sleep, Duration::from_millis(250));
            assert_eq!(cfg.dirs.bin, PathBuf::from("/opt/mongo/bin"));
            assert_eq!(cfg.dirs.config, PathBuf::from("/mnt/sandbox"));
            assert_eq!(cfg.dirs.tmp, PathBuf::from("/mnt/sandbox/tmp"));
            assert!(cfg.metrics.enabled);
            assert_eq!(cfg.monitoring_agent.client_name.as_deref(), Some("rs0-1"));
            assert_eq!(cfg.monitoring_agent.cluster_name.as_deref(), Some("prod-rs"));
            assert_eq!(
                cfg.monitoring_agent.config_dir,
                Some(PathBuf::from("/mnt/sandbox"))
            );
        });
    }

    #[test]
    #[serial]
    fn node_subcommand_is_required() {
        with_vars(clean_env(&[]), || {
            assert!(ExecutorCli::try_parse_from(["replvisor-executor"]).is_err());
        });
    }

    #[test]
    #[serial]
    fn bad_duration_is_rejected() {
        with_vars(clean_env(&[]), || {
            let res = ExecutorCli::try_parse_from([
                "replvisor-executor",
                "mongod",
                "--delayBackgroundJobs",
                "soon",
            ]);
            assert!(res.is_err());
        });
    }
}
