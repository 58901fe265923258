//! # Executor: node-local startup and supervision of one database process.
//!
//! ```text
//! Executor::run(node)
//!   ├─► ExecutorConfig::validate()        ─► ConfigError (before anything is launched)
//!   ├─► node_type == Mongos              ─► UnsupportedRole (node untouched)
//!   ├─► node.start()                     ─► Launch error
//!   ├─► connect_with_retry(probe)        ─► ConnectRetriesExhausted (node is stopped)
//!   ├─► spawn: sleep(delay_background_jobs) ─► run jobs on a child token
//!   └─► node.wait(stop)                  ─► Ok | ProcessExited
//!         └─► cancel jobs, join them
//! ```
//!
//! ## Rules
//! - The background job delay runs concurrently with `node.wait`; it never
//!   delays supervision and is cut short by shutdown or process exit.
//! - Job failures are logged and never fail the executor.
//! - One stop token per executor; jobs get a child token.

mod metrics;
mod mongod;
mod node;
mod retry;

pub use metrics::StatusReporter;
pub use mongod::MongodNode;
pub use node::Node;
pub use retry::connect_with_retry;

use std::fmt;
use std::sync::Arc;

use tokio::task::{JoinHandle, JoinSet};
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ExecutorConfig;
use crate::error::{ExecutorError, JobError};
use crate::jobs::JobRef;

/// Role of the node the executor starts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum NodeType {
    /// Replica set member.
    Mongod,
    /// Query router; recognised but not supported.
    Mongos,
}

impl NodeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeType::Mongod => "mongod",
            NodeType::Mongos => "mongos",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Runs the startup protocol for one node and supervises it.
pub struct Executor {
    cfg: Arc<ExecutorConfig>,
    jobs: Vec<JobRef>,
    stop: CancellationToken,
}

impl Executor {
    /// Creates an executor. The status reporter job is registered when
    /// `cfg.metrics.enabled` is set.
    pub fn new(cfg: ExecutorConfig) -> Self {
        let mut jobs: Vec<JobRef> = Vec::new();
        if cfg.metrics.enabled {
            jobs.push(Arc::new(StatusReporter::new(&cfg)));
        }
        Self {
            cfg: Arc::new(cfg),
            jobs,
            stop: CancellationToken::new(),
        }
    }

    /// Adds a background job started after `delay_background_jobs`.
    pub fn with_job(mut self, job: JobRef) -> Self {
        self.jobs.push(job);
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.cfg
    }

    /// Names of the registered background jobs, in start order.
    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name()).collect()
    }

    /// Cancelling this token stops the node and every background job.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Starts `node`, verifies it accepts connections, schedules background
    /// jobs and supervises the node until it exits or the stop token fires.
    pub async fn run(&self, node: &mut dyn Node) -> Result<(), ExecutorError> {
        let cfg = &self.cfg;
        cfg.validate()?;
        self.log_monitoring_agent();

        if cfg.node_type == NodeType::Mongos {
            error!(node_type = %cfg.node_type, "mongos nodes are not supported yet");
            return Err(ExecutorError::UnsupportedRole {
                role: NodeType::Mongos.as_str(),
            });
        }

        info!(
            framework = %cfg.framework_name,
            node = node.name(),
            bin_dir = %cfg.dirs.bin.display(),
            config_dir = %cfg.dirs.config.display(),
            tmp_dir = %cfg.dirs.tmp.display(),
            user = %cfg.user,
            group = %cfg.group,
            "starting node"
        );
        node.start().await?;

        let connected = connect_with_retry(
            cfg.connect_tries,
            cfg.connect_retry_sleep,
            &self.stop,
            || node.probe(),
        )
        .await;
        if let Err(e) = connected {
            error!(node = node.name(), error = %e, label = e.as_label(), "node did not become reachable");
            let abort = self.stop.child_token();
            abort.cancel();
            if let Err(stop_err) = node.wait(abort).await {
                warn!(error = %stop_err, "stopping unreachable node failed");
            }
            return Err(e);
        }

        let jobs_token = self.stop.child_token();
        let jobs = self.spawn_background_jobs(jobs_token.clone());

        let res = node.wait(self.stop.clone()).await;

        jobs_token.cancel();
        if let Err(e) = jobs.await {
            warn!(error = %e, "background job scheduler died");
        }
        match &res {
            Ok(()) => info!(node = node.name(), "node stopped"),
            Err(e) => error!(node = node.name(), error = %e, label = e.as_label(), "node failed"),
        }
        res
    }

    /// Waits `delay_background_jobs`, then runs every job until `token` fires.
    fn spawn_background_jobs(&self, token: CancellationToken) -> JoinHandle<()> {
        let delay = self.cfg.delay_background_jobs;
        let jobs = self.jobs.clone();

        tokio::spawn(async move {
            if jobs.is_empty() {
                return;
            }
            if !delay.is_zero() {
                info!(delay_ms = delay.as_millis() as u64, jobs = jobs.len(), "delaying background jobs");
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("background jobs cancelled before start");
                        return;
                    }
                    _ = time::sleep(delay) => {}
                }
            }

            let mut set = JoinSet::new();
            for job in jobs {
                let ctx = token.clone();
                info!(job = job.name(), "starting background job");
                set.spawn(async move {
                    let res = job.run(ctx).await;
                    (job, res)
                });
            }

            while let Some(joined) = set.join_next().await {
                match joined {
                    Ok((job, Ok(()))) => info!(job = job.name(), "background job finished"),
                    Ok((job, Err(JobError::Canceled))) => debug!(job = job.name(), "background job cancelled"),
                    Ok((job, Err(e))) => warn!(
                        job = job.name(),
                        error = %e,
                        label = e.as_label(),
                        "background job failed"
                    ),
                    Err(e) => warn!(error = %e, "background job panicked"),
                }
            }
        })
    }

    fn log_monitoring_agent(&self) {
        let agent = &self.cfg.monitoring_agent;
        if !agent.enabled {
            return;
        }
        info!(
            server = agent.server_address.as_deref().unwrap_or_default(),
            client = agent.client_name.as_deref().unwrap_or_default(),
            cluster = agent.cluster_name.as_deref().unwrap_or_default(),
            query_analytics = agent.enable_query_analytics,
            ssl = agent.server_ssl,
            insecure_ssl = agent.server_insecure_ssl,
            linux_exporter_port = agent.linux_metrics_exporter_port,
            mongodb_exporter_port = agent.mongodb_metrics_exporter_port,
            "monitoring agent enabled"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dirs;
    use crate::jobs::JobFn;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::time::Instant;

    /// Scripted node: probes succeed from attempt `reachable_from` on,
    /// the process exits on its own after `exits_after` (or only on stop).
    struct MockNode {
        reachable_from: u32,
        exits_after: Option<Duration>,
        starts: u32,
        probes: AtomicU32,
        stopped_by_token: bool,
    }

    impl MockNode {
        fn new(reachable_from: u32, exits_after: Option<Duration>) -> Self {
            Self {
                reachable_from,
                exits_after,
                starts: 0,
                probes: AtomicU32::new(0),
                stopped_by_token: false,
            }
        }
    }

    #[async_trait]
    impl Node for MockNode {
        fn name(&self) -> &str {
            "mock"
        }

        async fn start(&mut self) -> Result<(), ExecutorError> {
            self.starts += 1;
            Ok(())
        }

        async fn probe(&self) -> std::io::Result<()> {
            let n = self.probes.fetch_add(1, Ordering::SeqCst) + 1;
            if n >= self.reachable_from {
                Ok(())
            } else {
                Err(std::io::Error::from(std::io::ErrorKind::ConnectionRefused))
            }
        }

        async fn wait(&mut self, stop: CancellationToken) -> Result<(), ExecutorError> {
            match self.exits_after {
                Some(after) => tokio::select! {
                    _ = stop.cancelled() => self.stopped_by_token = true,
                    _ = time::sleep(after) => {}
                },
                None => {
                    stop.cancelled().await;
                    self.stopped_by_token = true;
                }
            }
            Ok(())
        }
    }

    fn config(node_type: NodeType) -> ExecutorConfig {
        let mut cfg = ExecutorConfig::new(node_type);
        cfg.dirs = Dirs {
            bin: "/usr/bin".into(),
            config: "/etc".into(),
            tmp: "/tmp".into(),
        };
        cfg.connect_tries = 3;
        cfg.connect_retry_sleep = Duration::from_secs(1);
        cfg.delay_background_jobs = Duration::from_secs(15);
        cfg
    }

    fn recording_job(started: Arc<Mutex<Option<Instant>>>) -> JobRef {
        JobFn::arc("record", move |ctx: CancellationToken| {
            let started = started.clone();
            async move {
                *started.lock().unwrap() = Some(Instant::now());
                ctx.cancelled().await;
                Err(JobError::Canceled)
            }
        })
    }

    #[tokio::test(start_paused = true)]
    async fn mongos_is_rejected_without_touching_node() {
        let exec = Executor::new(config(NodeType::Mongos));
        let mut node = MockNode::new(1, None);

        let err = exec.run(&mut node).await.unwrap_err();
        assert!(matches!(err, ExecutorError::UnsupportedRole { role: "mongos" }));
        assert_eq!(err.exit_code(), 4);
        assert_eq!(node.starts, 0);
        assert_eq!(node.probes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn invalid_config_fails_before_launch() {
        let mut cfg = config(NodeType::Mongod);
        cfg.group = String::new();
        let mut node = MockNode::new(1, None);

        let err = Executor::new(cfg).run(&mut node).await.unwrap_err();
        assert_eq!(err.exit_code(), 3);
        assert_eq!(node.starts, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn unreachable_node_exhausts_retries_and_is_stopped() {
        let exec = Executor::new(config(NodeType::Mongod));
        let mut node = MockNode::new(u32::MAX, None);

        let err = exec.run(&mut node).await.unwrap_err();
        assert!(matches!(err, ExecutorError::ConnectRetriesExhausted { tries: 3, .. }));
        assert_eq!(node.probes.load(Ordering::SeqCst), 3);
        assert!(node.stopped_by_token);
    }

    #[tokio::test(start_paused = true)]
    async fn background_jobs_start_after_delay() {
        let started = Arc::new(Mutex::new(None));
        let exec = Executor::new(config(NodeType::Mongod)).with_job(recording_job(started.clone()));
        let mut node = MockNode::new(2, Some(Duration::from_secs(60)));

        let t0 = Instant::now();
        exec.run(&mut node).await.unwrap();

        // one failed probe plus a 1s sleep, then the 15s delay
        let at = started.lock().unwrap().expect("job should have started");
        assert_eq!(at - t0, Duration::from_secs(16));
        assert_eq!(node.starts, 1);
        assert!(!node.stopped_by_token);
    }

    #[tokio::test(start_paused = true)]
    async fn node_exit_before_delay_skips_jobs() {
        let started = Arc::new(Mutex::new(None));
        let exec = Executor::new(config(NodeType::Mongod)).with_job(recording_job(started.clone()));
        let mut node = MockNode::new(1, Some(Duration::from_secs(5)));

        exec.run(&mut node).await.unwrap();
        assert!(started.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_token_stops_node_and_jobs() {
        let started = Arc::new(Mutex::new(None));
        let exec = Arc::new(
            Executor::new(config(NodeType::Mongod)).with_job(recording_job(started.clone())),
        );
        let stop = exec.stop_token();

        let running = {
            let exec = exec.clone();
            tokio::spawn(async move {
                let mut node = MockNode::new(1, None);
                let res = exec.run(&mut node).await;
                (res, node.stopped_by_token)
            })
        };
        time::sleep(Duration::from_secs(20)).await;
        assert!(started.lock().unwrap().is_some());
        stop.cancel();

        let (res, stopped) = running.await.unwrap();
        res.unwrap();
        assert!(stopped);
    }

    #[test]
    fn metrics_flag_registers_status_reporter() {
        let mut cfg = config(NodeType::Mongod);
        assert!(Executor::new(cfg.clone()).job_names().is_empty());

        cfg.metrics.enabled = true;
        assert_eq!(Executor::new(cfg).job_names(), vec!["status-reporter"]);
    }
}
