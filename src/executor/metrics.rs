//! # Status reporter background job.
//!
//! Probes the managed process every `interval` and logs whether it is
//! reachable and how long the probe took. Shipping the numbers to an
//! external metrics service is left to whatever scrapes the log.

use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::ExecutorConfig;
use crate::error::JobError;
use crate::jobs::Job;

/// Periodic reachability report for the managed process.
pub struct StatusReporter {
    addr: String,
    interval: Duration,
    framework: String,
}

impl StatusReporter {
    pub fn new(cfg: &ExecutorConfig) -> Self {
        Self {
            addr: cfg.probe_addr(),
            interval: cfg.metrics.interval,
            framework: cfg.framework_name.clone(),
        }
    }

    async fn report_once(&self) {
        let started = Instant::now();
        let res = time::timeout(self.interval, TcpStream::connect(&self.addr)).await;
        let latency_ms = started.elapsed().as_millis() as u64;
        match res {
            Ok(Ok(_)) => info!(
                framework = %self.framework,
                addr = %self.addr,
                reachable = true,
                latency_ms,
                "node status"
            ),
            Ok(Err(e)) => warn!(
                framework = %self.framework,
                addr = %self.addr,
                reachable = false,
                error = %e,
                "node status"
            ),
            Err(_) => warn!(
                framework = %self.framework,
                addr = %self.addr,
                reachable = false,
                latency_ms,
                "node status probe timed out"
            ),
        }
    }
}

#[async_trait]
impl Job for StatusReporter {
    fn name(&self) -> &str {
        "status-reporter"
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        if self.interval.is_zero() {
            return Err(JobError::Fail {
                error: "status interval must be positive".into(),
            });
        }
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ctx.cancelled() => return Err(JobError::Canceled),
                _ = ticker.tick() => self.report_once().await,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::NodeType;

    #[tokio::test]
    async fn stops_on_cancellation() {
        let mut cfg = ExecutorConfig::new(NodeType::Mongod);
        cfg.port = 1;
        cfg.metrics.interval = Duration::from_millis(10);
        let reporter = StatusReporter::new(&cfg);

        let ctx = CancellationToken::new();
        let handle = {
            let ctx = ctx.clone();
            tokio::spawn(async move { reporter.run(ctx).await })
        };
        time::sleep(Duration::from_millis(30)).await;
        ctx.cancel();

        let res = time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
        assert!(matches!(res, Err(JobError::Canceled)));
    }

    #[tokio::test]
    async fn zero_interval_is_rejected() {
        let mut cfg = ExecutorConfig::new(NodeType::Mongod);
        cfg.metrics.interval = Duration::ZERO;

        let res = StatusReporter::new(&cfg).run(CancellationToken::new()).await;
        assert!(matches!(res, Err(JobError::Fail { .. })));
    }
}
