//! # Watchdog: cluster-central runtime around the watcher registry.
//!
//! The [`Watchdog`] owns the process-wide stop token and the
//! [`WatcherManager`], registers the configured replsets and drives
//! graceful shutdown.
//!
//! ```text
//! Watchdog::run()
//!   ├─► log_events(): Bus.subscribe() ─► tracing (one line per event)
//!   ├─► watch(rs) for every configured replset
//!   ├─► wait: shutdown signal | stop token
//!   │     └─► manager.stop_all(shutdown_grace)
//!   │           ├─ Ok              ─► all watchers joined
//!   │           └─ GraceExceeded   ─► stuck watcher names
//!   └─► drain and join the event log
//! ```
//!
//! ## Example
//! ```rust,no_run
//! use std::sync::Arc;
//! use replvisor::{TcpPoller, Watchdog, WatchdogConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let cfg = WatchdogConfig::load(None)?;
//!     let watchdog = Watchdog::new(cfg, Arc::new(TcpPoller::default()));
//!     watchdog.run().await?;
//!     Ok(())
//! }
//! ```

use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::WatchdogConfig;
use crate::error::RuntimeError;
use crate::events::{Event, EventKind};
use crate::shutdown;
use crate::watcher::{Manager, Poll, WatchOutcome, WatcherManager};

/// Owns the watcher registry and its shutdown.
pub struct Watchdog {
    cfg: WatchdogConfig,
    manager: Arc<WatcherManager>,
    stop: CancellationToken,
}

impl Watchdog {
    /// Creates a watchdog whose watchers poll through `poller`.
    pub fn new(cfg: WatchdogConfig, poller: Arc<dyn Poll>) -> Self {
        let stop = CancellationToken::new();
        let manager = WatcherManager::from_config(&cfg, poller, stop.clone());
        Self { cfg, manager, stop }
    }

    /// The registry, for discovery sources that add replsets at runtime.
    pub fn manager(&self) -> Arc<WatcherManager> {
        Arc::clone(&self.manager)
    }

    /// Cancelling this token has the same effect as a shutdown signal.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }

    /// Registers the configured replsets and runs until a shutdown signal
    /// arrives or the stop token fires, then stops every watcher.
    pub async fn run(&self) -> Result<(), RuntimeError> {
        let log_done = CancellationToken::new();
        let event_log = self.log_events(log_done.clone());
        info!(
            framework = %self.cfg.framework_name,
            replsets = self.cfg.replsets.len(),
            "watchdog started"
        );
        self.register_replsets().await;

        let stopped = tokio::select! {
            res = shutdown::wait_for_shutdown_signal() => res,
            _ = self.stop.cancelled() => {
                debug!("watchdog stop token fired");
                Ok(())
            }
        };
        let res = match stopped {
            Ok(()) => self.manager.stop_all(self.cfg.shutdown_grace()).await,
            Err(e) => Err(RuntimeError::from(e)),
        };

        log_done.cancel();
        if let Err(e) = event_log.await {
            warn!(error = %e, "event log task failed");
        }
        res
    }

    async fn register_replsets(&self) {
        for rs in &self.cfg.replsets {
            match self.manager.watch(rs.clone()).await {
                Ok(WatchOutcome::Started) => {}
                Ok(WatchOutcome::AlreadyWatching) => {
                    warn!(replset = %rs.name, "replset configured more than once")
                }
                Err(e) => error!(replset = %rs.name, error = %e, label = e.as_label(), "cannot watch replset"),
            }
        }
    }

    /// Forwards bus events to the log until `done` fires, then logs
    /// whatever is still buffered.
    fn log_events(&self, done: CancellationToken) -> JoinHandle<()> {
        let mut rx = self.manager.subscribe();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    msg = rx.recv() => match msg {
                        Ok(ev) => log_event(&ev),
                        Err(RecvError::Lagged(n)) => warn!(skipped = n, "event log lagged"),
                        Err(RecvError::Closed) => return,
                    },
                    _ = done.cancelled() => break,
                }
            }
            while let Ok(ev) = rx.try_recv() {
                log_event(&ev);
            }
        })
    }
}

fn log_event(e: &Event) {
    let replset = e.replset.as_deref().unwrap_or("");
    match e.kind {
        EventKind::WatcherStarted => debug!(seq = e.seq, replset, generation = e.generation, "[started]"),
        EventKind::AlreadyWatching => debug!(seq = e.seq, replset, "[already-watching]"),
        EventKind::WatcherRemoved => debug!(seq = e.seq, replset, generation = e.generation, "[removed]"),
        EventKind::PollFailed => debug!(
            seq = e.seq,
            replset,
            failures = e.failures,
            reason = e.reason.as_deref(),
            "[poll-failed]"
        ),
        EventKind::BackoffScheduled => debug!(
            seq = e.seq,
            replset,
            failures = e.failures,
            delay_ms = e.delay_ms,
            "[backoff]"
        ),
        EventKind::WatcherTerminated => debug!(
            seq = e.seq,
            replset,
            generation = e.generation,
            exit = ?e.exit,
            reason = e.reason.as_deref(),
            "[terminated]"
        ),
        EventKind::ShutdownRequested => debug!(seq = e.seq, "[shutdown-requested]"),
        EventKind::AllStoppedWithin => debug!(seq = e.seq, "[all-stopped-within-grace]"),
        EventKind::GraceExceeded => debug!(seq = e.seq, stuck = e.reason.as_deref(), "[grace-exceeded]"),
    }
}
