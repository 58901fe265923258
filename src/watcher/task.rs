//! # Watcher: monitoring loop for a single replica set.
//!
//! A [`Watcher`] is bound to one [`Replset`] for its whole life and shares
//! the process-wide stop token with every other watcher.
//!
//! ## Lifecycle
//! ```text
//! Created ──run()──► Running ──stop token fired────────► Terminated (Ok)
//!                            └─fatal / failure budget──► Terminated (Err)
//! ```
//! There is no way back to `Created`; the manager builds a new watcher
//! (with a new generation) if a replset is watched again.
//!
//! ## Rules
//! - The stop token is checked **before the first poll**, so a watcher
//!   started after shutdown never polls.
//! - Polls and sleeps both race against the stop token; cancellation
//!   latency is not bounded by `poll_interval`.
//! - Polls run sequentially, each bounded by `poll_timeout`.
//! - `consecutive_failures` resets on every successful poll.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU32, AtomicU64, Ordering};
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::WatchdogConfig;
use crate::error::PollError;
use crate::events::{Bus, Event, EventKind};
use crate::policies::BackoffPolicy;
use crate::replset::Replset;
use crate::watcher::poller::Poll;

/// Timing and failure budget of a watcher.
#[derive(Clone, Debug)]
pub struct WatcherSettings {
    /// Delay after a successful poll.
    pub poll_interval: Duration,
    /// Upper bound for one poll.
    pub poll_timeout: Duration,
    /// Consecutive failures before giving up (`0` = never).
    pub max_poll_failures: u32,
    /// Delay after failed polls.
    pub backoff: BackoffPolicy,
}

impl From<&WatchdogConfig> for WatcherSettings {
    fn from(cfg: &WatchdogConfig) -> Self {
        Self {
            poll_interval: cfg.poll_interval(),
            poll_timeout: cfg.poll_timeout(),
            max_poll_failures: cfg.max_poll_failures,
            backoff: cfg.poll_backoff.policy(),
        }
    }
}

/// Lifecycle state of a watcher.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherState {
    Created,
    Running,
    Terminated,
}

impl WatcherState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => WatcherState::Created,
            1 => WatcherState::Running,
            _ => WatcherState::Terminated,
        }
    }
}

/// How a watcher's run ended.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatcherExit {
    /// The shared stop token fired.
    Cancelled,
    /// A fatal poll error or an exhausted failure budget.
    Failed,
}

impl WatcherExit {
    pub fn of(result: &Result<(), PollError>) -> Self {
        match result {
            Ok(()) => WatcherExit::Cancelled,
            Err(_) => WatcherExit::Failed,
        }
    }
}

/// Long-running monitor of one replica set.
pub struct Watcher {
    replset: Arc<Replset>,
    generation: u64,
    settings: WatcherSettings,
    poller: Arc<dyn Poll>,
    bus: Bus,
    stop: CancellationToken,
    state: AtomicU8,
    polls: AtomicU64,
    consecutive_failures: AtomicU32,
}

impl Watcher {
    /// Creates a watcher in state [`WatcherState::Created`].
    pub fn new(
        replset: Arc<Replset>,
        generation: u64,
        settings: WatcherSettings,
        poller: Arc<dyn Poll>,
        bus: Bus,
        stop: CancellationToken,
    ) -> Self {
        Self {
            replset,
            generation,
            settings,
            poller,
            bus,
            stop,
            state: AtomicU8::new(WatcherState::Created as u8),
            polls: AtomicU64::new(0),
            consecutive_failures: AtomicU32::new(0),
        }
    }

    pub fn replset(&self) -> &Replset {
        &self.replset
    }

    pub fn name(&self) -> &str {
        &self.replset.name
    }

    /// Registry generation; distinguishes watchers of the same name over time.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn state(&self) -> WatcherState {
        WatcherState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Number of polls started so far.
    pub fn polls(&self) -> u64 {
        self.polls.load(Ordering::Relaxed)
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Runs the monitoring loop until the stop token fires (`Ok`) or the
    /// watcher gives up (`Err` with the last poll error).
    pub async fn run(&self) -> Result<(), PollError> {
        self.set_state(WatcherState::Running);
        debug!(replset = %self.name(), generation = self.generation, "replset watcher running");

        let res = self.run_loop().await;

        self.set_state(WatcherState::Terminated);
        match &res {
            Ok(()) => info!(replset = %self.name(), polls = self.polls(), "replset watcher stopped"),
            Err(e) => warn!(
                replset = %self.name(),
                polls = self.polls(),
                error = %e,
                "replset watcher terminated"
            ),
        }
        res
    }

    async fn run_loop(&self) -> Result<(), PollError> {
        loop {
            if self.stop.is_cancelled() {
                return Ok(());
            }

            let res = select! {
                biased;
                _ = self.stop.cancelled() => return Ok(()),
                r = self.poll_once() => r,
            };

            let delay = match res {
                Ok(()) => {
                    self.consecutive_failures.store(0, Ordering::Relaxed);
                    self.settings.poll_interval
                }
                Err(e) => self.on_failure(e)?,
            };

            let sleep = time::sleep(delay);
            tokio::pin!(sleep);
            select! {
                _ = &mut sleep => {}
                _ = self.stop.cancelled() => return Ok(()),
            }
        }
    }

    /// Records a failed poll; returns the backoff delay or the error that ends the run.
    fn on_failure(&self, err: PollError) -> Result<Duration, PollError> {
        let failures = self.consecutive_failures.fetch_add(1, Ordering::Relaxed) + 1;
        warn!(replset = %self.name(), failures, error = %err, "replset poll failed");
        self.bus.publish(
            Event::now(EventKind::PollFailed)
                .with_replset(self.name())
                .with_failures(failures)
                .with_reason(err.to_string()),
        );

        if !err.is_retryable() {
            return Err(err);
        }
        let budget = self.settings.max_poll_failures;
        if budget > 0 && failures >= budget {
            return Err(err);
        }

        let delay = self.settings.backoff.next(failures - 1);
        self.bus.publish(
            Event::now(EventKind::BackoffScheduled)
                .with_replset(self.name())
                .with_failures(failures)
                .with_delay(delay),
        );
        Ok(delay)
    }

    async fn poll_once(&self) -> Result<(), PollError> {
        self.polls.fetch_add(1, Ordering::Relaxed);
        let timeout = self.settings.poll_timeout;
        match time::timeout(timeout, self.poller.poll(&self.replset)).await {
            Ok(res) => res,
            Err(_elapsed) => Err(PollError::Timeout { timeout }),
        }
    }

    fn set_state(&self, state: WatcherState) {
        self.state.store(state as u8, Ordering::Release);
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;

    /// Poller returning scripted outcomes; repeats the last one.
    pub(crate) struct ScriptedPoller {
        script: Vec<Result<(), PollError>>,
        pub(crate) calls: AtomicUsize,
    }

    impl ScriptedPoller {
        pub(crate) fn new(script: Vec<Result<(), PollError>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
            })
        }

        pub(crate) fn healthy() -> Arc<Self> {
            Self::new(vec![Ok(())])
        }

        pub(crate) fn failing() -> Arc<Self> {
            Self::new(vec![Err(PollError::Fail {
                error: "connection refused".into(),
            })])
        }
    }

    #[async_trait]
    impl Poll for ScriptedPoller {
        async fn poll(&self, _replset: &Replset) -> Result<(), PollError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            let idx = n.min(self.script.len() - 1);
            self.script[idx].clone()
        }
    }

    pub(crate) fn settings(max_poll_failures: u32) -> WatcherSettings {
        WatcherSettings {
            poll_interval: Duration::from_secs(1),
            poll_timeout: Duration::from_millis(500),
            max_poll_failures,
            backoff: BackoffPolicy::constant(Duration::from_secs(2)),
        }
    }

    fn watcher(poller: Arc<dyn Poll>, max: u32, stop: CancellationToken) -> Watcher {
        Watcher::new(
            Arc::new(Replset::new("rs0")),
            1,
            settings(max),
            poller,
            Bus::new(16),
            stop,
        )
    }

    #[tokio::test(start_paused = true)]
    async fn already_cancelled_token_stops_before_first_poll() {
        let stop = CancellationToken::new();
        stop.cancel();
        let poller = ScriptedPoller::healthy();
        let w = watcher(poller.clone(), 0, stop);

        assert_eq!(w.state(), WatcherState::Created);
        w.run().await.unwrap();
        assert_eq!(w.polls(), 0);
        assert_eq!(poller.calls.load(Ordering::SeqCst), 0);
        assert_eq!(w.state(), WatcherState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn failure_budget_ends_run_with_last_error() {
        let w = watcher(ScriptedPoller::failing(), 3, CancellationToken::new());

        let err = w.run().await.unwrap_err();
        assert_eq!(err.as_label(), "poll_failed");
        assert_eq!(w.polls(), 3);
        assert_eq!(w.consecutive_failures(), 3);
        assert_eq!(w.state(), WatcherState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn fatal_error_ends_run_immediately() {
        let poller = ScriptedPoller::new(vec![
            Ok(()),
            Err(PollError::Fatal {
                error: "replset removed".into(),
            }),
        ]);
        let w = watcher(poller, 0, CancellationToken::new());

        let err = w.run().await.unwrap_err();
        assert!(!err.is_retryable());
        assert_eq!(w.polls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_failure_streak() {
        let fail = Err(PollError::Fail { error: "x".into() });
        let poller = ScriptedPoller::new(vec![
            fail.clone(),
            fail.clone(),
            Ok(()),
            fail.clone(),
            fail.clone(),
            fail,
        ]);
        let w = watcher(poller, 3, CancellationToken::new());

        w.run().await.unwrap_err();
        assert_eq!(w.polls(), 6);
        assert_eq!(w.consecutive_failures(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_poll_times_out() {
        struct Hanging;
        #[async_trait]
        impl Poll for Hanging {
            async fn poll(&self, _replset: &Replset) -> Result<(), PollError> {
                std::future::pending().await
            }
        }

        let w = watcher(Arc::new(Hanging), 1, CancellationToken::new());
        let err = w.run().await.unwrap_err();
        assert!(matches!(err, PollError::Timeout { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_interrupts_interval_sleep() {
        let stop = CancellationToken::new();
        let poller = ScriptedPoller::healthy();
        let w = Arc::new(watcher(poller, 0, stop.clone()));

        let running = {
            let w = w.clone();
            tokio::spawn(async move { w.run().await })
        };
        while w.polls() == 0 {
            tokio::task::yield_now().await;
        }
        stop.cancel();

        let res = time::timeout(Duration::from_millis(10), running).await;
        assert!(res.expect("watcher should stop promptly").unwrap().is_ok());
        assert_eq!(w.state(), WatcherState::Terminated);
    }

    #[tokio::test(start_paused = true)]
    async fn failures_publish_events() {
        let bus = Bus::new(16);
        let mut rx = bus.subscribe();
        let w = Watcher::new(
            Arc::new(Replset::new("rs0")),
            1,
            settings(2),
            ScriptedPoller::failing(),
            bus,
            CancellationToken::new(),
        );
        w.run().await.unwrap_err();

        let kinds: Vec<EventKind> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.kind)
            .collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::PollFailed,
                EventKind::BackoffScheduled,
                EventKind::PollFailed
            ]
        );
    }
}
