//! # replvisor
//!
//! **replvisor** runs a replicated MongoDB deployment under a cluster
//! orchestrator. It has two roles:
//!
//! - **Executor** (one per node) launches and supervises a single `mongod`,
//!   waits until it accepts connections and then starts deferred background
//!   jobs.
//! - **Watchdog** (one per cluster) keeps exactly one watcher per replica
//!   set and stops all of them together on shutdown.
//!
//! ## Architecture
//! ### Watchdog
//! ```text
//!   discovery / config ──► Manager::watch(Replset)
//!                               │
//! ┌─────────────────────────────▼─────────────────────────────────────┐
//! │  WatcherManager                                                   │
//! │  - RwLock<HashMap<name, Entry>>  (check + insert under one lock)  │
//! │  - one shared CancellationToken                                   │
//! │  - ExitPolicy (Retain | Prune) for terminated entries             │
//! └──────┬──────────────────┬──────────────────┬──────────────────────┘
//!        ▼                  ▼                  ▼
//!   ┌──────────┐       ┌──────────┐       ┌──────────┐
//!   │ Watcher  │       │ Watcher  │       │ Watcher  │
//!   │  "rs0"   │       │  "rs1"   │       │  "rs2"   │
//!   └────┬─────┘       └────┬─────┘       └────┬─────┘
//!        │ poll ─► interval | backoff ─► poll ... until stop / give up
//!        ▼                  ▼                  ▼
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                     Bus (broadcast channel)                       │
//! └───────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ### Executor
//! ```text
//! resolve dirs ─► validate ─► role check ─► start mongod ─► connect retry (k tries, k-1 sleeps)
//!                                                              │
//!                         ┌────────────────────────────────────┤
//!                         ▼                                    ▼
//!          delay ─► background jobs             wait for exit | SIGTERM on shutdown
//! ```
//!
//! ## Features
//! | Area              | Description                                          | Key types / traits                          |
//! |-------------------|------------------------------------------------------|---------------------------------------------|
//! | **Registry**      | One watcher per replset name, idempotent `watch`.    | [`Manager`], [`WatcherManager`]             |
//! | **Watchers**      | Poll loop with timeout, interval and backoff.        | [`Watcher`], [`Poll`], [`TcpPoller`]        |
//! | **Executor**      | Launch, connect retry, background jobs, supervision. | [`Executor`], [`Node`], [`MongodNode`]      |
//! | **Jobs**          | Deferred cancelable background work.                 | [`Job`], [`JobFn`], [`JobRef`]              |
//! | **Policies**      | Backoff and jitter for failed polls.                 | [`BackoffPolicy`], [`JitterPolicy`]         |
//! | **Events**        | Lifecycle events on a broadcast bus.                 | [`Event`], [`EventKind`], [`Bus`]           |
//! | **Errors**        | Typed errors with stable labels and exit codes.      | [`ExecutorError`], [`WatchError`], ...      |
//! | **Configuration** | Flags, env fallbacks, layered watchdog config.       | [`ExecutorConfig`], [`WatchdogConfig`]      |
//!
//! ## Example
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use tokio_util::sync::CancellationToken;
//! use replvisor::{
//!     Bus, ExitPolicy, Manager, Member, Replset, TcpPoller, WatchOutcome, WatcherManager,
//!     WatcherSettings, BackoffPolicy,
//! };
//!
//! #[tokio::main(flavor = "current_thread")]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = WatcherSettings {
//!         poll_interval: Duration::from_secs(5),
//!         poll_timeout: Duration::from_secs(2),
//!         max_poll_failures: 0,
//!         backoff: BackoffPolicy::default(),
//!     };
//!     let manager = WatcherManager::new(
//!         settings,
//!         ExitPolicy::Prune,
//!         Arc::new(TcpPoller::default()),
//!         Bus::new(256),
//!         CancellationToken::new(),
//!     );
//!
//!     let rs0 = Replset::new("rs0").with_member(Member::new("127.0.0.1", 27017));
//!     assert_eq!(manager.watch(rs0.clone()).await?, WatchOutcome::Started);
//!     assert_eq!(manager.watch(rs0).await?, WatchOutcome::AlreadyWatching);
//!
//!     manager.stop_all(Duration::from_secs(1)).await?;
//!     Ok(())
//! }
//! ```
pub mod cli;
pub mod config;
mod error;
mod events;
mod executor;
mod jobs;
pub mod logging;
mod policies;
mod replset;
pub mod shutdown;
mod watchdog;
mod watcher;

// ---- Public re-exports ----

pub use config::{ExecutorConfig, ExitPolicy, WatchdogConfig};
pub use error::{ConfigError, ExecutorError, JobError, PollError, RuntimeError, WatchError};
pub use events::{Bus, Event, EventKind};
pub use executor::{Executor, MongodNode, Node, NodeType, StatusReporter, connect_with_retry};
pub use jobs::{Job, JobFn, JobRef};
pub use policies::{BackoffPolicy, JitterPolicy};
pub use replset::{Member, Replset};
pub use watchdog::Watchdog;
pub use watcher::{
    Manager, Poll, TcpPoller, WatchOutcome, Watcher, WatcherExit, WatcherManager, WatcherSettings,
    WatcherState,
};
