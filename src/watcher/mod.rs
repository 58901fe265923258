//! Replica set watchers and their registry.
//!
//! ```text
//! discovery ──► Manager::watch(replset)
//!                 ├─ name known    ─► AlreadyWatching (running watcher untouched)
//!                 └─ name unknown  ─► Watcher::new ─► tokio::spawn(run) ─► Started
//!
//! Watcher::run()  Created ─► Running ─► Terminated
//!                   loop { check stop ─► poll (timeout) ─► sleep interval | backoff }
//!
//! on exit ─► WatcherTerminated event ─► ExitPolicy (Retain | Prune)
//! stop_all(grace) ─► cancel shared token ─► drain registry ─► join within grace
//! ```

mod manager;
mod poller;
mod task;

pub use manager::{Manager, WatchOutcome, WatcherManager};
pub use poller::{Poll, TcpPoller};
pub use task::{Watcher, WatcherExit, WatcherSettings, WatcherState};

#[cfg(test)]
pub(crate) use task::tests as tests_support;
