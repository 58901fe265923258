//! Watchdog events: types and broadcast bus.
//!
//! ## Contents
//! - [`EventKind`], [`Event`] classification and payload of watcher lifecycle events
//! - [`Bus`] thin wrapper over `tokio::sync::broadcast`
//!
//! ## Quick reference
//! - **Publishers**: `WatcherManager` (start/remove/shutdown), watcher tasks
//!   (poll failures, backoff, termination).
//! - **Consumers**: the watchdog's event log and anything that calls
//!   `WatcherManager::subscribe`.

mod bus;
mod event;

pub use bus::Bus;
pub use event::{Event, EventKind};
