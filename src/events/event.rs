//! # Watcher lifecycle events.
//!
//! [`EventKind`] covers three groups:
//! - **Registry events**: watcher started, duplicate watch ignored, entry removed
//! - **Watcher events**: poll failures, backoff scheduling, termination
//! - **Shutdown events**: stop requested, all stopped, grace exceeded
//!
//! Each [`Event`] carries a process-wide monotonic `seq` so receivers can
//! restore ordering.
//!
//! ```rust
//! use replvisor::{Event, EventKind};
//!
//! let ev = Event::now(EventKind::PollFailed)
//!     .with_replset("rs0")
//!     .with_failures(2)
//!     .with_reason("connection refused");
//!
//! assert_eq!(ev.replset.as_deref(), Some("rs0"));
//! assert_eq!(ev.failures, Some(2));
//! ```

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::time::{Duration, SystemTime};

use crate::watcher::WatcherExit;

static EVENT_SEQ: AtomicU64 = AtomicU64::new(0);

/// Classification of watchdog events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    // === Registry ===
    /// A new watcher was registered and spawned.
    ///
    /// Sets: `replset`, `generation`.
    WatcherStarted,

    /// `watch` was called for a replset that already has a watcher.
    ///
    /// Sets: `replset`.
    AlreadyWatching,

    /// A watcher entry was removed from the registry.
    ///
    /// Sets: `replset`, `generation`.
    WatcherRemoved,

    // === Watcher ===
    /// One poll of the replset failed.
    ///
    /// Sets: `replset`, `failures` (consecutive), `reason`.
    PollFailed,

    /// Next poll delayed by backoff after a failure.
    ///
    /// Sets: `replset`, `failures`, `delay_ms`.
    BackoffScheduled,

    /// The watcher's run loop returned.
    ///
    /// Sets: `replset`, `generation`, `exit`, `reason` (failures only).
    WatcherTerminated,

    // === Shutdown ===
    /// The shared stop signal fired.
    ShutdownRequested,

    /// Every watcher stopped within the grace period.
    AllStoppedWithin,

    /// Grace period exceeded; `reason` lists stuck replsets.
    GraceExceeded,
}

/// Watchdog event with optional metadata.
#[derive(Clone, Debug)]
pub struct Event {
    /// Monotonic sequence number.
    pub seq: u64,
    /// Wall-clock timestamp.
    pub at: SystemTime,
    /// Event classification.
    pub kind: EventKind,
    /// Replset name, if applicable.
    pub replset: Option<Arc<str>>,
    /// Registry generation of the watcher the event refers to.
    pub generation: Option<u64>,
    /// Consecutive poll failures.
    pub failures: Option<u32>,
    /// Backoff delay in milliseconds.
    pub delay_ms: Option<u32>,
    /// How the watcher ended.
    pub exit: Option<WatcherExit>,
    /// Human-readable reason.
    pub reason: Option<Arc<str>>,
}

impl Event {
    /// Creates an event stamped with the current time and the next sequence number.
    pub fn now(kind: EventKind) -> Self {
        Self {
            seq: EVENT_SEQ.fetch_add(1, AtomicOrdering::Relaxed),
            at: SystemTime::now(),
            kind,
            replset: None,
            generation: None,
            failures: None,
            delay_ms: None,
            exit: None,
            reason: None,
        }
    }

    #[inline]
    pub fn with_replset(mut self, name: impl Into<Arc<str>>) -> Self {
        self.replset = Some(name.into());
        self
    }

    #[inline]
    pub fn with_generation(mut self, generation: u64) -> Self {
        self.generation = Some(generation);
        self
    }

    #[inline]
    pub fn with_failures(mut self, n: u32) -> Self {
        self.failures = Some(n);
        self
    }

    /// Attaches a delay (stored as milliseconds, saturating).
    #[inline]
    pub fn with_delay(mut self, d: Duration) -> Self {
        self.delay_ms = Some(d.as_millis().min(u128::from(u32::MAX)) as u32);
        self
    }

    #[inline]
    pub fn with_exit(mut self, exit: WatcherExit) -> Self {
        self.exit = Some(exit);
        self
    }

    #[inline]
    pub fn with_reason(mut self, reason: impl Into<Arc<str>>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
