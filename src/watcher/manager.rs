//! # Watcher registry: at most one watcher per replset name.
//!
//! [`WatcherManager`] owns the name → watcher map and spawns every watcher
//! on the tokio runtime. All watchers share one stop token; there is no
//! per-watcher cancellation.
//!
//! ## Architecture
//! ```text
//! watch(rs) ──► write lock ──┬─ name present ─► AlreadyWatching
//!                            └─ name absent  ─► validate ─► stop fired? ─► ShuttingDown
//!                                                  └─► spawn supervise(watcher) ─► Started
//!
//! supervise(watcher)
//!   run() ─► WatcherTerminated ─► ExitPolicy::Prune + same generation ─► remove ─► WatcherRemoved
//!
//! stop_all(grace)
//!   ShutdownRequested ─► cancel stop token ─► drain map ─► join all (shared deadline)
//!     ├─ all joined  ─► AllStoppedWithin ─► Ok
//!     └─ deadline    ─► abort stragglers ─► GraceExceeded ─► Err(stuck)
//! ```
//!
//! ## Rules
//! - Check and insert happen under **one** write-lock acquisition, so two
//!   concurrent `watch` calls for the same name start exactly one watcher.
//! - `get(name)` is `Some` exactly when `has_watcher(name)` is true.
//! - Pruning compares generations, so a late exit notification never
//!   removes a newer watcher registered under the same name.
//! - The lock is never held across a join.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::{ExitPolicy, WatchdogConfig};
use crate::error::{RuntimeError, WatchError};
use crate::events::{Bus, Event, EventKind};
use crate::replset::Replset;
use crate::watcher::poller::Poll;
use crate::watcher::task::{Watcher, WatcherExit, WatcherSettings, WatcherState};

/// Result of a successful [`Manager::watch`] call.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WatchOutcome {
    /// A new watcher was created and spawned.
    Started,
    /// A watcher for this name already exists; nothing changed.
    AlreadyWatching,
}

/// Registry contract used by replset discovery.
#[async_trait]
pub trait Manager: Send + Sync {
    /// Returns the watcher registered under `name`, if any.
    async fn get(&self, name: &str) -> Option<Arc<Watcher>>;

    /// Returns `true` if a watcher is registered under `name`.
    async fn has_watcher(&self, name: &str) -> bool;

    /// Ensures a watcher exists for `replset`. Idempotent per name.
    async fn watch(&self, replset: Replset) -> Result<WatchOutcome, WatchError>;
}

struct Entry {
    watcher: Arc<Watcher>,
    join: JoinHandle<WatcherExit>,
}

/// Lock-protected registry of replset watchers.
pub struct WatcherManager {
    me: Weak<WatcherManager>,
    entries: RwLock<HashMap<String, Entry>>,
    settings: WatcherSettings,
    exit_policy: ExitPolicy,
    poller: Arc<dyn Poll>,
    bus: Bus,
    stop: CancellationToken,
    next_generation: AtomicU64,
}

impl WatcherManager {
    pub fn new(
        settings: WatcherSettings,
        exit_policy: ExitPolicy,
        poller: Arc<dyn Poll>,
        bus: Bus,
        stop: CancellationToken,
    ) -> Arc<Self> {
        Arc::new_cyclic(|me| Self {
            me: me.clone(),
            entries: RwLock::new(HashMap::new()),
            settings,
            exit_policy,
            poller,
            bus,
            stop,
            next_generation: AtomicU64::new(0),
        })
    }

    /// Builds a manager with its own bus from watchdog settings.
    pub fn from_config(
        cfg: &WatchdogConfig,
        poller: Arc<dyn Poll>,
        stop: CancellationToken,
    ) -> Arc<Self> {
        Self::new(
            WatcherSettings::from(cfg),
            cfg.exit_policy,
            poller,
            Bus::new(cfg.bus_capacity),
            stop,
        )
    }

    /// Returns sorted list of registered replset names.
    pub async fn names(&self) -> Vec<String> {
        let entries = self.entries.read().await;
        let mut names: Vec<String> = entries.keys().cloned().collect();
        names.sort_unstable();
        names
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Receiver for watcher lifecycle events published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.bus.subscribe()
    }

    /// The stop token shared by every watcher of this manager.
    pub fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }

    /// Removes the entry for `name` if its watcher has terminated.
    ///
    /// Returns `false` when the name is unknown or its watcher is still
    /// running; running watchers are only stopped by [`stop_all`](Self::stop_all).
    pub async fn remove(&self, name: &str) -> bool {
        let removed = {
            let mut entries = self.entries.write().await;
            match entries.get(name) {
                Some(e) if e.watcher.state() == WatcherState::Terminated => entries.remove(name),
                _ => None,
            }
        };
        match removed {
            Some(entry) => {
                self.publish_removed(name, entry.watcher.generation());
                true
            }
            None => false,
        }
    }

    /// Removes every terminated entry and returns the affected names, sorted.
    pub async fn prune_terminated(&self) -> Vec<String> {
        let removed: Vec<(String, u64)> = {
            let mut entries = self.entries.write().await;
            let dead: Vec<String> = entries
                .iter()
                .filter(|(_, e)| e.watcher.state() == WatcherState::Terminated)
                .map(|(name, _)| name.clone())
                .collect();
            dead.into_iter()
                .filter_map(|name| {
                    let entry = entries.remove(&name)?;
                    Some((name, entry.watcher.generation()))
                })
                .collect()
        };

        let mut names = Vec::with_capacity(removed.len());
        for (name, generation) in removed {
            self.publish_removed(&name, generation);
            names.push(name);
        }
        names.sort_unstable();
        names
    }

    /// Fires the shared stop token and waits up to `grace` for every
    /// registered watcher to finish. The registry is empty afterwards.
    pub async fn stop_all(&self, grace: Duration) -> Result<(), RuntimeError> {
        self.bus.publish(Event::now(EventKind::ShutdownRequested));
        self.stop.cancel();

        let drained: Vec<(String, Entry)> = {
            let mut entries = self.entries.write().await;
            entries.drain().collect()
        };
        info!(watchers = drained.len(), grace_ms = grace.as_millis() as u64, "stopping replset watchers");

        let deadline = Instant::now() + grace;
        let mut stuck = Vec::new();
        for (name, mut entry) in drained {
            match time::timeout_at(deadline, &mut entry.join).await {
                Ok(Ok(_exit)) => {}
                Ok(Err(e)) => warn!(replset = %name, error = %e, "replset watcher task died"),
                Err(_elapsed) => {
                    entry.join.abort();
                    stuck.push(name);
                    continue;
                }
            }
            self.publish_removed(&name, entry.watcher.generation());
        }

        if stuck.is_empty() {
            self.bus.publish(Event::now(EventKind::AllStoppedWithin));
            info!("all replset watchers stopped");
            Ok(())
        } else {
            stuck.sort_unstable();
            self.bus.publish(
                Event::now(EventKind::GraceExceeded).with_reason(stuck.join(",")),
            );
            warn!(?stuck, "replset watchers did not stop within grace");
            Err(RuntimeError::GraceExceeded { grace, stuck })
        }
    }

    async fn supervise(me: Weak<WatcherManager>, watcher: Arc<Watcher>) -> WatcherExit {
        let res = watcher.run().await;
        let exit = WatcherExit::of(&res);

        let Some(mgr) = me.upgrade() else {
            return exit;
        };

        let mut ev = Event::now(EventKind::WatcherTerminated)
            .with_replset(watcher.name())
            .with_generation(watcher.generation())
            .with_exit(exit);
        if let Err(e) = &res {
            ev = ev.with_reason(e.to_string());
        }
        mgr.bus.publish(ev);

        if mgr.exit_policy == ExitPolicy::Prune {
            mgr.prune_generation(watcher.name(), watcher.generation()).await;
        }
        exit
    }

    async fn prune_generation(&self, name: &str, generation: u64) {
        let removed = {
            let mut entries = self.entries.write().await;
            let current = entries
                .get(name)
                .is_some_and(|e| e.watcher.generation() == generation);
            if current { entries.remove(name) } else { None }
        };
        if removed.is_some() {
            debug!(replset = %name, generation, "pruned terminated replset watcher");
            self.publish_removed(name, generation);
        }
    }

    fn publish_removed(&self, name: &str, generation: u64) {
        self.bus.publish(
            Event::now(EventKind::WatcherRemoved)
                .with_replset(name)
                .with_generation(generation),
        );
    }
}

#[async_trait]
impl Manager for WatcherManager {
    async fn get(&self, name: &str) -> Option<Arc<Watcher>> {
        let entries = self.entries.read().await;
        entries.get(name).map(|e| e.watcher.clone())
    }

    async fn has_watcher(&self, name: &str) -> bool {
        self.entries.read().await.contains_key(name)
    }

    async fn watch(&self, replset: Replset) -> Result<WatchOutcome, WatchError> {
        let mut entries = self.entries.write().await;

        if entries.contains_key(&replset.name) {
            drop(entries);
            debug!(replset = %replset.name, "replset already watched");
            self.bus
                .publish(Event::now(EventKind::AlreadyWatching).with_replset(replset.name.as_str()));
            return Ok(WatchOutcome::AlreadyWatching);
        }

        replset.validate()?;
        if self.stop.is_cancelled() {
            return Err(WatchError::ShuttingDown {
                replset: replset.name,
            });
        }

        let name = replset.name.clone();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
        let watcher = Arc::new(Watcher::new(
            Arc::new(replset),
            generation,
            self.settings.clone(),
            self.poller.clone(),
            self.bus.clone(),
            self.stop.clone(),
        ));

        info!(replset = %name, generation, "starting replset watcher");
        let join = tokio::spawn(Self::supervise(self.me.clone(), watcher.clone()));
        entries.insert(name.clone(), Entry { watcher, join });
        drop(entries);

        self.bus.publish(
            Event::now(EventKind::WatcherStarted)
                .with_replset(name)
                .with_generation(generation),
        );
        Ok(WatchOutcome::Started)
    }
}
