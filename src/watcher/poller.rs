//! # Replset polling collaborator.
//!
//! [`Poll`] is the seam between a watcher's lifecycle and the logic that
//! decides whether a replica set is healthy. [`TcpPoller`] is the built-in
//! implementation: a replset counts as reachable when at least one member
//! accepts a TCP connection.

use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::net::TcpStream;
use tokio::time;
use tracing::debug;

use crate::error::PollError;
use crate::replset::Replset;

/// Polls one replica set once.
///
/// Called repeatedly by a running [`Watcher`](crate::watcher::Watcher).
/// Return `PollError::Fatal` only when further polls are pointless.
#[async_trait]
pub trait Poll: Send + Sync + 'static {
    async fn poll(&self, replset: &Replset) -> Result<(), PollError>;
}

/// Reachability poller: connects to every member concurrently.
#[derive(Clone, Debug)]
pub struct TcpPoller {
    connect_timeout: Duration,
}

impl TcpPoller {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpPoller {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

#[async_trait]
impl Poll for TcpPoller {
    async fn poll(&self, replset: &Replset) -> Result<(), PollError> {
        if replset.members.is_empty() {
            return Err(PollError::Fatal {
                error: format!("replset {} has no members", replset.name),
            });
        }

        let probes = replset.members.iter().map(|m| async move {
            let addr = m.addr();
            match time::timeout(self.connect_timeout, TcpStream::connect(&addr)).await {
                Ok(Ok(_)) => true,
                Ok(Err(e)) => {
                    debug!(replset = %replset.name, member = %addr, error = %e, "member unreachable");
                    false
                }
                Err(_) => {
                    debug!(replset = %replset.name, member = %addr, "member connect timed out");
                    false
                }
            }
        });
        let reachable = join_all(probes).await.into_iter().filter(|ok| *ok).count();

        if reachable == 0 {
            return Err(PollError::Fail {
                error: format!(
                    "none of {} members of replset {} is reachable",
                    replset.members.len(),
                    replset.name
                ),
            });
        }
        debug!(replset = %replset.name, reachable, total = replset.members.len(), "replset poll ok");
        Ok(())
    }
}
