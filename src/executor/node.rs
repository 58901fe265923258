//! # Managed database process.
//!
//! [`Node`] is the seam between the executor's startup protocol and the
//! process it supervises. [`MongodNode`](crate::executor::MongodNode) is
//! the real implementation; tests substitute scripted nodes.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ExecutorError;

/// One supervised database server process.
///
/// The executor calls `start` once, then `probe` until it succeeds or the
/// retry budget runs out, then `wait` until the process ends.
#[async_trait]
pub trait Node: Send + Sync {
    /// Name used in logs (`"mongod"`).
    fn name(&self) -> &str;

    /// Launches the process. Must not block until the process exits.
    async fn start(&mut self) -> Result<(), ExecutorError>;

    /// One connection attempt against the launched process.
    async fn probe(&self) -> std::io::Result<()>;

    /// Supervises the process until it exits on its own or `stop` fires.
    ///
    /// On `stop` the process is asked to terminate and is reaped; a clean
    /// exit after that is `Ok`.
    async fn wait(&mut self, stop: CancellationToken) -> Result<(), ExecutorError>;
}
