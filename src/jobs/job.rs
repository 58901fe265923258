use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;

/// Shared handle to a job.
pub type JobRef = Arc<dyn Job>;

/// # Asynchronous, cancelable background job.
///
/// Implementors should check `ctx` between units of work and return
/// promptly once it is cancelled.
///
/// ```
/// use async_trait::async_trait;
/// use tokio_util::sync::CancellationToken;
/// use replvisor::{Job, JobError};
///
/// struct Compact;
///
/// #[async_trait]
/// impl Job for Compact {
///     fn name(&self) -> &str { "compact" }
///
///     async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
///         if ctx.is_cancelled() {
///             return Err(JobError::Canceled);
///         }
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait Job: Send + Sync + 'static {
    /// Stable name used in logs.
    fn name(&self) -> &str;

    /// Runs the job until it finishes or `ctx` is cancelled.
    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError>;
}
