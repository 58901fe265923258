//! # Closure-backed job.
//!
//! [`JobFn`] wraps `F: Fn(CancellationToken) -> Fut`; every run builds a
//! fresh future, so shared state must be captured explicitly (`Arc<...>`).

use std::borrow::Cow;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::JobError;
use crate::jobs::job::Job;

/// Function-backed job.
pub struct JobFn<F> {
    name: Cow<'static, str>,
    f: F,
}

impl<F> JobFn<F> {
    pub fn new(name: impl Into<Cow<'static, str>>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }

    /// Creates the job as a shared handle.
    ///
    /// ```
    /// use tokio_util::sync::CancellationToken;
    /// use replvisor::{Job, JobError, JobFn, JobRef};
    ///
    /// let job: JobRef = JobFn::arc("noop", |_ctx: CancellationToken| async {
    ///     Ok::<_, JobError>(())
    /// });
    /// assert_eq!(job.name(), "noop");
    /// ```
    pub fn arc(name: impl Into<Cow<'static, str>>, f: F) -> Arc<Self> {
        Arc::new(Self::new(name, f))
    }
}

#[async_trait]
impl<F, Fut> Job for JobFn<F>
where
    F: Fn(CancellationToken) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), JobError>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, ctx: CancellationToken) -> Result<(), JobError> {
        (self.f)(ctx).await
    }
}
