//! # Deferred background jobs.
//!
//! Jobs are non-critical work the executor starts only after the managed
//! process answered its first probe and `delay_background_jobs` elapsed
//! (status reporting, housekeeping that must not race process startup).
//!
//! - [`Job`] trait for async cancelable jobs
//! - [`JobFn`] closure-backed implementation
//! - [`JobRef`] shared handle (`Arc<dyn Job>`)

mod job;
mod job_fn;

pub use job::{Job, JobRef};
pub use job_fn::JobFn;
