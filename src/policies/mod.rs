//! Retry delay policies.
//!
//! - [`BackoffPolicy`] how the delay evolves between consecutive failures
//!   (first / factor / max + jitter)
//! - [`JitterPolicy`] randomization applied on top of the computed delay
//!
//! ## Where they are used
//! ```text
//! Watcher::run()      failed poll #n ─► backoff.next(n - 1) before the next poll
//! connect_with_retry  every retry    ─► BackoffPolicy::constant(connect_retry_sleep)
//! ```

mod backoff;
mod jitter;

pub use backoff::BackoffPolicy;
pub use jitter::JitterPolicy;
