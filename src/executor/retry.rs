//! # Bounded connection retry.
//!
//! ```text
//! attempt 1 ─► fail ─► sleep ─► attempt 2 ─► ... ─► attempt N ─► fail ─► ConnectRetriesExhausted
//!                 └─ ok ─► Ok(1)         └─ ok ─► Ok(2)
//! ```
//!
//! ## Rules
//! - At most `tries` probes; `tries - 1` sleeps at most (never after the last probe).
//! - The first success stops the loop.
//! - The stop token aborts both probes and sleeps with `ExecutorError::Cancelled`;
//!   a fired token is checked before `probe` is called.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::ExecutorError;
use crate::policies::BackoffPolicy;

/// Calls `probe` until it succeeds, at most `tries` times, sleeping `sleep`
/// between attempts. Returns the number of the successful attempt.
pub async fn connect_with_retry<F, Fut, E>(
    tries: u32,
    sleep: Duration,
    stop: &CancellationToken,
    mut probe: F,
) -> Result<u32, ExecutorError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), E>>,
    E: Display,
{
    let backoff = BackoffPolicy::constant(sleep);
    let mut last_error = String::from("no connection attempt made");

    for attempt in 1..=tries {
        if stop.is_cancelled() {
            return Err(ExecutorError::Cancelled);
        }
        let res = select! {
            biased;
            _ = stop.cancelled() => return Err(ExecutorError::Cancelled),
            r = probe() => r,
        };
        match res {
            Ok(()) => {
                info!(attempt, tries, "connected to managed process");
                return Ok(attempt);
            }
            Err(e) => {
                last_error = e.to_string();
                debug!(attempt, tries, error = %last_error, "connection attempt failed");
            }
        }

        if attempt == tries {
            break;
        }
        let delay = backoff.next(attempt - 1);
        select! {
            biased;
            _ = stop.cancelled() => return Err(ExecutorError::Cancelled),
            _ = time::sleep(delay) => {}
        }
    }

    warn!(tries, error = %last_error, "connection retries exhausted");
    Err(ExecutorError::ConnectRetriesExhausted { tries, last_error })
}
