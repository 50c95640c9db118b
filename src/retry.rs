//! Unlimited fixed-interval retry for external services.
//!
//! The AI backend and the speech synthesizer are the only sources of a reply,
//! so their calls never give up: each failure is logged and retried after a
//! fixed delay until it succeeds or the task is cancelled.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::Cancelled;

/// Run `op` until it succeeds, sleeping `delay` between attempts.
///
/// `op` receives the 1-based attempt number. Cancellation is observed both
/// while an attempt is in flight and while waiting to retry.
pub async fn retry_forever<T, E, F, Fut>(
    what: &str,
    delay: Duration,
    cancel: &CancellationToken,
    mut op: F,
) -> Result<T, Cancelled>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let mut attempt: u32 = 1;
    loop {
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Cancelled),
            result = op(attempt) => result,
        };

        match result {
            Ok(value) => {
                if attempt > 1 {
                    info!(what = %what, attempt, "Succeeded after retrying");
                }
                return Ok(value);
            }
            Err(e) => {
                warn!(
                    what = %what,
                    attempt,
                    error = %e,
                    retry_in_ms = delay.as_millis() as u64,
                    "Attempt failed, retrying"
                );
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                attempt = attempt.saturating_add(1);
            }
        }
    }
}
