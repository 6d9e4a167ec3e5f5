//! Async retry loop paced by a [`Backoff`] policy.

use std::fmt;
use std::future::Future;

use tracing::{debug, warn};

use super::backoff::{Backoff, BackoffDecision};

/// Runs `operation` until it succeeds or `backoff` says to stop.
///
/// Between attempts the task sleeps for the delay the policy hands out. When
/// the policy returns [`BackoffDecision::Stop`], the error of the last
/// attempt is returned. The policy is not reset here; reset it before
/// reusing it for another campaign.
///
/// # Examples
///
/// ```rust,no_run
/// use wirehttp::client::backoff::ExponentialBackoff;
/// use wirehttp::client::retry::retry;
///
/// # async fn connect() -> std::io::Result<()> { Ok(()) }
/// # async fn run() -> std::io::Result<()> {
/// let mut backoff = ExponentialBackoff::new();
/// retry(&mut backoff, connect).await?;
/// # Ok(())
/// # }
/// ```
pub async fn retry<B, F, Fut, T, E>(backoff: &mut B, mut operation: F) -> Result<T, E>
where
    B: Backoff,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: fmt::Display,
{
    let mut attempt: u32 = 1;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => error,
        };

        match backoff.next_backoff() {
            BackoffDecision::Retry(delay) => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, error = %error, "attempt failed, retrying");
                tokio::time::sleep(delay).await;
                attempt = attempt.saturating_add(1);
            }
            BackoffDecision::Stop => {
                warn!(attempt, error = %error, "giving up after backoff campaign ended");
                return Err(error);
            }
        }
    }
}
