//! Helpers that run a piece of work under a rate limiter.
//!
//! Both helpers release the action on every exit path of the work.

use std::error::Error;
use std::future::Future;

use tracing::trace;

use crate::error::{RateLimitError, Result};
use crate::ratelimit::RateLimiter;

/// Run `work` only if `tokens` are available right now.
///
/// Fails fast with [`RateLimitError::InsufficientTokens`] instead of
/// queuing. A failure of the work itself is wrapped into
/// [`RateLimitError::Action`].
pub async fn execute_action<L, F, Fut, T, E>(limiter: &L, tokens: u64, work: F) -> Result<T>
where
    L: RateLimiter + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<Box<dyn Error + Send + Sync>>,
{
    let action = limiter.try_acquire(tokens).await?;
    trace!(action = %action.id(), "Execute action");

    let outcome = work().await;
    let released = limiter.release(&action).await;

    let value = outcome.map_err(RateLimitError::from_reason)?;
    released?;
    Ok(value)
}

/// Wait for `tokens`, then run `work`.
///
/// Acquisition errors (including cancellation) and work errors are
/// returned unchanged.
pub async fn schedule_action<L, F, Fut, T, E>(
    limiter: &L,
    tokens: u64,
    work: F,
) -> std::result::Result<T, E>
where
    L: RateLimiter + ?Sized,
    F: FnOnce() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: From<RateLimitError>,
{
    let action = limiter.acquire(tokens).await?;
    trace!(action = %action.id(), "Run scheduled action");

    let outcome = work().await;
    let released = limiter.release(&action).await;

    let value = outcome?;
    released?;
    Ok(value)
}
