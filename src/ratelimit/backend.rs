//! Rate limiter trait for abstracting the limited and unlimited implementations.

use std::sync::Arc;

use async_trait::async_trait;

use super::action::RateLimitAction;
use super::options::RateLimiterOptions;
use crate::error::Result;

/// Trait for rate limiter implementations.
///
/// This trait abstracts over the `SingleProcessRateLimiter` and the
/// `UnlimitedRateLimiter` so callers and adapters can work with either.
#[async_trait]
pub trait RateLimiter: Send + Sync {
    /// Options the limiter was created with.
    fn options(&self) -> &RateLimiterOptions;

    /// Number of tokens currently available.
    async fn tokens_left(&self) -> u64;

    /// Snapshot of the actions waiting for tokens, in arrival order.
    async fn pending_actions(&self) -> Vec<Arc<RateLimitAction>>;

    /// Obtain an action worth `tokens`, waiting in the queue if needed.
    ///
    /// Fails with `RateLimitError::Cancelled` if the action is cancelled
    /// while queued.
    async fn acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>>;

    /// Obtain an action worth `tokens` only if they are available now.
    ///
    /// Never queues; fails with `RateLimitError::InsufficientTokens`
    /// instead. The check and the grant are atomic.
    async fn try_acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>>;

    /// Release an action. Safe to call more than once.
    async fn release(&self, action: &RateLimitAction) -> Result<()>;
}
