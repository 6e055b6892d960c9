//! A limiter that never limits, used when rate limiting is disabled.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tracing::debug;

use super::action::{ActionId, RateLimitAction};
use super::backend::RateLimiter;
use super::options::RateLimiterOptions;
use crate::error::Result;

/// Token count reported by the unlimited limiter.
const UNLIMITED_TOKENS: u64 = u64::MAX;
/// Nominal window reported in the unlimited limiter's options.
const UNLIMITED_WINDOW_MS: u64 = 1000;

/// Grants every action immediately and never queues.
pub struct UnlimitedRateLimiter {
    options: RateLimiterOptions,
    last_id: AtomicU64,
}

impl UnlimitedRateLimiter {
    pub fn new() -> Self {
        debug!("Instantiate a new rate limiter with no limit options");
        Self {
            options: RateLimiterOptions::new(UNLIMITED_TOKENS, UNLIMITED_WINDOW_MS),
            last_id: AtomicU64::new(0),
        }
    }
}

impl Default for UnlimitedRateLimiter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RateLimiter for UnlimitedRateLimiter {
    fn options(&self) -> &RateLimiterOptions {
        &self.options
    }

    async fn tokens_left(&self) -> u64 {
        UNLIMITED_TOKENS
    }

    async fn pending_actions(&self) -> Vec<Arc<RateLimitAction>> {
        Vec::new()
    }

    async fn acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        let id = ActionId::new(self.last_id.fetch_add(1, Ordering::Relaxed) + 1);
        let action = RateLimitAction::new(id, tokens, Box::new(|_| Ok(())));
        action.start_action(Utc::now());
        Ok(Arc::new(action))
    }

    async fn try_acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        self.acquire(tokens).await
    }

    async fn release(&self, _action: &RateLimitAction) -> Result<()> {
        Ok(())
    }
}
