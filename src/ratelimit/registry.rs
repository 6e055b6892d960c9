//! Registries that hand out one rate limiter per resource.

use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::{debug, warn};

use super::backend::RateLimiter;
use super::limiter::SingleProcessRateLimiter;
use super::options::RateLimiterOptions;
use super::unlimited::UnlimitedRateLimiter;
use crate::error::Result;

/// Resource id used when a limiter is created from options alone.
pub const DEFAULT_RESOURCE_ID: &str = "";

/// Trait for rate limiter factories.
pub trait RateLimiterFactory: Send + Sync {
    /// Get the limiter for `resource_id`, creating it from `options` on first use.
    fn create(&self, resource_id: &str, options: RateLimiterOptions) -> Result<Arc<dyn RateLimiter>>;

    /// Get the limiter for the default resource.
    fn create_default(&self, options: RateLimiterOptions) -> Result<Arc<dyn RateLimiter>> {
        self.create(DEFAULT_RESOURCE_ID, options)
    }
}

/// Caches one `SingleProcessRateLimiter` per resource id.
///
/// The first options supplied for a resource win. Later calls with a
/// different effective rate get the existing limiter and a warning.
/// Entries are never removed.
#[derive(Default)]
pub struct RateLimiterRegistry {
    limiters: DashMap<String, Arc<SingleProcessRateLimiter>>,
}

impl RateLimiterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the limiter for a resource.
    pub fn get_or_create(
        &self,
        resource_id: &str,
        options: RateLimiterOptions,
    ) -> Result<Arc<SingleProcessRateLimiter>> {
        match self.limiters.entry(resource_id.to_string()) {
            Entry::Occupied(entry) => {
                let existing = entry.get();
                if !existing.options().same_rate(&options) {
                    warn!(
                        resource = %resource_id,
                        existing = %serde_json::to_string(existing.options()).unwrap_or_default(),
                        requested = %serde_json::to_string(&options).unwrap_or_default(),
                        "Rate limiter already exists with different options, using the existing limiter"
                    );
                }
                debug!(resource = %resource_id, "Returning existing rate limiter");
                Ok(existing.clone())
            }
            Entry::Vacant(entry) => {
                debug!(resource = %resource_id, "Creating new rate limiter");
                let limiter = Arc::new(SingleProcessRateLimiter::new(options)?);
                entry.insert(limiter.clone());
                Ok(limiter)
            }
        }
    }

    /// Get the limiter for a resource if one was created.
    pub fn get(&self, resource_id: &str) -> Option<Arc<SingleProcessRateLimiter>> {
        self.limiters.get(resource_id).map(|entry| entry.value().clone())
    }

    /// Get the number of limiters created so far.
    pub fn len(&self) -> usize {
        self.limiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.limiters.is_empty()
    }
}

impl RateLimiterFactory for RateLimiterRegistry {
    fn create(&self, resource_id: &str, options: RateLimiterOptions) -> Result<Arc<dyn RateLimiter>> {
        let limiter: Arc<dyn RateLimiter> = self.get_or_create(resource_id, options)?;
        Ok(limiter)
    }
}

/// Hands out a single shared `UnlimitedRateLimiter` for every resource.
#[derive(Default)]
pub struct UnlimitedRegistry {
    limiter: Arc<UnlimitedRateLimiter>,
}

impl UnlimitedRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateLimiterFactory for UnlimitedRegistry {
    fn create(&self, resource_id: &str, _options: RateLimiterOptions) -> Result<Arc<dyn RateLimiter>> {
        debug!(resource = %resource_id, "Returning unlimited rate limiter");
        let limiter: Arc<dyn RateLimiter> = self.limiter.clone();
        Ok(limiter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::TimeUnit;

    fn per_second(tokens: u64) -> RateLimiterOptions {
        RateLimiterOptions::new(tokens, TimeUnit::Second)
    }

    #[tokio::test]
    async fn test_same_resource_returns_same_instance() {
        let registry = RateLimiterRegistry::new();

        let first = registry.get_or_create("X", per_second(10)).unwrap();
        let second = registry.get_or_create("X", per_second(10)).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_first_writer_wins_on_rate_mismatch() {
        let registry = RateLimiterRegistry::new();

        let first = registry.get_or_create("X", per_second(10)).unwrap();
        let second = registry
            .get_or_create("X", RateLimiterOptions::new(50, TimeUnit::Minute))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().tokens_per_timespan, 10);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_equivalent_rate_returns_same_instance() {
        let registry = RateLimiterRegistry::new();

        let first = registry.get_or_create("X", per_second(10)).unwrap();
        let second = registry
            .get_or_create("X", RateLimiterOptions::new(600, TimeUnit::Minute))
            .unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(second.options().timespan.as_millis(), 1000);
    }

    #[tokio::test]
    async fn test_different_resources_get_separate_limiters() {
        let registry = RateLimiterRegistry::new();

        let a = registry.get_or_create("a", per_second(10)).unwrap();
        let b = registry.get_or_create("b", per_second(10)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
        a.acquire(4).await.unwrap();
        assert_eq!(a.tokens_left(), 6);
        assert_eq!(b.tokens_left(), 10);
    }

    #[tokio::test]
    async fn test_default_resource() {
        let registry = RateLimiterRegistry::new();

        let via_default = registry.create_default(per_second(5)).unwrap();
        let via_id = registry.create(DEFAULT_RESOURCE_ID, per_second(7)).unwrap();

        assert!(Arc::ptr_eq(&via_default, &via_id));
        assert_eq!(via_id.options().tokens_per_timespan, 5);
        assert!(registry.get(DEFAULT_RESOURCE_ID).is_some());
    }

    #[tokio::test]
    async fn test_invalid_options_are_not_cached() {
        let registry = RateLimiterRegistry::new();

        assert!(registry.get_or_create("X", per_second(0)).is_err());
        assert!(registry.is_empty());

        let limiter = registry.get_or_create("X", per_second(3)).unwrap();
        assert_eq!(limiter.tokens_left(), 3);
    }

    #[tokio::test]
    async fn test_independent_registries() {
        let first = RateLimiterRegistry::new();
        let second = RateLimiterRegistry::new();

        let a = first.get_or_create("X", per_second(10)).unwrap();
        let b = second.get_or_create("X", per_second(10)).unwrap();

        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_creation_converges() {
        let registry = Arc::new(RateLimiterRegistry::new());

        let handles: Vec<_> = (0..16u64)
            .map(|i| {
                let registry = registry.clone();
                tokio::spawn(async move { registry.get_or_create("shared", per_second(i + 1)).unwrap() })
            })
            .collect();

        let limiters = futures::future::try_join_all(handles).await.unwrap();
        assert!(limiters.iter().all(|l| Arc::ptr_eq(l, &limiters[0])));
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_unlimited_registry_shares_one_limiter() {
        let registry = UnlimitedRegistry::new();

        let a = registry.create("a", per_second(1)).unwrap();
        let b = registry.create_default(per_second(2)).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.tokens_left().await, u64::MAX);
    }
}
