//! Construction-time options of a rate limiter.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::timespan::Timespan;
use crate::error::{RateLimitError, Result};

/// Options for a rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimiterOptions {
    /// Total token capacity per timespan
    pub tokens_per_timespan: u64,
    /// The rate window
    pub timespan: Timespan,
    /// Maximum time a granted action may hold its tokens (defaults to `timespan`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_auto_release_timespan: Option<Timespan>,
}

impl RateLimiterOptions {
    /// Create options with the auto-release timespan defaulting to the rate window.
    pub fn new(tokens_per_timespan: u64, timespan: impl Into<Timespan>) -> Self {
        Self {
            tokens_per_timespan,
            timespan: timespan.into(),
            action_auto_release_timespan: None,
        }
    }

    pub fn with_auto_release(mut self, timespan: impl Into<Timespan>) -> Self {
        self.action_auto_release_timespan = Some(timespan.into());
        self
    }

    /// Length of the rate window.
    pub fn window(&self) -> Duration {
        self.timespan.as_duration()
    }

    /// Maximum hold duration of a granted action.
    pub fn auto_release(&self) -> Duration {
        self.action_auto_release_timespan
            .as_ref()
            .unwrap_or(&self.timespan)
            .as_duration()
    }

    /// Check that the options describe a usable limiter.
    pub fn validate(&self) -> Result<()> {
        if self.tokens_per_timespan == 0 {
            return Err(RateLimitError::Config(
                "tokens_per_timespan must be positive".to_string(),
            ));
        }
        if self.timespan.as_millis() == 0 {
            return Err(RateLimitError::Config(
                "timespan must be at least one millisecond".to_string(),
            ));
        }
        if let Some(auto_release) = &self.action_auto_release_timespan {
            if auto_release.as_millis() == 0 {
                return Err(RateLimitError::Config(
                    "action_auto_release_timespan must be at least one millisecond".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Whether both options describe the same effective rate (tokens per millisecond).
    pub fn same_rate(&self, other: &RateLimiterOptions) -> bool {
        let lhs = self.tokens_per_timespan as u128 * other.timespan.as_millis() as u128;
        let rhs = other.tokens_per_timespan as u128 * self.timespan.as_millis() as u128;
        lhs == rhs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ratelimit::TimeUnit;

    #[test]
    fn test_auto_release_defaults_to_timespan() {
        let options = RateLimiterOptions::new(10, TimeUnit::Second);
        assert_eq!(options.auto_release(), Duration::from_secs(1));

        let options = options.with_auto_release(250u64);
        assert_eq!(options.auto_release(), Duration::from_millis(250));
        assert_eq!(options.window(), Duration::from_secs(1));
    }

    #[test]
    fn test_same_rate_compares_ratio() {
        let per_second = RateLimiterOptions::new(10, TimeUnit::Second);
        let per_minute = RateLimiterOptions::new(600, TimeUnit::Minute);
        let slower = RateLimiterOptions::new(10, TimeUnit::Minute);

        assert!(per_second.same_rate(&per_minute));
        assert!(per_minute.same_rate(&per_second));
        assert!(!per_second.same_rate(&slower));
    }

    #[test]
    fn test_validate() {
        assert!(RateLimiterOptions::new(1, 1u64).validate().is_ok());
        assert!(RateLimiterOptions::new(0, 1000u64).validate().is_err());
        assert!(RateLimiterOptions::new(5, 0u64).validate().is_err());
        assert!(RateLimiterOptions::new(5, 1000u64)
            .with_auto_release(0u64)
            .validate()
            .is_err());
    }

    #[test]
    fn test_deserialize_without_auto_release() {
        let yaml = r#"
tokens_per_timespan: 20
timespan: { unit: second, count: 5 }
"#;
        let options: RateLimiterOptions = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(options.tokens_per_timespan, 20);
        assert_eq!(options.window(), Duration::from_secs(5));
        assert_eq!(options.action_auto_release_timespan, None);
    }
}
