//! Error types for Hivegate.

use thiserror::Error;

use crate::ratelimit::ActionId;

/// Main error type for rate limiting operations.
#[derive(Error, Debug)]
pub enum RateLimitError {
    /// A queued action was cancelled before it was granted
    #[error("Action '{0}' was cancelled before being granted")]
    Cancelled(ActionId),

    /// Cancellation was requested for an action that is not waiting in the queue
    #[error("Action '{0}' is not queued")]
    NotQueued(ActionId),

    /// An action must request at least one token
    #[error("Invalid token count: {0}")]
    InvalidTokens(u64),

    /// Fail-fast rejection used by `execute_action`
    #[error("Not enough tokens: {requested} requested, {available} available")]
    InsufficientTokens { requested: u64, available: u64 },

    /// A failure raised by the caller's own work
    #[error("Rate limit error occurred because of: {0}")]
    Action(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl RateLimitError {
    /// Wrap an arbitrary failure cause into a rate limit error.
    pub fn from_reason<E>(reason: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        RateLimitError::Action(reason.into())
    }

    /// Whether this error is the cancellation signal of a queued acquire.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, RateLimitError::Cancelled(_))
    }
}

/// Result type alias for Hivegate operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_reason_keeps_message_and_source() {
        let cause = std::io::Error::new(std::io::ErrorKind::Other, "upstream timed out");
        let err = RateLimitError::from_reason(cause);

        assert_eq!(
            err.to_string(),
            "Rate limit error occurred because of: upstream timed out"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_from_reason_accepts_plain_strings() {
        let err = RateLimitError::from_reason("not enough tokens");
        assert_eq!(
            err.to_string(),
            "Rate limit error occurred because of: not enough tokens"
        );
    }

    #[test]
    fn test_cancelled_is_distinguishable() {
        assert!(RateLimitError::Cancelled(ActionId::new(3)).is_cancelled());
        assert!(!RateLimitError::NotQueued(ActionId::new(3)).is_cancelled());
        assert!(!RateLimitError::from_reason("boom").is_cancelled());
    }
}
