//! Rate-limited action handles.

use std::fmt;
use std::sync::OnceLock;

use chrono::{DateTime, Utc};

use crate::error::Result;

/// Identifier of an action, unique within one limiter instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u64);

impl ActionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Callback run when a queued action is cancelled.
pub type CancelHook = Box<dyn Fn(&RateLimitAction) -> Result<()> + Send + Sync>;

/// A unit of weighted work admitted or queued by a rate limiter.
///
/// An action is *granted* once `started` is set and *released* once
/// `performed` is set. Both timestamps are write-once.
pub struct RateLimitAction {
    id: ActionId,
    tokens: u64,
    started: OnceLock<DateTime<Utc>>,
    performed: OnceLock<DateTime<Utc>>,
    on_cancel: CancelHook,
}

impl RateLimitAction {
    pub fn new(id: ActionId, tokens: u64, on_cancel: CancelHook) -> Self {
        Self {
            id,
            tokens,
            started: OnceLock::new(),
            performed: OnceLock::new(),
            on_cancel,
        }
    }

    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Number of tokens the action holds once granted.
    pub fn tokens(&self) -> u64 {
        self.tokens
    }

    /// When the action was granted, if it has been.
    pub fn started(&self) -> Option<DateTime<Utc>> {
        self.started.get().copied()
    }

    /// When the action was released, if it has been.
    pub fn performed(&self) -> Option<DateTime<Utc>> {
        self.performed.get().copied()
    }

    pub fn is_granted(&self) -> bool {
        self.started.get().is_some()
    }

    pub fn is_released(&self) -> bool {
        self.performed.get().is_some()
    }

    /// Mark the action as granted. Later calls keep the first timestamp.
    pub fn start_action(&self, at: DateTime<Utc>) {
        let _ = self.started.set(at);
    }

    /// Mark the action as released. Later calls keep the first timestamp.
    pub fn complete_action(&self, at: DateTime<Utc>) {
        let _ = self.performed.set(at);
    }

    /// Cancel the action while it waits in the queue.
    ///
    /// Only meaningful for queued actions; the limiter reports
    /// [`RateLimitError::NotQueued`](crate::error::RateLimitError::NotQueued)
    /// for anything else.
    pub fn cancel(&self) -> Result<()> {
        (self.on_cancel)(self)
    }
}

impl fmt::Debug for RateLimitAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimitAction")
            .field("id", &self.id)
            .field("tokens", &self.tokens)
            .field("started", &self.started())
            .field("performed", &self.performed())
            .finish()
    }
}
