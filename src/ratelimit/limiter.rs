//! Core rate limiter implementation.
//!
//! Tokens taken by granted actions are not handed back on release. A
//! single sweep, fired one rate window after the first grant it covers,
//! reclaims the tokens of every released action and then grants queued
//! actions in arrival order. The sweep re-arms itself while any action
//! is still in flight.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, trace, warn};

use super::action::{ActionId, RateLimitAction};
use super::backend::RateLimiter;
use super::options::RateLimiterOptions;
use super::schedule::{self, SweepSchedule};
use crate::error::{RateLimitError, Result};

/// A rate limiter whose state lives in the current process.
///
/// This struct is thread-safe and can be shared across multiple tasks.
/// It must be used from within a tokio runtime.
pub struct SingleProcessRateLimiter {
    inner: Arc<Inner>,
}

struct Inner {
    options: RateLimiterOptions,
    window: Duration,
    auto_release: Duration,
    state: Mutex<LimiterState>,
}

struct LimiterState {
    tokens_left: u64,
    /// Actions waiting for tokens, in arrival order
    queue: VecDeque<QueuedAction>,
    /// Granted actions whose tokens have not been reclaimed yet
    in_flight: HashMap<ActionId, InFlightAction>,
    sweep: SweepSchedule,
    last_id: u64,
}

struct QueuedAction {
    action: Arc<RateLimitAction>,
    grant: oneshot::Sender<Arc<RateLimitAction>>,
}

struct InFlightAction {
    action: Arc<RateLimitAction>,
    deadline: Instant,
    auto_release: JoinHandle<()>,
}

impl SingleProcessRateLimiter {
    /// Create a new rate limiter.
    pub fn new(options: RateLimiterOptions) -> Result<Self> {
        options.validate()?;

        debug!(
            options = %serde_json::to_string(&options).unwrap_or_default(),
            "Instantiate a new rate limiter"
        );

        let state = LimiterState {
            tokens_left: options.tokens_per_timespan,
            queue: VecDeque::new(),
            in_flight: HashMap::new(),
            sweep: SweepSchedule::default(),
            last_id: 0,
        };

        Ok(Self {
            inner: Arc::new(Inner {
                window: options.window(),
                auto_release: options.auto_release(),
                options,
                state: Mutex::new(state),
            }),
        })
    }

    pub fn options(&self) -> &RateLimiterOptions {
        &self.inner.options
    }

    /// Number of tokens available right now.
    pub fn tokens_left(&self) -> u64 {
        self.inner.state.lock().tokens_left
    }

    /// Snapshot of the queued actions, oldest first.
    pub fn pending_actions(&self) -> Vec<Arc<RateLimitAction>> {
        let state = self.inner.state.lock();
        state.queue.iter().map(|q| q.action.clone()).collect()
    }

    /// Number of granted actions whose tokens are not yet reclaimed.
    pub fn in_flight_count(&self) -> usize {
        self.inner.state.lock().in_flight.len()
    }

    /// Obtain an action worth `tokens`.
    ///
    /// Resolves immediately when enough tokens are left, otherwise once a
    /// sweep grants the queued action. Dropping the returned future while
    /// queued withdraws the action from the queue.
    pub async fn acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        if tokens == 0 {
            return Err(RateLimitError::InvalidTokens(tokens));
        }

        let (id, granted) = {
            let mut guard = self.inner.state.lock();
            let state = &mut *guard;
            let action = self.inner.create_action(state, tokens);

            if state.tokens_left >= tokens {
                self.inner.grant(state, action.clone());
                return Ok(action);
            }

            if tokens > self.inner.options.tokens_per_timespan {
                warn!(
                    action = %action.id(),
                    tokens = tokens,
                    capacity = self.inner.options.tokens_per_timespan,
                    "Action needs more tokens than the limiter holds and will never be granted"
                );
            }

            trace!(action = %action.id(), tokens = tokens, "Enqueue action");
            let (grant, granted) = oneshot::channel();
            let id = action.id();
            state.queue.push_back(QueuedAction { action, grant });
            (id, granted)
        };

        let mut waiter = Waiter {
            limiter: &self.inner,
            id,
            granted,
            armed: true,
        };

        match (&mut waiter.granted).await {
            Ok(action) => {
                waiter.armed = false;
                Ok(action)
            }
            Err(_) => {
                waiter.armed = false;
                Err(RateLimitError::Cancelled(id))
            }
        }
    }

    /// Obtain an action worth `tokens` only if they are available right now.
    ///
    /// Never queues: fails with [`RateLimitError::InsufficientTokens`]
    /// when the tokens left do not cover the request.
    pub fn try_acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        if tokens == 0 {
            return Err(RateLimitError::InvalidTokens(tokens));
        }

        let mut guard = self.inner.state.lock();
        let state = &mut *guard;
        if state.tokens_left < tokens {
            return Err(RateLimitError::InsufficientTokens {
                requested: tokens,
                available: state.tokens_left,
            });
        }

        let action = self.inner.create_action(state, tokens);
        self.inner.grant(state, action.clone());
        Ok(action)
    }

    /// Release an action before its auto-release deadline.
    ///
    /// The tokens come back at the next sweep. Releasing an unknown or
    /// already reclaimed action only logs a warning.
    pub fn release(&self, action: &RateLimitAction) {
        self.inner.release(action.id(), false);
    }
}

impl Inner {
    fn create_action(self: &Arc<Self>, state: &mut LimiterState, tokens: u64) -> Arc<RateLimitAction> {
        state.last_id += 1;
        let limiter = Arc::downgrade(self);

        Arc::new(RateLimitAction::new(
            ActionId::new(state.last_id),
            tokens,
            Box::new(move |action| match limiter.upgrade() {
                Some(limiter) => limiter.cancel(action.id()),
                None => Err(RateLimitError::NotQueued(action.id())),
            }),
        ))
    }

    /// Caller guarantees `state.tokens_left >= action.tokens()`.
    fn grant(self: &Arc<Self>, state: &mut LimiterState, action: Arc<RateLimitAction>) {
        let id = action.id();
        trace!(action = %id, tokens = action.tokens(), "Grant action");

        action.start_action(Utc::now());
        state.tokens_left -= action.tokens();

        let deadline = Instant::now() + self.auto_release;
        let auto_release = schedule::run_at(deadline, Arc::downgrade(self), move |limiter| {
            limiter.release(id, true)
        });
        state.in_flight.insert(
            id,
            InFlightAction {
                action,
                deadline,
                auto_release,
            },
        );

        self.schedule_sweep(state);
    }

    fn schedule_sweep(self: &Arc<Self>, state: &mut LimiterState) {
        if state.sweep.arm() {
            trace!(delay_ms = self.window.as_millis() as u64, "Schedule token reclaim");
            let deadline = Instant::now() + self.window;
            schedule::run_at(deadline, Arc::downgrade(self), |limiter| limiter.sweep());
        }
    }

    fn release(&self, id: ActionId, auto: bool) {
        let state = self.state.lock();
        let Some(entry) = state.in_flight.get(&id) else {
            if auto {
                debug!(action = %id, "Auto-release found action already reclaimed");
            } else {
                warn!(action = %id, "Can't find action to release");
            }
            return;
        };

        if !auto {
            entry.auto_release.abort();
        }
        trace!(action = %id, auto_release = auto, "Release action");
        entry.action.complete_action(Utc::now());
    }

    fn cancel(&self, id: ActionId) -> Result<()> {
        let mut state = self.state.lock();
        let Some(position) = state.queue.iter().position(|q| q.action.id() == id) else {
            return Err(RateLimitError::NotQueued(id));
        };

        trace!(action = %id, "Cancel action");
        // Dropping the grant sender fails the pending acquire.
        let cancelled = state.queue.remove(position);
        drop(state);
        drop(cancelled);
        Ok(())
    }

    fn withdraw(&self, id: ActionId) {
        let mut state = self.state.lock();
        if let Some(position) = state.queue.iter().position(|q| q.action.id() == id) {
            trace!(action = %id, "Withdraw abandoned action");
            state.queue.remove(position);
        }
    }

    /// Reclaim the tokens of released actions, then drain the queue.
    fn sweep(self: &Arc<Self>) {
        let now = Instant::now();
        let stamp = Utc::now();
        let mut guard = self.state.lock();
        let state = &mut *guard;

        let mut reclaimed: u64 = 0;
        state.in_flight.retain(|id, entry| {
            if !entry.action.is_released() && entry.deadline <= now {
                trace!(action = %id, "Auto-release action");
                entry.auto_release.abort();
                entry.action.complete_action(stamp);
            }
            if entry.action.is_released() {
                reclaimed = reclaimed.saturating_add(entry.action.tokens());
                false
            } else {
                true
            }
        });

        let capacity = self.options.tokens_per_timespan;
        let tokens_left = state.tokens_left.saturating_add(reclaimed);
        if tokens_left > capacity {
            error!(
                tokens_left = tokens_left,
                capacity = capacity,
                "Reclaimed more tokens than the limiter holds"
            );
        }
        state.tokens_left = tokens_left.min(capacity);

        trace!(
            reclaimed = reclaimed,
            tokens_left = state.tokens_left,
            queued = state.queue.len(),
            "Reclaim tokens"
        );

        while state
            .queue
            .front()
            .is_some_and(|queued| queued.action.tokens() <= state.tokens_left)
        {
            let Some(queued) = state.queue.pop_front() else {
                break;
            };
            let action = queued.action.clone();
            self.grant(state, queued.action);

            if queued.grant.send(action.clone()).is_err() {
                // The waiter is gone; give the tokens back at the next sweep.
                debug!(action = %action.id(), "Waiter dropped before grant, releasing action");
                if let Some(entry) = state.in_flight.get(&action.id()) {
                    entry.auto_release.abort();
                }
                action.complete_action(stamp);
            }
        }

        state.sweep.disarm();
        if !state.in_flight.is_empty() {
            self.schedule_sweep(state);
        }
    }
}

/// Cleans up after an acquire future dropped before it saw its grant.
///
/// A still queued action is withdrawn. An action the sweep already
/// granted is released so its tokens return at the next sweep.
struct Waiter<'a> {
    limiter: &'a Inner,
    id: ActionId,
    granted: oneshot::Receiver<Arc<RateLimitAction>>,
    armed: bool,
}

impl Drop for Waiter<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Grants are sent under the state lock, so once the withdrawal
        // has run a granted action is already in the channel.
        self.limiter.withdraw(self.id);
        if let Ok(action) = self.granted.try_recv() {
            debug!(action = %action.id(), "Acquire dropped after grant, releasing action");
            self.limiter.release(action.id(), false);
        }
    }
}

#[async_trait]
impl RateLimiter for SingleProcessRateLimiter {
    fn options(&self) -> &RateLimiterOptions {
        SingleProcessRateLimiter::options(self)
    }

    async fn tokens_left(&self) -> u64 {
        SingleProcessRateLimiter::tokens_left(self)
    }

    async fn pending_actions(&self) -> Vec<Arc<RateLimitAction>> {
        SingleProcessRateLimiter::pending_actions(self)
    }

    async fn acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        SingleProcessRateLimiter::acquire(self, tokens).await
    }

    async fn try_acquire(&self, tokens: u64) -> Result<Arc<RateLimitAction>> {
        SingleProcessRateLimiter::try_acquire(self, tokens)
    }

    async fn release(&self, action: &RateLimitAction) -> Result<()> {
        SingleProcessRateLimiter::release(self, action);
        Ok(())
    }
}
