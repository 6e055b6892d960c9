//! Rate limiting logic and state management.

mod action;
mod backend;
mod limiter;
mod options;
mod registry;
mod schedule;
mod timespan;
mod unlimited;

pub use action::{ActionId, CancelHook, RateLimitAction};
pub use backend::RateLimiter;
pub use limiter::SingleProcessRateLimiter;
pub use options::RateLimiterOptions;
pub use registry::{RateLimiterFactory, RateLimiterRegistry, UnlimitedRegistry, DEFAULT_RESOURCE_ID};
pub use timespan::{timespan_to_millis, TimeUnit, Timespan};
pub use unlimited::UnlimitedRateLimiter;
