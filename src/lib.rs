//! Hivegate - In-process admission control
//!
//! This crate gates arbitrary actions so that no more than a configured
//! quota of weighted tokens is in flight per rate window. Excess demand
//! is queued and granted in arrival order as a periodic sweep reclaims
//! the tokens of released actions.

pub mod config;
pub mod error;
pub mod interop;
pub mod ratelimit;
