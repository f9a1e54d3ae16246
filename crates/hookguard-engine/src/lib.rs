//! hookguard engine library entry.
//!
//! This crate wires config, the policy pipeline (rules, matcher, rate
//! limiter, resolver), the audit sink and the two transports into the
//! `hookguard` binary. It is also consumed by integration tests.

pub mod app_state;
pub mod audit;
pub mod config;
pub mod obs;
pub mod ops;
pub mod policy;
pub mod ratelimit;
pub mod router;
pub mod transport;
