//! Lightweight in-process metrics.
//!
//! Counters are stored as atomics and rendered in Prometheus text format by
//! the `/metrics` handler in serve mode. Hook mode keeps them only for the
//! lifetime of one request, so they matter there only through logs.

pub mod metrics;
