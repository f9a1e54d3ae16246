//! Transport layer: how requests reach the engine.
//!
//! - `stdio`: one request per process (hook mode), exit status carries the verdict.
//! - `http`: long-running service (serve mode), counters live in memory.

pub mod http;
pub mod stdio;
