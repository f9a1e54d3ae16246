//! Top-level facade crate for hookguard.
//!
//! Re-exports core types and the engine library so users can depend on a single crate.

pub mod core {
    pub use hookguard_core::*;
}

pub mod engine {
    pub use hookguard_engine::*;
}
