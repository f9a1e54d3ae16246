//! hookguard core: invocation and decision types, the hook wire protocol, and
//! the shared error surface.
//!
//! This crate defines the contracts shared by the policy engine, its binary,
//! and any embedding host. It carries no runtime, storage or regex
//! dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! Malformed requests surface as `HookGuardError::Decode` so the hook
//! process never crashes into an ambiguous exit status.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod decision;
pub mod error;
pub mod invocation;
pub mod protocol;

/// Shared result type.
pub use error::{Result, HookGuardError};
pub use decision::{Action, Decision};
pub use invocation::{Invocation, InvocationKind, Payload};
