//! objlink core: wire-level envelope, error types, and stable error codes.
//!
//! This crate defines the contracts shared by the client runtime and any
//! other process speaking the object protocol. It carries no transport or
//! runtime dependencies so it can be reused in multiple contexts.
//!
//! # Defensive guarantees
//! Panics, `unwrap`, and `expect` are compile-denied here
//! (`#![deny(clippy::panic, clippy::unwrap_used, clippy::expect_used)]`).
//! All fallible paths must surface as `ObjLinkError`/`Result` so a peer
//! sending malformed envelopes cannot crash a dispatch loop.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]

pub mod error;
pub mod protocol;

/// Shared result type.
pub use error::{ErrorCode, ObjLinkError, Result};
pub use protocol::envelope::{Envelope, EventKind};
