//! Top-level facade crate for objlink.
//!
//! Re-exports the protocol core and the client runtime so users can depend on a single crate.

pub mod core {
    pub use objlink_core::*;
}

pub mod client {
    pub use objlink_client::*;
}
