//! objlink client library entry.
//!
//! Wires the broker transport, the per-object dispatch runtime, and the
//! connection-scoped registry into one client stack. A process uses it to
//! expose objects (register methods, publish properties and signals) and to
//! consume them (request methods, listen for properties and signals).

pub mod config;
pub mod object;
pub mod obs;
pub mod registry;
pub mod transport;

pub use config::ClientConfig;
pub use object::{ListenerId, RemoteObject};
pub use registry::Connection;
pub use transport::MemoryBroker;
