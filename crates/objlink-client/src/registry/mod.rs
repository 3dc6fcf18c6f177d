//! Connection-scoped object registry.
//!
//! One `Connection` owns a transport handle and memoizes one `RemoteObject`
//! per object id; every per-object operation is a lookup followed by the
//! matching `RemoteObject` call.

mod connection;

pub use connection::Connection;
