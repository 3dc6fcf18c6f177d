//! Remote objects: per-object subscription, method table, property cache,
//! listener sets, and inbound dispatch.

mod dispatch;
mod listeners;
mod remote;

pub use listeners::{ListenerId, ListenerSet};
pub use remote::{MethodHandler, ObjectOptions, RemoteObject};
