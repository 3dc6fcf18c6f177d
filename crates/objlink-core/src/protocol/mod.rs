//! Protocol modules.
//!
//! Every message on a topic is a JSON envelope naming the event kind, the
//! object id (equal to the topic), the member, and an opaque payload.
//!
//! Decoding is panic-free: malformed input is reported as `ObjLinkError`
//! instead of panicking, keeping dispatch loops resilient to bad peers.

pub mod envelope;
