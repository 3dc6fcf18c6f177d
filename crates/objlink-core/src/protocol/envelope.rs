//! Object event envelope (JSON).
//!
//! Wire shape: `{"type": "prop"|"inv"|"sig", "id": .., "member": .., "data": ..}`.
//! `data` is kept as a `serde_json::Value` because property change detection
//! needs to compare payloads.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ObjLinkError, Result};

/// Event kind (field name is `type` in JSON).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// Property value sync.
    #[serde(rename = "prop")]
    Property,
    /// Method invocation (request and reply).
    #[serde(rename = "inv")]
    Invoke,
    /// Fire-and-forget signal.
    #[serde(rename = "sig")]
    Signal,
}

impl EventKind {
    /// Wire tag, also used as a metrics label.
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Property => "prop",
            EventKind::Invoke => "inv",
            EventKind::Signal => "sig",
        }
    }
}

/// One message addressed to a remote object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: EventKind,
    /// Object id (also the topic).
    pub id: String,
    /// Property, method, or signal name.
    pub member: String,
    /// Arguments, return value, or property value.
    #[serde(default)]
    pub data: Value,
}

impl Envelope {
    pub fn new(kind: EventKind, id: impl Into<String>, member: impl Into<String>, data: Value) -> Self {
        Self {
            kind,
            id: id.into(),
            member: member.into(),
            data,
        }
    }

    pub fn property(id: impl Into<String>, member: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::Property, id, member, data)
    }

    pub fn invoke(id: impl Into<String>, member: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::Invoke, id, member, data)
    }

    pub fn signal(id: impl Into<String>, member: impl Into<String>, data: Value) -> Self {
        Self::new(EventKind::Signal, id, member, data)
    }

    /// Serialize to UTF-8 JSON bytes.
    pub fn encode(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| ObjLinkError::Encode(format!("envelope json encode failed: {e}")))
    }

    /// Parse UTF-8 JSON bytes. Unknown `type` tags and unknown fields are rejected.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        serde_json::from_slice(buf)
            .map_err(|e| ObjLinkError::Decode(format!("invalid envelope json: {e}")))
    }
}
