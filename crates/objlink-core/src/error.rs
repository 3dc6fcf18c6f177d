//! Shared error type across objlink crates.

use thiserror::Error;

/// Stable error codes (safe to log, match on, or forward to peers).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCode {
    /// Connection was never established.
    NotConnected,
    /// Broker handle is closed or unreachable.
    TransportUnavailable,
    /// No reply arrived within the request window.
    Timeout,
    /// Malformed inbound payload.
    Decode,
    /// Outbound payload could not be serialized.
    Encode,
    /// Message cannot be answered.
    NoReplyChannel,
    /// Subscriber queue overflowed and messages were dropped.
    SlowConsumer,
    /// A registered method handler failed.
    Handler,
    /// Invalid configuration.
    BadConfig,
    /// Unsupported config version.
    UnsupportedVersion,
    /// Internal error.
    Internal,
}

impl ErrorCode {
    /// String representation used in logs and metrics labels.
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::NotConnected => "NOT_CONNECTED",
            ErrorCode::TransportUnavailable => "TRANSPORT_UNAVAILABLE",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Decode => "DECODE",
            ErrorCode::Encode => "ENCODE",
            ErrorCode::NoReplyChannel => "NO_REPLY_CHANNEL",
            ErrorCode::SlowConsumer => "SLOW_CONSUMER",
            ErrorCode::Handler => "HANDLER",
            ErrorCode::BadConfig => "BAD_CONFIG",
            ErrorCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

/// Shared result type.
pub type Result<T> = std::result::Result<T, ObjLinkError>;

/// Unified error type used by core and client.
#[derive(Debug, Clone, Error)]
pub enum ObjLinkError {
    #[error("not connected")]
    NotConnected,
    #[error("transport unavailable: {0}")]
    TransportUnavailable(String),
    #[error("request timed out: {topic}.{member}")]
    Timeout { topic: String, member: String },
    #[error("decode failed: {0}")]
    Decode(String),
    #[error("encode failed: {0}")]
    Encode(String),
    #[error("message has no reply channel")]
    NoReplyChannel,
    #[error("slow consumer: {0} messages dropped")]
    SlowConsumer(u64),
    #[error("handler failed: {0}")]
    Handler(String),
    #[error("bad config: {0}")]
    BadConfig(String),
    #[error("unsupported config version")]
    UnsupportedVersion,
    #[error("internal: {0}")]
    Internal(String),
}

impl ObjLinkError {
    /// Map an error to its stable code.
    pub fn code(&self) -> ErrorCode {
        match self {
            ObjLinkError::NotConnected => ErrorCode::NotConnected,
            ObjLinkError::TransportUnavailable(_) => ErrorCode::TransportUnavailable,
            ObjLinkError::Timeout { .. } => ErrorCode::Timeout,
            ObjLinkError::Decode(_) => ErrorCode::Decode,
            ObjLinkError::Encode(_) => ErrorCode::Encode,
            ObjLinkError::NoReplyChannel => ErrorCode::NoReplyChannel,
            ObjLinkError::SlowConsumer(_) => ErrorCode::SlowConsumer,
            ObjLinkError::Handler(_) => ErrorCode::Handler,
            ObjLinkError::BadConfig(_) => ErrorCode::BadConfig,
            ObjLinkError::UnsupportedVersion => ErrorCode::UnsupportedVersion,
            ObjLinkError::Internal(_) => ErrorCode::Internal,
        }
    }

    /// Whether the failure is a request timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ObjLinkError::Timeout { .. })
    }
}
