use std::time::Duration;

use serde_json::Value;

use kestrel_json_rpc::RequestId;

use crate::transport::TransportError;

/// Convenience alias for session-level results
pub type SessionResult<T> = Result<T, SessionError>;

/// Failures surfaced to outbound callers and session embedders.
///
/// Every failure that has a caller is delivered as one of these variants;
/// failures without a caller (orphan replies, notification handler faults)
/// are logged and absorbed so the session keeps running.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The transport could not physically send the message
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// No reply arrived within the wait bound; the request id was abandoned
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The peer answered with a JSON-RPC error object
    #[error("peer returned error {code}: {message}")]
    Peer {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    /// The session is closed (or closing) and accepts no new work
    #[error("session closed")]
    Closed,

    /// The handshake state machine refused a transition
    #[error("handshake violation: {0}")]
    Handshake(String),

    /// An outbound request id collided with one still pending
    #[error("duplicate request id: {0}")]
    DuplicateRequestId(RequestId),

    /// A payload could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl SessionError {
    /// Whether this failure means the session itself is unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Closed | SessionError::Transport(TransportError::Closed)
        )
    }
}
