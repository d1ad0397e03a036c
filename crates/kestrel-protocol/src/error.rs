use kestrel_json_rpc::JsonRpcErrorObject;

/// Convenience alias for protocol-level results
pub type ProtocolResult<T> = Result<T, ProtocolError>;

/// Errors raised while interpreting protocol payloads
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("protocol version mismatch: expected {expected}, got {actual}")]
    VersionMismatch { expected: String, actual: String },

    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("handshake violation: {0}")]
    HandshakeViolation(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ProtocolError {
    /// Convert to the JSON-RPC error object sent to the peer
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            ProtocolError::VersionMismatch { .. } => {
                JsonRpcErrorObject::invalid_params(&self.to_string())
            }
            ProtocolError::InvalidParameters(msg) => JsonRpcErrorObject::invalid_params(msg),
            ProtocolError::HandshakeViolation(msg) => {
                JsonRpcErrorObject::invalid_request(Some(msg.clone()), None)
            }
            ProtocolError::Serialization(e) => JsonRpcErrorObject::invalid_params(&e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kestrel_json_rpc::error_codes;

    #[test]
    fn test_error_object_codes() {
        let err = ProtocolError::InvalidParameters("missing clientInfo".to_string());
        assert_eq!(err.to_error_object().code, error_codes::INVALID_PARAMS);

        let err = ProtocolError::HandshakeViolation("already initialized".to_string());
        assert_eq!(err.to_error_object().code, error_codes::INVALID_REQUEST);
    }
}
