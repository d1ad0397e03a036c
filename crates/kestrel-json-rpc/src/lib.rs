//! # JSON-RPC 2.0 Message Model
//!
//! A pure, transport-agnostic JSON-RPC 2.0 message model. This crate provides
//! the wire types and inbound-frame classification for JSON-RPC without any
//! transport-specific or runtime-specific code.
//!
//! ## Features
//! - Full JSON-RPC 2.0 wire compliance
//! - Transport agnostic (works with stdio, SSE, WebSocket, channels, etc.)
//! - Request / response / notification / error object types
//! - Single-pass classification of inbound frames via [`JsonRpcFrame`]

pub mod error;
pub mod message;
pub mod notification;
pub mod request;
pub mod response;
pub mod types;

// Re-export main types
pub use error::{JsonRpcError, JsonRpcErrorCode, JsonRpcErrorObject};
pub use message::{JsonRpcFrame, parse_message};
pub use notification::JsonRpcNotification;
pub use request::JsonRpcRequest;
pub use response::{JsonRpcMessage, JsonRpcResponse};
pub use types::{JsonRpcVersion, RequestId};

/// JSON-RPC 2.0 version constant
pub const JSONRPC_VERSION: &str = "2.0";

/// Standard JSON-RPC 2.0 error codes
pub mod error_codes {
    pub const PARSE_ERROR: i64 = -32700;
    pub const INVALID_REQUEST: i64 = -32600;
    pub const METHOD_NOT_FOUND: i64 = -32601;
    pub const INVALID_PARAMS: i64 = -32602;
    pub const INTERNAL_ERROR: i64 = -32603;

    // Server error range: -32099 to -32000
    pub const SERVER_ERROR_START: i64 = -32099;
    pub const SERVER_ERROR_END: i64 = -32000;
}
