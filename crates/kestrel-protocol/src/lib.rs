//! # Session Protocol Vocabulary
//!
//! The method names, handshake payloads, and lifecycle notifications of the
//! kestrel session protocol, layered on the pure JSON-RPC model from
//! `kestrel-json-rpc`.
//!
//! A session starts with an `initialize` request carrying the client's
//! identity and capabilities, answered with the server's own; the client
//! then confirms with a `notifications/initialized` notification, after
//! which application traffic may flow in both directions.

pub mod error;
pub mod initialize;
pub mod notifications;
pub mod ping;
pub mod version;

pub use error::{ProtocolError, ProtocolResult};
pub use initialize::{
    ClientCapabilities, ElicitationCapabilities, Implementation, InitializeRequest,
    InitializeResult, LoggingCapabilities, PromptsCapabilities, ResourcesCapabilities,
    RootsCapabilities, SamplingCapabilities, ServerCapabilities, ToolsCapabilities,
};
pub use notifications::{
    CancelledNotification, InitializedNotification, LoggingLevel, LoggingMessageNotification,
    ProgressNotification,
};
pub use ping::{EmptyResult, PingRequest};
pub use version::ProtocolVersion;

// Re-export the JSON-RPC model for downstream convenience
pub use kestrel_json_rpc::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcFrame, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, JsonRpcResponse, RequestId,
};

/// Wire method names used by the session lifecycle
pub mod methods {
    /// Handshake request opening a session
    pub const INITIALIZE: &str = "initialize";
    /// Handshake confirmation notification
    pub const INITIALIZED: &str = "notifications/initialized";
    /// Liveness probe
    pub const PING: &str = "ping";
    /// Progress update for a long-running request
    pub const PROGRESS: &str = "notifications/progress";
    /// Cancellation of an in-flight request
    pub const CANCELLED: &str = "notifications/cancelled";
    /// Log message pushed to the peer
    pub const MESSAGE: &str = "notifications/message";
}
