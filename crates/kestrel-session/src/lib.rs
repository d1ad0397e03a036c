//! # Session Engine
//!
//! A bidirectional JSON-RPC session engine: one [`Session`] per connected
//! peer, correlating outbound requests to inbound replies, gating inbound
//! application dispatch behind the `initialize`/`initialized` handshake, and
//! handing handlers an [`Exchange`] so they can originate their own calls on
//! the same session.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use kestrel_session::{
//!     DuplexTransport, HandlerRegistry, Session, SessionConfig,
//! };
//!
//! # async fn example() {
//! let handlers = Arc::new(HandlerRegistry::new().request_fn(
//!     "echo",
//!     |_exchange, params| async move { Ok(params.unwrap_or_default()) },
//! ));
//!
//! let ((transport, inbound), _peer) = DuplexTransport::pair(64);
//! let session = Session::new("session-1", SessionConfig::default(), transport, handlers);
//!
//! let loop_session = session.clone();
//! tokio::spawn(async move { loop_session.run(inbound).await });
//!
//! // ... once the peer completes the handshake, handlers run with an Exchange
//! session.close().await;
//! # }
//! ```

pub mod config;
pub mod error;
pub mod exchange;
pub mod handler;
pub mod handshake;
pub mod id;
pub mod manager;
pub mod pending;
pub mod session;
pub mod transport;

pub use config::SessionConfig;
pub use error::{SessionError, SessionResult};
pub use exchange::Exchange;
pub use handler::{
    HandlerError, HandlerRegistry, HandlerResult, NotificationHandler, RequestHandler,
};
pub use handshake::{ClientHandshake, SessionState};
pub use id::RequestIdGenerator;
pub use manager::{SessionManager, SessionSummary};
pub use pending::PendingRequests;
pub use session::{RequestOptions, Session};
pub use transport::{DuplexTransport, Transport, TransportError};

// Re-export the protocol vocabulary for downstream convenience
pub use kestrel_protocol as protocol;
