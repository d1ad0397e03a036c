//! The handle given to inbound handlers.
//!
//! Created exactly once, the instant the handshake completes, and passed
//! into every subsequent handler invocation so handlers can originate their
//! own outbound calls on the same session (server-initiated sampling,
//! progress updates, logging). Holds the session weakly: an exchange kept
//! alive by application code cannot keep a closed session's state alive,
//! and calls on a dead session fail with [`SessionError::Closed`].

use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;

use kestrel_json_rpc::{JsonRpcNotification, RequestId};
use kestrel_protocol::{
    CancelledNotification, ClientCapabilities, Implementation, LoggingLevel,
    LoggingMessageNotification, ProgressNotification, ProtocolVersion,
};

use crate::error::{SessionError, SessionResult};
use crate::handshake::ClientHandshake;
use crate::session::{RequestOptions, Session, SessionInner};

/// Per-session handle for originating outbound calls from inside handlers
#[derive(Clone)]
pub struct Exchange {
    session: Weak<SessionInner>,
    client: Arc<ClientHandshake>,
}

impl Exchange {
    pub(crate) fn new(session: &Arc<SessionInner>, client: Arc<ClientHandshake>) -> Self {
        Self {
            session: Arc::downgrade(session),
            client,
        }
    }

    fn session(&self) -> SessionResult<Session> {
        self.session
            .upgrade()
            .map(Session::from_inner)
            .ok_or(SessionError::Closed)
    }

    /// Send a request on the owning session and await its result
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<Value> {
        self.session()?.send_request(method, params).await
    }

    /// Send a request with per-call options (timeout override, reply-less)
    pub async fn send_request_with(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> SessionResult<Value> {
        self.session()?
            .send_request_with(method, params, options)
            .await
    }

    /// Send a request and decode the result payload into `T`
    pub async fn send_request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<T> {
        self.session()?.send_request_as(method, params).await
    }

    /// Send a notification on the owning session
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<()> {
        self.session()?.send_notification(method, params).await
    }

    /// Send a typed lifecycle notification
    pub async fn notify(
        &self,
        notification: impl Into<JsonRpcNotification>,
    ) -> SessionResult<()> {
        let n = notification.into();
        self.session()?.send_notification(&n.method, n.params).await
    }

    /// Probe peer liveness with the fixed short ping timeout
    pub async fn ping(&self) -> SessionResult<()> {
        self.session()?.ping().await
    }

    /// Send a progress update for a long-running request
    pub async fn notify_progress(
        &self,
        progress_token: impl Into<String>,
        progress: u64,
        total: Option<u64>,
    ) -> SessionResult<()> {
        let mut notification = ProgressNotification::new(progress_token, progress);
        if let Some(total) = total {
            notification = notification.with_total(total);
        }
        self.notify(notification).await
    }

    /// Tell the peer an in-flight request is cancelled
    pub async fn notify_cancelled(
        &self,
        request_id: RequestId,
        reason: Option<&str>,
    ) -> SessionResult<()> {
        let mut notification = CancelledNotification::new(request_id);
        if let Some(reason) = reason {
            notification = notification.with_reason(reason);
        }
        self.notify(notification).await
    }

    /// Push a log message to the peer
    pub async fn notify_log(&self, level: LoggingLevel, data: Value) -> SessionResult<()> {
        self.notify(LoggingMessageNotification::new(level, data)).await
    }

    /// Capabilities the client declared at initialize time
    pub fn client_capabilities(&self) -> &ClientCapabilities {
        &self.client.capabilities
    }

    /// Identity the client declared at initialize time
    pub fn client_info(&self) -> &Implementation {
        &self.client.client_info
    }

    /// Protocol version negotiated during the handshake
    pub fn protocol_version(&self) -> ProtocolVersion {
        self.client.protocol_version
    }

    /// The owning session's id, if the session is still alive
    pub fn session_id(&self) -> Option<String> {
        self.session.upgrade().map(|inner| inner.id().to_string())
    }

    /// Default request timeout of the owning session, if still alive
    pub fn request_timeout(&self) -> Option<Duration> {
        self.session
            .upgrade()
            .map(|inner| inner.config().request_timeout)
    }

    /// An exchange bound to no session; every call fails with `Closed`
    #[cfg(test)]
    pub(crate) fn detached_for_tests() -> Self {
        Self {
            session: Weak::new(),
            client: Arc::new(ClientHandshake {
                protocol_version: ProtocolVersion::CURRENT,
                capabilities: ClientCapabilities::default(),
                client_info: Implementation::new("detached", "0.0.0"),
            }),
        }
    }
}

impl fmt::Debug for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Exchange")
            .field("session_id", &self.session_id())
            .field("client", &self.client.client_info.name)
            .finish()
    }
}
