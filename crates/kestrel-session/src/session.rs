//! Session Engine
//!
//! Turns the ordered stream of inbound frames into correlated
//! request/response pairs and dispatched handler invocations, and provides
//! the outbound `send_request` / `send_notification` primitives with timeout
//! and cancellation semantics.
//!
//! ## Concurrency model
//!
//! Inbound frames arrive on one ordered stream and are classified by
//! [`Session::handle_inbound`]: replies resolve the correlation table
//! inline; requests and notifications are dispatched on spawned tasks so a
//! slow handler never blocks the reading of frame N+1. Outbound calls may
//! come from any number of concurrent tasks; the correlation table is the
//! only session state they contend on.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use kestrel_json_rpc::{
    JsonRpcError, JsonRpcErrorObject, JsonRpcFrame, JsonRpcMessage, JsonRpcNotification,
    JsonRpcRequest, RequestId,
};
use kestrel_protocol::{InitializeRequest, InitializeResult, methods};

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionResult};
use crate::exchange::Exchange;
use crate::handler::HandlerRegistry;
use crate::handshake::{ClientHandshake, Handshake, SessionState};
use crate::id::RequestIdGenerator;
use crate::pending::PendingRequests;
use crate::transport::Transport;

/// Per-call options for [`Session::send_request_with`]
#[derive(Debug, Clone)]
pub struct RequestOptions {
    /// Override of the session's default request timeout
    pub timeout: Option<Duration>,
    /// When false, the request is sent with an empty id and no correlation
    /// state; the call completes as soon as the transport accepts it
    pub expect_reply: bool,
}

impl RequestOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn fire_and_forget(mut self) -> Self {
        self.expect_reply = false;
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            expect_reply: true,
        }
    }
}

/// State shared by the session handle, its read loop, and its exchanges
pub(crate) struct SessionInner {
    id: Arc<str>,
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    handlers: Arc<HandlerRegistry>,
    pending: PendingRequests,
    ids: RequestIdGenerator,
    handshake: Handshake,
    /// Ids of inbound requests whose handlers are still running
    inflight_inbound: Mutex<HashSet<RequestId>>,
    /// Set once a close begins; new outbound work is refused from then on
    closing: AtomicBool,
    shutdown: CancellationToken,
    tasks: TaskTracker,
    last_active: Mutex<Instant>,
}

impl SessionInner {
    pub(crate) fn id(&self) -> &str {
        &self.id
    }

    pub(crate) fn config(&self) -> &SessionConfig {
        &self.config
    }
}

/// One logical, stateful JSON-RPC conversation bound to a single transport.
///
/// Cheap to clone; all clones share the same session state. Create one per
/// accepted connection, spawn [`Session::run`] with the transport's inbound
/// receiver, and use the clone from anywhere to issue outbound calls.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(
        id: impl Into<String>,
        config: SessionConfig,
        transport: Arc<dyn Transport>,
        handlers: Arc<HandlerRegistry>,
    ) -> Self {
        let id: Arc<str> = Arc::from(id.into());
        Self {
            inner: Arc::new(SessionInner {
                ids: RequestIdGenerator::new(&id),
                id,
                config,
                transport,
                handlers,
                pending: PendingRequests::new(),
                handshake: Handshake::new(),
                inflight_inbound: Mutex::new(HashSet::new()),
                closing: AtomicBool::new(false),
                shutdown: CancellationToken::new(),
                tasks: TaskTracker::new(),
                last_active: Mutex::new(Instant::now()),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    /// Stable session identifier, also the prefix of every generated
    /// request id
    pub fn id(&self) -> &str {
        &self.inner.id
    }

    /// Current handshake state
    pub fn state(&self) -> SessionState {
        self.inner.handshake.state()
    }

    /// Whether a close (graceful or forced) has begun
    pub fn is_closing(&self) -> bool {
        self.inner.closing.load(Ordering::Acquire)
    }

    /// Instant of the last send or receive, read by idle-session reaping
    pub fn last_active(&self) -> Instant {
        *self.inner.last_active.lock()
    }

    /// Number of outbound requests still awaiting a reply
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    /// The client's initialize-time declaration, once captured
    pub fn client_handshake(&self) -> Option<Arc<ClientHandshake>> {
        self.inner.handshake.client()
    }

    /// The exchange, once the handshake has completed; `None` if the
    /// session shuts down without completing it
    pub async fn exchange(&self) -> Option<Exchange> {
        self.inner.handshake.exchange().await
    }

    fn touch(&self) {
        *self.inner.last_active.lock() = Instant::now();
    }

    // === Outbound =========================================================

    /// Send a request and await its result, bounded by the session's
    /// default request timeout
    pub async fn send_request(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<Value> {
        self.send_request_with(method, params, RequestOptions::default())
            .await
    }

    /// Send a request and decode the result payload into `T`
    pub async fn send_request_as<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<T> {
        let value = self.send_request(method, params).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Send a request with per-call options.
    ///
    /// The caller observes exactly one of: the peer's result, the peer's
    /// error, a transport failure, a timeout, or session-closed, whichever
    /// happens first. A reply arriving after the timeout fired is an orphan
    /// and is discarded by the correlation table.
    pub async fn send_request_with(
        &self,
        method: &str,
        params: Option<Value>,
        options: RequestOptions,
    ) -> SessionResult<Value> {
        if self.is_closing() {
            return Err(SessionError::Closed);
        }

        if !options.expect_reply {
            let request = JsonRpcRequest::fire_and_forget(method, params);
            self.inner.transport.send(request.into()).await?;
            self.touch();
            return Ok(Value::Null);
        }

        let id = self.inner.ids.next_id();
        let rx = self.inner.pending.register(id.clone())?;

        let request = JsonRpcRequest::new(id.clone(), method, params);
        if let Err(e) = self.inner.transport.send(request.into()).await {
            self.inner.pending.abandon(&id);
            return Err(e.into());
        }
        self.touch();

        let wait = options.timeout.unwrap_or(self.inner.config.request_timeout);
        match tokio::time::timeout(wait, rx).await {
            Ok(Ok(Ok(reply))) => {
                self.touch();
                reply.into_result().map_err(|e| SessionError::Peer {
                    code: e.code,
                    message: e.message,
                    data: e.data,
                })
            }
            // Drained at close, or the sender vanished with the session
            Ok(Ok(Err(e))) => Err(e),
            Ok(Err(_)) => Err(SessionError::Closed),
            Err(_) => {
                self.inner.pending.abandon(&id);
                debug!(session_id = %self.inner.id, request_id = %id, method,
                    "request timed out");
                Err(SessionError::Timeout(wait))
            }
        }
    }

    /// Send a notification. Resolves when the transport accepts it; there
    /// is no reply to await.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> SessionResult<()> {
        if self.is_closing() {
            return Err(SessionError::Closed);
        }
        let notification = JsonRpcNotification::new(method, params);
        self.inner.transport.send(notification.into()).await?;
        self.touch();
        Ok(())
    }

    /// Probe peer liveness. Uses the fixed short ping timeout, not the
    /// session default.
    pub async fn ping(&self) -> SessionResult<()> {
        let options = RequestOptions::default().timeout(self.inner.config.ping_timeout);
        self.send_request_with(methods::PING, None, options)
            .await
            .map(|_| ())
    }

    // === Inbound ==========================================================

    /// Drive the session from the transport's inbound stream until the
    /// stream ends or the session is closed. Intended to be spawned.
    pub async fn run(&self, mut inbound: mpsc::Receiver<JsonRpcFrame>) {
        debug!(session_id = %self.inner.id, "session loop starting");
        loop {
            tokio::select! {
                _ = self.inner.shutdown.cancelled() => {
                    debug!(session_id = %self.inner.id, "session loop cancelled");
                    break;
                }
                frame = inbound.recv() => match frame {
                    Some(frame) => self.handle_inbound(frame).await,
                    None => {
                        debug!(session_id = %self.inner.id, "transport inbound stream ended");
                        break;
                    }
                }
            }
        }

        // The stream is gone: whatever the cause, no pending caller may be
        // left hanging and no dispatch may keep waiting on the handshake.
        self.inner.closing.store(true, Ordering::Release);
        self.inner.handshake.shutdown();
        let drained = self.inner.pending.drain();
        if drained > 0 {
            warn!(session_id = %self.inner.id, drained,
                "failed pending requests at session loop exit");
        }
        self.inner.tasks.close();
    }

    /// Route one inbound frame. Replies are resolved inline; requests and
    /// notifications are dispatched without blocking the caller's loop.
    pub async fn handle_inbound(&self, frame: JsonRpcFrame) {
        self.touch();
        match frame {
            JsonRpcFrame::Reply(reply) => {
                self.inner.pending.resolve(reply);
            }
            JsonRpcFrame::Request(request) => self.dispatch_request(request).await,
            JsonRpcFrame::Notification(notification) => {
                self.dispatch_notification(notification).await
            }
        }
    }

    async fn dispatch_request(&self, request: JsonRpcRequest) {
        match request.method.as_str() {
            methods::INITIALIZE => self.handle_initialize(request).await,
            // Liveness probes are answered inline and are valid in any
            // handshake state
            methods::PING => {
                if request.expects_reply() {
                    self.send_reply(JsonRpcMessage::success(request.id, json!({})))
                        .await;
                }
            }
            _ => self.dispatch_application_request(request).await,
        }
    }

    async fn dispatch_application_request(&self, request: JsonRpcRequest) {
        let expects_reply = request.expects_reply();

        if expects_reply {
            let newly_inserted = {
                let mut inflight = self.inner.inflight_inbound.lock();
                inflight.insert(request.id.clone())
            };
            if !newly_inserted {
                error!(session_id = %self.inner.id, request_id = %request.id,
                    method = %request.method, "peer reused an in-flight request id");
                // No id on the error: the id still belongs to the first,
                // still-running request
                self.send_reply(JsonRpcMessage::Error(JsonRpcError::invalid_request(
                    None,
                    Some("duplicate request id".to_string()),
                )))
                .await;
                return;
            }
        }

        let session = self.clone();
        self.inner.tasks.spawn(async move {
            // Application dispatch waits behind the handshake: no handler
            // runs without a valid exchange.
            let Some(exchange) = session.inner.handshake.exchange().await else {
                debug!(session_id = %session.inner.id, method = %request.method,
                    "session closed before handshake completion; dropping request");
                return;
            };

            let id = request.id.clone();
            let reply = session.invoke_request_handler(exchange, request).await;

            if expects_reply {
                session.inner.inflight_inbound.lock().remove(&id);
                if let Some(reply) = reply {
                    session.send_reply(reply).await;
                }
            }
        });
    }

    /// Invoke the registered handler and shape its outcome into a reply.
    /// Returns `None` when the request carried no id (nothing to answer).
    async fn invoke_request_handler(
        &self,
        exchange: Exchange,
        request: JsonRpcRequest,
    ) -> Option<JsonRpcMessage> {
        let JsonRpcRequest {
            id, method, params, ..
        } = request;
        let expects_reply = !id.is_empty();

        let outcome = match self.inner.handlers.request_handler(&method) {
            Some(handler) => {
                match AssertUnwindSafe(handler.handle(exchange, params))
                    .catch_unwind()
                    .await
                {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(e)) => {
                        debug!(session_id = %self.inner.id, %method, error = %e,
                            "request handler returned an error");
                        Err(e.to_error_object())
                    }
                    Err(_) => {
                        error!(session_id = %self.inner.id, %method,
                            "request handler panicked");
                        Err(JsonRpcErrorObject::internal_error(Some(
                            "handler panicked".to_string(),
                        )))
                    }
                }
            }
            None => {
                debug!(session_id = %self.inner.id, %method,
                    "no handler registered for request method");
                Err(JsonRpcErrorObject::method_not_found(&method))
            }
        };

        if !expects_reply {
            if let Err(e) = outcome {
                warn!(session_id = %self.inner.id, %method, code = e.code,
                    "reply-less request failed; nothing sent to peer");
            }
            return None;
        }

        Some(match outcome {
            Ok(value) => JsonRpcMessage::success(id, value),
            Err(error) => JsonRpcMessage::Error(JsonRpcError::new(Some(id), error)),
        })
    }

    async fn dispatch_notification(&self, notification: JsonRpcNotification) {
        if notification.method == methods::INITIALIZED {
            self.handle_initialized().await;
            return;
        }

        let session = self.clone();
        self.inner.tasks.spawn(async move {
            let Some(exchange) = session.inner.handshake.exchange().await else {
                debug!(session_id = %session.inner.id, method = %notification.method,
                    "session closed before handshake completion; dropping notification");
                return;
            };

            let method = notification.method.clone();
            match session.inner.handlers.notification_handler(&method) {
                Some(handler) => {
                    match AssertUnwindSafe(handler.handle(exchange, notification.params))
                        .catch_unwind()
                        .await
                    {
                        Ok(Ok(())) => {}
                        // Notifications have no reply channel: failures stop here
                        Ok(Err(e)) => {
                            warn!(session_id = %session.inner.id, %method, error = %e,
                                "notification handler failed");
                        }
                        Err(_) => {
                            error!(session_id = %session.inner.id, %method,
                                "notification handler panicked");
                        }
                    }
                }
                None => {
                    debug!(session_id = %session.inner.id, %method,
                        "no handler registered for notification; dropping");
                }
            }
        });
    }

    // === Handshake ========================================================

    async fn handle_initialize(&self, request: JsonRpcRequest) {
        let expects_reply = request.expects_reply();
        let id = request.id.clone();

        let reply = match self.process_initialize(request).await {
            Ok(result) => match serde_json::to_value(&result) {
                Ok(value) => JsonRpcMessage::success(id, value),
                Err(e) => JsonRpcMessage::Error(JsonRpcError::internal_error(
                    Some(id),
                    Some(e.to_string()),
                )),
            },
            Err(error) => JsonRpcMessage::Error(JsonRpcError::new(Some(id), error)),
        };

        if expects_reply {
            self.send_reply(reply).await;
        }
    }

    async fn process_initialize(
        &self,
        request: JsonRpcRequest,
    ) -> Result<InitializeResult, JsonRpcErrorObject> {
        let params = request
            .params
            .ok_or_else(|| JsonRpcErrorObject::invalid_params("initialize requires parameters"))?;
        let hello: InitializeRequest = serde_json::from_value(params)
            .map_err(|e| JsonRpcErrorObject::invalid_params(&e.to_string()))?;

        let version = hello
            .protocol_version()
            .map_err(|e| e.to_error_object())?;

        self.inner
            .handshake
            .begin(ClientHandshake {
                protocol_version: version,
                capabilities: hello.capabilities.clone(),
                client_info: hello.client_info.clone(),
            })
            .map_err(|e| {
                JsonRpcErrorObject::invalid_request(Some(e.to_string()), None)
            })?;

        info!(session_id = %self.inner.id,
            client = %hello.client_info.name,
            client_version = %hello.client_info.version,
            protocol = %version,
            "session initializing");

        if let Some(hook) = self.inner.handlers.init_request_hook() {
            hook(hello).await.map_err(|e| e.to_error_object())?;
        }

        let mut result = InitializeResult::new(
            version,
            self.inner.config.capabilities.clone(),
            self.inner.config.server_info.clone(),
        );
        if let Some(instructions) = &self.inner.config.instructions {
            result = result.with_instructions(instructions.clone());
        }
        Ok(result)
    }

    async fn handle_initialized(&self) {
        let Some(client) = self.inner.handshake.client() else {
            warn!(session_id = %self.inner.id,
                "'initialized' received before 'initialize'; ignoring");
            return;
        };

        let exchange = Exchange::new(&self.inner, client);
        match self.inner.handshake.complete(exchange.clone()) {
            Ok(()) => {
                info!(session_id = %self.inner.id, "session initialized");
                if let Some(hook) = self.inner.handlers.initialized_hook() {
                    hook(exchange).await;
                }
            }
            Err(e) => {
                warn!(session_id = %self.inner.id, error = %e,
                    "ignoring out-of-order 'initialized' notification");
            }
        }
    }

    async fn send_reply(&self, reply: JsonRpcMessage) {
        self.touch();
        if let Err(e) = self.inner.transport.send(JsonRpcFrame::Reply(reply)).await {
            warn!(session_id = %self.inner.id, error = %e, "failed to send reply");
        }
    }

    // === Shutdown =========================================================

    /// Close immediately: the transport is closed and every pending
    /// outbound caller fails with session-closed. No caller hangs past a
    /// forced close. Idempotent.
    pub async fn close(&self) {
        if self.inner.closing.swap(true, Ordering::AcqRel) {
            debug!(session_id = %self.inner.id, "close requested on already-closing session");
        }
        self.inner.shutdown.cancel();

        if let Err(e) = self.inner.transport.close().await {
            debug!(session_id = %self.inner.id, error = %e, "transport close failed");
        }

        self.inner.handshake.shutdown();
        let drained = self.inner.pending.drain();
        if drained > 0 {
            debug!(session_id = %self.inner.id, drained,
                "failed pending requests on forced close");
        }
        self.inner.tasks.close();
        info!(session_id = %self.inner.id, "session closed");
    }

    /// Close after letting in-flight work finish: new outbound calls are
    /// refused immediately, pending requests resolve or time out naturally
    /// (bounded by the configured drain timeout), handler tasks get the
    /// same bound, then the transport closes.
    pub async fn close_gracefully(&self) {
        self.inner.closing.store(true, Ordering::Release);
        info!(session_id = %self.inner.id, "session closing gracefully");

        let deadline = self.inner.config.drain_timeout;
        if tokio::time::timeout(deadline, self.inner.pending.wait_empty())
            .await
            .is_err()
        {
            warn!(session_id = %self.inner.id, remaining = self.inner.pending.len(),
                "drain timeout elapsed with requests still pending");
        }

        self.inner.tasks.close();
        if tokio::time::timeout(deadline, self.inner.tasks.wait())
            .await
            .is_err()
        {
            warn!(session_id = %self.inner.id,
                "drain timeout elapsed with handler tasks still running");
        }

        if let Err(e) = self.inner.transport.close_gracefully().await {
            debug!(session_id = %self.inner.id, error = %e,
                "graceful transport close failed");
        }

        self.inner.shutdown.cancel();
        self.inner.handshake.shutdown();
        let drained = self.inner.pending.drain();
        if drained > 0 {
            warn!(session_id = %self.inner.id, drained,
                "failed requests still pending after graceful drain");
        }
        info!(session_id = %self.inner.id, "session closed");
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("pending", &self.pending_count())
            .field("closing", &self.is_closing())
            .finish()
    }
}
