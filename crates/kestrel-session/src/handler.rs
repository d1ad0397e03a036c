//! Handler Registry
//!
//! Maps inbound method names to application handlers. Request handlers
//! produce a result payload (or a domain error that becomes the JSON-RPC
//! error object on the wire); notification handlers produce nothing and
//! their failures never reach the peer. Two distinguished hooks observe the
//! handshake itself.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use kestrel_json_rpc::JsonRpcErrorObject;
use kestrel_protocol::InitializeRequest;

use crate::error::SessionError;
use crate::exchange::Exchange;

/// Convenience alias for handler outcomes
pub type HandlerResult<T> = Result<T, HandlerError>;

/// Domain failures raised by handlers. Converted to JSON-RPC error objects
/// at the dispatch boundary; only the message crosses the wire, never a
/// backtrace.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("invalid parameters: {0}")]
    InvalidParams(String),

    #[error("{0}")]
    Internal(String),

    /// An application-defined error code, passed through opaquely
    #[error("{message}")]
    Other {
        code: i64,
        message: String,
        data: Option<Value>,
    },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A nested outbound call on the exchange failed
    #[error("session error: {0}")]
    Session(#[from] SessionError),
}

impl HandlerError {
    /// Convert to the JSON-RPC error object sent to the peer
    pub fn to_error_object(&self) -> JsonRpcErrorObject {
        match self {
            HandlerError::InvalidParams(msg) => JsonRpcErrorObject::invalid_params(msg),
            HandlerError::Other {
                code,
                message,
                data,
            } => JsonRpcErrorObject {
                code: *code,
                message: message.clone(),
                data: data.clone(),
            },
            other => JsonRpcErrorObject::internal_error(Some(other.to_string())),
        }
    }
}

/// Handles one inbound request method
#[async_trait]
pub trait RequestHandler: Send + Sync {
    async fn handle(&self, exchange: Exchange, params: Option<Value>) -> HandlerResult<Value>;
}

/// Handles one inbound notification method
#[async_trait]
pub trait NotificationHandler: Send + Sync {
    async fn handle(&self, exchange: Exchange, params: Option<Value>) -> HandlerResult<()>;
}

struct RequestFn<F>(F);

#[async_trait]
impl<F, Fut> RequestHandler for RequestFn<F>
where
    F: Fn(Exchange, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
{
    async fn handle(&self, exchange: Exchange, params: Option<Value>) -> HandlerResult<Value> {
        (self.0)(exchange, params).await
    }
}

struct NotificationFn<F>(F);

#[async_trait]
impl<F, Fut> NotificationHandler for NotificationFn<F>
where
    F: Fn(Exchange, Option<Value>) -> Fut + Send + Sync,
    Fut: Future<Output = HandlerResult<()>> + Send + 'static,
{
    async fn handle(&self, exchange: Exchange, params: Option<Value>) -> HandlerResult<()> {
        (self.0)(exchange, params).await
    }
}

/// Hook consulted while processing `initialize`; an error refuses the
/// handshake
pub type InitRequestHook =
    Arc<dyn Fn(InitializeRequest) -> BoxFuture<'static, HandlerResult<()>> + Send + Sync>;

/// Hook invoked once the handshake completes and the exchange exists
pub type InitializedHook = Arc<dyn Fn(Exchange) -> BoxFuture<'static, ()> + Send + Sync>;

/// Immutable method-name → handler registry, built once and shared by the
/// session
#[derive(Default)]
pub struct HandlerRegistry {
    requests: HashMap<String, Arc<dyn RequestHandler>>,
    notifications: HashMap<String, Arc<dyn NotificationHandler>>,
    init_request_hook: Option<InitRequestHook>,
    initialized_hook: Option<InitializedHook>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for a request method
    pub fn request<H>(mut self, method: impl Into<String>, handler: H) -> Self
    where
        H: RequestHandler + 'static,
    {
        self.requests.insert(method.into(), Arc::new(handler));
        self
    }

    /// Register a closure for a request method
    pub fn request_fn<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Exchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<Value>> + Send + 'static,
    {
        self.request(method, RequestFn(f))
    }

    /// Register a handler for a notification method
    pub fn notification<H>(mut self, method: impl Into<String>, handler: H) -> Self
    where
        H: NotificationHandler + 'static,
    {
        self.notifications.insert(method.into(), Arc::new(handler));
        self
    }

    /// Register a closure for a notification method
    pub fn notification_fn<F, Fut>(self, method: impl Into<String>, f: F) -> Self
    where
        F: Fn(Exchange, Option<Value>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.notification(method, NotificationFn(f))
    }

    /// Install the initialize-request hook
    pub fn on_initialize<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(InitializeRequest) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult<()>> + Send + 'static,
    {
        self.init_request_hook = Some(Arc::new(move |hello| Box::pin(f(hello))));
        self
    }

    /// Install the handshake-completion hook
    pub fn on_initialized<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(Exchange) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.initialized_hook = Some(Arc::new(move |exchange| Box::pin(f(exchange))));
        self
    }

    pub fn request_handler(&self, method: &str) -> Option<Arc<dyn RequestHandler>> {
        self.requests.get(method).cloned()
    }

    pub fn notification_handler(&self, method: &str) -> Option<Arc<dyn NotificationHandler>> {
        self.notifications.get(method).cloned()
    }

    pub fn init_request_hook(&self) -> Option<InitRequestHook> {
        self.init_request_hook.clone()
    }

    pub fn initialized_hook(&self) -> Option<InitializedHook> {
        self.initialized_hook.clone()
    }

    /// All registered request methods, for introspection
    pub fn request_methods(&self) -> Vec<String> {
        self.requests.keys().cloned().collect()
    }
}
