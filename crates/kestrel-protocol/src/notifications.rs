//! Lifecycle Notification Types
//!
//! Typed wrappers for the notifications the session layer itself sends and
//! receives. Each converts into a plain [`JsonRpcNotification`] for the
//! wire.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use kestrel_json_rpc::{JsonRpcNotification, RequestId};

use crate::methods;

/// Sent by the client to confirm handshake completion
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InitializedNotification;

impl InitializedNotification {
    pub fn new() -> Self {
        Self
    }
}

impl From<InitializedNotification> for JsonRpcNotification {
    fn from(_: InitializedNotification) -> Self {
        JsonRpcNotification::new_no_params(methods::INITIALIZED)
    }
}

/// Progress update for a long-running request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressNotification {
    /// Token correlating this update with the originating request
    pub progress_token: String,
    /// Monotonically increasing progress value
    pub progress: u64,
    /// Optional total, when known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Optional human-readable status
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProgressNotification {
    pub fn new(progress_token: impl Into<String>, progress: u64) -> Self {
        Self {
            progress_token: progress_token.into(),
            progress,
            total: None,
            message: None,
        }
    }

    pub fn with_total(mut self, total: u64) -> Self {
        self.total = Some(total);
        self
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl From<ProgressNotification> for JsonRpcNotification {
    fn from(n: ProgressNotification) -> Self {
        // Serialization of the typed struct cannot fail: all fields are JSON-safe
        let params = serde_json::to_value(&n).unwrap_or(Value::Null);
        JsonRpcNotification::new(methods::PROGRESS, Some(params))
    }
}

/// Cancellation of an in-flight request
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelledNotification {
    /// Id of the request being cancelled
    pub request_id: RequestId,
    /// Optional reason, for diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CancelledNotification {
    pub fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            reason: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}

impl From<CancelledNotification> for JsonRpcNotification {
    fn from(n: CancelledNotification) -> Self {
        let params = serde_json::to_value(&n).unwrap_or(Value::Null);
        JsonRpcNotification::new(methods::CANCELLED, Some(params))
    }
}

/// Severity levels for log message notifications, ordered from least to most
/// severe (syslog ordering)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoggingLevel {
    Debug,
    Info,
    Notice,
    Warning,
    Error,
    Critical,
    Alert,
    Emergency,
}

impl LoggingLevel {
    /// Whether a message at this level passes the given threshold
    pub fn should_log(&self, threshold: LoggingLevel) -> bool {
        *self >= threshold
    }
}

/// Log message pushed to the peer
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoggingMessageNotification {
    /// Severity of the message
    pub level: LoggingLevel,
    /// Arbitrary structured payload
    pub data: Value,
    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
}

impl LoggingMessageNotification {
    pub fn new(level: LoggingLevel, data: Value) -> Self {
        Self {
            level,
            data,
            logger: None,
        }
    }

    pub fn with_logger(mut self, logger: impl Into<String>) -> Self {
        self.logger = Some(logger.into());
        self
    }
}

impl From<LoggingMessageNotification> for JsonRpcNotification {
    fn from(n: LoggingMessageNotification) -> Self {
        let params = serde_json::to_value(&n).unwrap_or(Value::Null);
        JsonRpcNotification::new(methods::MESSAGE, Some(params))
    }
}
