use std::fmt;

use serde::{Deserialize, Serialize};

/// Marker type for the `"jsonrpc": "2.0"` version field.
///
/// Serializing always emits `"2.0"`; deserializing rejects anything else, so
/// a successfully parsed message is known to be well-versioned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(crate::JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == crate::JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "unsupported JSON-RPC version '{}', expected '{}'",
                version,
                crate::JSONRPC_VERSION
            )))
        }
    }
}

impl Default for JsonRpcVersion {
    fn default() -> Self {
        JsonRpcVersion
    }
}

/// A JSON-RPC request identifier.
///
/// JSON-RPC 2.0 allows string and number ids; both are supported so peers
/// are free to pick either. Ids generated by this workspace are always
/// strings of the form `<session-id>-<counter>`.
///
/// An *empty string* id is this protocol's marker for a reply-less
/// ("fire-and-forget") request: the sender does not register correlation
/// state for it and the receiver must not answer it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// String identifier
    String(String),
    /// Numeric identifier
    Number(i64),
}

impl RequestId {
    /// The empty id used by reply-less requests
    pub fn empty() -> Self {
        RequestId::String(String::new())
    }

    /// Whether this is the reply-less marker id
    pub fn is_empty(&self) -> bool {
        matches!(self, RequestId::String(s) if s.is_empty())
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::String(s) => write!(f, "{}", s),
            RequestId::Number(n) => write!(f, "{}", n),
        }
    }
}

impl From<String> for RequestId {
    fn from(s: String) -> Self {
        RequestId::String(s)
    }
}

impl From<&str> for RequestId {
    fn from(s: &str) -> Self {
        RequestId::String(s.to_string())
    }
}

impl From<i64> for RequestId {
    fn from(n: i64) -> Self {
        RequestId::Number(n)
    }
}
