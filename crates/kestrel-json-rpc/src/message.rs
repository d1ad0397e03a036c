//! Inbound wire-frame classification.
//!
//! A transport yields one JSON text per frame; [`parse_message`] turns it
//! into exactly one of the three JSON-RPC shapes so the session engine can
//! route it without re-inspecting the JSON. Classification is structural:
//! `method` + `id` is a request, `method` without `id` is a notification,
//! `result` or `error` is a reply.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::JsonRpcParseError;
use crate::notification::JsonRpcNotification;
use crate::request::JsonRpcRequest;
use crate::response::JsonRpcMessage;

/// One classified inbound (or outbound) wire frame
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum JsonRpcFrame {
    /// A request expecting a reply (or a reply-less request with an empty id)
    Request(JsonRpcRequest),
    /// A notification; never answered
    Notification(JsonRpcNotification),
    /// A reply (success or error) to a previously sent request
    Reply(JsonRpcMessage),
}

impl JsonRpcFrame {
    /// The method name, if this frame carries one
    pub fn method(&self) -> Option<&str> {
        match self {
            JsonRpcFrame::Request(req) => Some(&req.method),
            JsonRpcFrame::Notification(n) => Some(&n.method),
            JsonRpcFrame::Reply(_) => None,
        }
    }
}

impl From<JsonRpcRequest> for JsonRpcFrame {
    fn from(req: JsonRpcRequest) -> Self {
        JsonRpcFrame::Request(req)
    }
}

impl From<JsonRpcNotification> for JsonRpcFrame {
    fn from(n: JsonRpcNotification) -> Self {
        JsonRpcFrame::Notification(n)
    }
}

impl From<JsonRpcMessage> for JsonRpcFrame {
    fn from(reply: JsonRpcMessage) -> Self {
        JsonRpcFrame::Reply(reply)
    }
}

impl<'de> Deserialize<'de> for JsonRpcFrame {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        classify(value).map_err(serde::de::Error::custom)
    }
}

/// Parse one frame of wire text into a classified message
pub fn parse_message(text: &str) -> Result<JsonRpcFrame, JsonRpcParseError> {
    let value: Value = serde_json::from_str(text)?;
    classify(value).map_err(JsonRpcParseError::NotJsonRpc)
}

fn classify(value: Value) -> Result<JsonRpcFrame, String> {
    let obj = value
        .as_object()
        .ok_or_else(|| "frame is not a JSON object".to_string())?;

    let has_method = obj.contains_key("method");
    let has_id = obj.contains_key("id");
    let has_result = obj.contains_key("result");
    let has_error = obj.contains_key("error");

    if has_method && has_id {
        serde_json::from_value::<JsonRpcRequest>(value)
            .map(JsonRpcFrame::Request)
            .map_err(|e| e.to_string())
    } else if has_method {
        serde_json::from_value::<JsonRpcNotification>(value)
            .map(JsonRpcFrame::Notification)
            .map_err(|e| e.to_string())
    } else if has_result || has_error {
        serde_json::from_value::<JsonRpcMessage>(value)
            .map(JsonRpcFrame::Reply)
            .map_err(|e| e.to_string())
    } else {
        Err("frame has neither 'method' nor 'result'/'error'".to_string())
    }
}
