//! Liveness Probe
//!
//! Either side may send a `ping` request at any time after the handshake;
//! the receiver answers with an empty result. Pings carry a short fixed
//! timeout on the sending side regardless of the session default.

use serde::{Deserialize, Serialize};

/// Parameters of a `ping` request (none)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PingRequest;

impl PingRequest {
    pub fn new() -> Self {
        Self
    }
}

/// An empty result payload, serialized as `{}`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EmptyResult {}

impl EmptyResult {
    pub fn new() -> Self {
        Self {}
    }
}
