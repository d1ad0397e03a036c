//! Session Configuration
//!
//! All tunables and identity data a session needs are passed in explicitly
//! at construction; there is no process-wide configuration state.

use std::time::Duration;

use kestrel_protocol::{Implementation, ProtocolVersion, ServerCapabilities};

/// Configuration for one session engine instance
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Identity announced in the `initialize` reply
    pub server_info: Implementation,
    /// Capabilities announced in the `initialize` reply
    pub capabilities: ServerCapabilities,
    /// Protocol version this engine speaks
    pub protocol_version: ProtocolVersion,
    /// Optional instructions returned to the client at handshake
    pub instructions: Option<String>,
    /// Default wait before an outbound request is abandoned with a timeout
    pub request_timeout: Duration,
    /// Fixed wait for liveness pings, regardless of `request_timeout`
    pub ping_timeout: Duration,
    /// Upper bound on how long a graceful close waits for in-flight work
    pub drain_timeout: Duration,
}

impl SessionConfig {
    pub fn new(server_info: Implementation) -> Self {
        Self {
            server_info,
            capabilities: ServerCapabilities::default(),
            protocol_version: ProtocolVersion::CURRENT,
            instructions: None,
            request_timeout: Duration::from_secs(30),
            ping_timeout: Duration::from_secs(5),
            drain_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ServerCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    pub fn with_protocol_version(mut self, version: ProtocolVersion) -> Self {
        self.protocol_version = version;
        self
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_ping_timeout(mut self, timeout: Duration) -> Self {
        self.ping_timeout = timeout;
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self::new(Implementation::new(
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION"),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_chain() {
        let config = SessionConfig::new(Implementation::new("srv", "1.2.3"))
            .with_request_timeout(Duration::from_secs(5))
            .with_instructions("be gentle");

        assert_eq!(config.server_info.name, "srv");
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(config.instructions.as_deref(), Some("be gentle"));
        // Untouched fields keep their defaults
        assert_eq!(config.ping_timeout, Duration::from_secs(5));
        assert_eq!(config.protocol_version, ProtocolVersion::CURRENT);
    }
}
