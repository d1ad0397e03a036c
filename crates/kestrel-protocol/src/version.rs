//! Protocol Version Support
//!
//! Protocol revisions are identified by date strings negotiated during the
//! `initialize` handshake.

use serde::{Deserialize, Serialize};

/// Supported protocol versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolVersion {
    /// Revision introducing the streamable transport profile
    #[serde(rename = "2025-03-26")]
    V2025_03_26,
    /// Revision adding structured `_meta`, elicitation, and reply-less calls
    #[serde(rename = "2025-06-18")]
    V2025_06_18,
}

impl ProtocolVersion {
    /// Parse a version string like "2025-03-26" or "2025-06-18"
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "2025-03-26" => Some(ProtocolVersion::V2025_03_26),
            "2025-06-18" => Some(ProtocolVersion::V2025_06_18),
            _ => None,
        }
    }

    /// Convert this version to its string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            ProtocolVersion::V2025_03_26 => "2025-03-26",
            ProtocolVersion::V2025_06_18 => "2025-06-18",
        }
    }

    /// The current protocol version implemented by this workspace
    pub const CURRENT: ProtocolVersion = ProtocolVersion::V2025_06_18;
}

impl std::fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ProtocolVersion {
    type Err = crate::ProtocolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| crate::ProtocolError::VersionMismatch {
            expected: Self::CURRENT.as_str().to_string(),
            actual: s.to_string(),
        })
    }
}

impl Default for ProtocolVersion {
    fn default() -> Self {
        Self::CURRENT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_parsing() {
        assert_eq!(
            ProtocolVersion::parse("2025-06-18"),
            Some(ProtocolVersion::V2025_06_18)
        );
        assert_eq!(
            ProtocolVersion::parse("2025-03-26"),
            Some(ProtocolVersion::V2025_03_26)
        );
        assert_eq!(ProtocolVersion::parse("1999-01-01"), None);
    }

    #[test]
    fn test_version_serde_rename() {
        let json = serde_json::to_string(&ProtocolVersion::V2025_06_18).unwrap();
        assert_eq!(json, "\"2025-06-18\"");
    }

    #[test]
    fn test_from_str_error() {
        let err = "bogus".parse::<ProtocolVersion>().unwrap_err();
        assert!(err.to_string().contains("bogus"));
    }
}
