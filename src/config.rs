//! Node configuration consumed by the connection-actor layer

use crate::error::{LinkError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings describing the local node and its RPC/heartbeat bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeConfig {
    /// Server type this node belongs to (e.g. "connector", "chat")
    pub server_type: String,

    /// Identifier of this node within its server type
    #[serde(default)]
    pub server_id: String,

    /// Upper bound for a cross-server call round-trip (default: 5)
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,

    /// Entities silent for longer than this are considered stale (default: 30)
    #[serde(default = "default_heartbeat_timeout_secs")]
    pub heartbeat_timeout_secs: u64,
}

fn default_call_timeout_secs() -> u64 {
    5
}

fn default_heartbeat_timeout_secs() -> u64 {
    30
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            server_type: String::new(),
            server_id: String::new(),
            call_timeout_secs: default_call_timeout_secs(),
            heartbeat_timeout_secs: default_heartbeat_timeout_secs(),
        }
    }
}

impl NodeConfig {
    /// Create a config for the given server type with default bounds
    pub fn new(server_type: impl Into<String>) -> Self {
        Self {
            server_type: server_type.into(),
            ..Default::default()
        }
    }

    /// Set the server id
    pub fn with_server_id(mut self, server_id: impl Into<String>) -> Self {
        self.server_id = server_id.into();
        self
    }

    /// Set the call timeout in seconds
    pub fn with_call_timeout_secs(mut self, secs: u64) -> Self {
        self.call_timeout_secs = secs;
        self
    }

    /// Set the heartbeat timeout in seconds
    pub fn with_heartbeat_timeout_secs(mut self, secs: u64) -> Self {
        self.heartbeat_timeout_secs = secs;
        self
    }

    /// Check that the config can drive a node
    pub fn validate(&self) -> Result<()> {
        if self.server_type.trim().is_empty() {
            return Err(LinkError::Config("server type must not be empty".to_string()));
        }
        if self.server_type.contains('.') {
            return Err(LinkError::Config(format!(
                "server type '{}' must not contain '.'",
                self.server_type
            )));
        }
        if self.call_timeout_secs == 0 {
            return Err(LinkError::Config(
                "call timeout must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_timeout_secs == 0 {
            return Err(LinkError::Config(
                "heartbeat timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = NodeConfig::default();
        assert!(config.server_type.is_empty());
        assert_eq!(config.call_timeout_secs, 5);
        assert_eq!(config.heartbeat_timeout_secs, 30);
        assert_eq!(config.call_timeout(), Duration::from_secs(5));
        assert_eq!(config.heartbeat_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn test_config_deserialize_with_defaults() {
        let json = r#"{"serverType": "chat", "serverId": "chat-1"}"#;
        let config: NodeConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.server_type, "chat");
        assert_eq!(config.server_id, "chat-1");
        assert_eq!(config.call_timeout_secs, 5);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_empty_server_type() {
        let err = NodeConfig::default().validate().unwrap_err();
        assert!(matches!(err, LinkError::Config(_)));
    }

    #[test]
    fn test_validate_rejects_dotted_server_type() {
        assert!(NodeConfig::new("chat.room").validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_timeouts() {
        assert!(NodeConfig::new("chat")
            .with_call_timeout_secs(0)
            .validate()
            .is_err());

        assert!(NodeConfig::new("chat")
            .with_heartbeat_timeout_secs(0)
            .validate()
            .is_err());
    }
}
