//! Error types for a3s-link

use crate::types::{EntityId, SessionId};
use thiserror::Error;

/// Errors that can occur in the connection-actor layer
#[derive(Debug, Error)]
pub enum LinkError {
    /// A remote call targeted this node's own server type
    #[error("RPC target must be a different server type, got local type '{server_type}'")]
    LocalCallAttempted { server_type: String },

    /// Reverse translation backend session id → frontend sid failed
    #[error("Session {session_id} has no frontend sid on this connection")]
    SessionAddressingMiss { session_id: SessionId },

    /// Connection registry has no (suitable) entity under this id
    #[error("Entity not registered: {0}")]
    EntityNotRegistered(EntityId),

    /// Another entity already holds this id in the registry
    #[error("Entity already registered: {0}")]
    EntityAlreadyRegistered(EntityId),

    /// Operation on an entity that has been closed
    #[error("Entity {0} is closed")]
    EntityClosed(EntityId),

    /// Malformed route string
    #[error("Failed to decode route '{route}': {reason}")]
    RouteDecode { route: String, reason: String },

    /// Payload or argument encoding failure
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Argument or reply decoding failure
    #[error("Decode error: {0}")]
    Decode(String),

    /// Cluster transport failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Physical connection write failure
    #[error("Connection write failed: {0}")]
    ConnectionWrite(String),

    /// Wire frame encode/decode failure
    #[error("Frame error: {0}")]
    Frame(String),

    /// Timeout
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Attempt to bind a session to a non-positive user id
    #[error("Invalid user id: {0}")]
    InvalidUid(i64),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<serde_json::Error> for LinkError {
    fn from(err: serde_json::Error) -> Self {
        LinkError::Serialization(err.to_string())
    }
}

/// Result type alias for link operations
pub type Result<T> = std::result::Result<T, LinkError>;
