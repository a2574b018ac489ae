//! Node context handed to every entity at construction
//!
//! Bundles the node configuration with the process-wide collaborators
//! (registry, session factory, cluster transport, payload serializer).
//! Built once at process start and shared by `Arc`.

use crate::cluster::ClusterTransport;
use crate::codec::{JsonSerializer, Serializer};
use crate::config::NodeConfig;
use crate::error::Result;
use crate::registry::ConnectionRegistry;
use crate::session::SessionFactory;
use std::sync::Arc;

/// Shared dependencies of the connection-actor layer
pub struct NetContext {
    config: NodeConfig,
    registry: Arc<dyn ConnectionRegistry>,
    cluster: Arc<dyn ClusterTransport>,
    sessions: Arc<SessionFactory>,
    serializer: Arc<dyn Serializer>,
}

impl NetContext {
    /// Create a context with a fresh session factory and the JSON serializer
    ///
    /// Fails if the configuration does not validate.
    pub fn new(
        config: NodeConfig,
        registry: Arc<dyn ConnectionRegistry>,
        cluster: Arc<dyn ClusterTransport>,
    ) -> Result<Self> {
        config.validate()?;
        tracing::info!(
            server_type = %config.server_type,
            server_id = %config.server_id,
            "Node context initialized"
        );
        Ok(Self {
            config,
            registry,
            cluster,
            sessions: Arc::new(SessionFactory::new()),
            serializer: Arc::new(JsonSerializer),
        })
    }

    /// Use a specific session factory
    pub fn with_sessions(mut self, sessions: Arc<SessionFactory>) -> Self {
        self.sessions = sessions;
        self
    }

    /// Use a specific payload serializer
    pub fn with_serializer(mut self, serializer: Arc<dyn Serializer>) -> Self {
        self.serializer = serializer;
        self
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// This node's server type
    pub fn server_type(&self) -> &str {
        &self.config.server_type
    }

    pub fn registry(&self) -> &dyn ConnectionRegistry {
        self.registry.as_ref()
    }

    pub fn cluster(&self) -> &dyn ClusterTransport {
        self.cluster.as_ref()
    }

    pub fn sessions(&self) -> &SessionFactory {
        &self.sessions
    }

    pub fn serializer(&self) -> &dyn Serializer {
        self.serializer.as_ref()
    }

    /// Close entities silent for longer than the configured heartbeat timeout
    ///
    /// Returns how many were closed. The embedding application decides how
    /// often to call this.
    pub async fn sweep_stale(&self) -> usize {
        let timeout = self.config.heartbeat_timeout();
        let closed = self.registry.sweep_stale(timeout).await;
        if closed > 0 {
            tracing::info!(
                closed,
                timeout_secs = timeout.as_secs(),
                "Heartbeat sweep closed stale entities"
            );
        }
        closed
    }
}
