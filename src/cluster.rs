//! Cluster transport — carries RPC calls to nodes of other server types

use crate::error::{LinkError, Result};
use crate::route::Route;
use crate::session::Session;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Who initiated a remote call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// Framework-internal call
    Sys,
    /// Call made by application handler code
    User,
}

/// Core trait for cluster transports
///
/// Implementations perform network I/O against a node of the route's
/// server type and return its encoded reply.
#[async_trait]
pub trait ClusterTransport: Send + Sync {
    async fn invoke(
        &self,
        kind: CallKind,
        route: &Route,
        session: &Session,
        payload: Bytes,
    ) -> Result<Bytes>;
}

/// Handler serving calls for one server type inside a [`MemoryCluster`]
pub type RemoteHandler =
    Arc<dyn Fn(CallKind, &Route, &Session, Bytes) -> Result<Bytes> + Send + Sync>;

/// In-process cluster transport for testing and single-process deployments
///
/// Routes each call to the handler registered for the route's server type.
#[derive(Default)]
pub struct MemoryCluster {
    handlers: RwLock<HashMap<String, RemoteHandler>>,
    invocations: AtomicU64,
}

impl MemoryCluster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the handler for a server type
    pub async fn register<F>(&self, server_type: impl Into<String>, handler: F)
    where
        F: Fn(CallKind, &Route, &Session, Bytes) -> Result<Bytes> + Send + Sync + 'static,
    {
        let server_type = server_type.into();
        tracing::debug!(server_type = %server_type, "Cluster handler registered");
        self.handlers
            .write()
            .await
            .insert(server_type, Arc::new(handler));
    }

    /// Number of calls that reached the transport
    pub fn invocations(&self) -> u64 {
        self.invocations.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ClusterTransport for MemoryCluster {
    async fn invoke(
        &self,
        kind: CallKind,
        route: &Route,
        session: &Session,
        payload: Bytes,
    ) -> Result<Bytes> {
        self.invocations.fetch_add(1, Ordering::SeqCst);

        let handler = self
            .handlers
            .read()
            .await
            .get(&route.server_type)
            .cloned()
            .ok_or_else(|| {
                LinkError::Transport(format!(
                    "no node serves server type '{}'",
                    route.server_type
                ))
            })?;

        handler(kind, route, session, payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{decode_reply, encode_reply, Args};
    use crate::session::SessionFactory;

    #[tokio::test]
    async fn test_memory_cluster_routes_by_server_type() {
        let cluster = MemoryCluster::new();
        cluster
            .register("chat", |kind, route, session, payload| {
                assert_eq!(kind, CallKind::User);
                assert_eq!(route.method, "join");
                let args = Args::decode(&payload)?;
                let room: String = args.reader().next()?;
                encode_reply(&format!("{} joined {}", session.id(), room))
            })
            .await;

        let session = SessionFactory::starting_at(9).create(1);
        let payload = Args::new().push("lobby").unwrap().encode().unwrap();
        let reply = cluster
            .invoke(
                CallKind::User,
                &Route::new("chat", "room", "join"),
                &session,
                payload,
            )
            .await
            .unwrap();

        assert_eq!(decode_reply::<String>(&reply).unwrap(), "9 joined lobby");
        assert_eq!(cluster.invocations(), 1);
    }

    #[tokio::test]
    async fn test_memory_cluster_unknown_server_type() {
        let cluster = MemoryCluster::new();
        let session = SessionFactory::new().create(1);
        let err = cluster
            .invoke(
                CallKind::Sys,
                &Route::new("gate", "entry", "ping"),
                &session,
                Bytes::new(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
    }
}
