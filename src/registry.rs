//! Connection registry — resolves entity ids to live entities
//!
//! `ConnectionRegistry` is the contract the entities consume. `NetService`
//! is the in-process implementation: one instance is created at process
//! start, injected through the node context, and torn down with
//! [`NetService::shutdown`].

use crate::direct::DirectEntity;
use crate::entity::{EntityHandle, NetworkEntity};
use crate::error::{LinkError, Result};
use crate::protocol::OutboundMessage;
use crate::session::Session;
use crate::types::EntityId;
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// Core trait for connection registries
#[async_trait]
pub trait ConnectionRegistry: Send + Sync {
    /// Resolve the entity currently registered under `entity_id`
    async fn lookup(&self, entity_id: EntityId) -> Result<EntityHandle>;

    /// Forget an entity; a no-op if it is not registered
    async fn remove(&self, entity_id: EntityId);

    /// Release a session that its owning entity is tearing down
    async fn close_session(&self, session: &Session) -> Result<()>;

    /// Push to a session whose connection is terminated on this node
    async fn push_direct(&self, session: &Session, route: &str, data: Bytes) -> Result<()>;

    /// Respond to a session whose connection is terminated on this node
    async fn respond_direct(&self, session: &Session, data: Bytes) -> Result<()>;

    /// Close every entity whose last heartbeat is older than `timeout`,
    /// returning how many were closed
    async fn sweep_stale(&self, timeout: Duration) -> usize;
}

/// Callback run whenever a session is closed
pub type SessionClosedHook = Arc<dyn Fn(&Session) + Send + Sync>;

/// In-process connection registry
#[derive(Default)]
pub struct NetService {
    entities: RwLock<HashMap<EntityId, EntityHandle>>,
    session_closed_hooks: RwLock<Vec<SessionClosedHook>>,
}

impl NetService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted entity
    pub async fn register(&self, handle: EntityHandle) -> Result<()> {
        let id = handle.id();
        let mut entities = self.entities.write().await;
        if entities.contains_key(&id) {
            return Err(LinkError::EntityAlreadyRegistered(id));
        }
        tracing::info!(entity = ?handle, "Entity registered");
        entities.insert(id, handle);
        Ok(())
    }

    /// Run `hook` for every session closed from now on
    pub async fn on_session_closed<F>(&self, hook: F)
    where
        F: Fn(&Session) + Send + Sync + 'static,
    {
        self.session_closed_hooks.write().await.push(Arc::new(hook));
    }

    pub async fn len(&self) -> usize {
        self.entities.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entities.read().await.is_empty()
    }

    /// Close every registered entity
    pub async fn shutdown(&self) {
        let handles: Vec<EntityHandle> = self.entities.read().await.values().cloned().collect();
        tracing::info!(entities = handles.len(), "Net service shutting down");

        futures::future::join_all(handles.iter().map(|handle| handle.entity().close())).await;
    }

    async fn direct_owner(&self, session: &Session) -> Result<Arc<DirectEntity>> {
        self.lookup(session.entity_id())
            .await?
            .as_direct()
            .cloned()
            .ok_or(LinkError::EntityNotRegistered(session.entity_id()))
    }
}

#[async_trait]
impl ConnectionRegistry for NetService {
    async fn lookup(&self, entity_id: EntityId) -> Result<EntityHandle> {
        self.entities
            .read()
            .await
            .get(&entity_id)
            .cloned()
            .ok_or(LinkError::EntityNotRegistered(entity_id))
    }

    async fn remove(&self, entity_id: EntityId) {
        if self.entities.write().await.remove(&entity_id).is_some() {
            tracing::debug!(entity_id, "Entity removed");
        }
    }

    async fn close_session(&self, session: &Session) -> Result<()> {
        let hooks = self.session_closed_hooks.read().await.clone();
        for hook in hooks {
            hook(session);
        }
        tracing::debug!(
            session_id = session.id(),
            uid = session.uid(),
            "Session closed"
        );
        Ok(())
    }

    async fn push_direct(&self, session: &Session, route: &str, data: Bytes) -> Result<()> {
        let owner = self.direct_owner(session).await?;
        owner
            .write_message(&OutboundMessage::push(route, data, session.id()))
            .await
    }

    async fn respond_direct(&self, session: &Session, data: Bytes) -> Result<()> {
        let owner = self.direct_owner(session).await?;
        owner
            .write_message(&OutboundMessage::response(data, session.id()))
            .await
    }

    async fn sweep_stale(&self, timeout: Duration) -> usize {
        let stale: Vec<EntityHandle> = self
            .entities
            .read()
            .await
            .values()
            .filter(|handle| handle.entity().is_stale(timeout))
            .cloned()
            .collect();

        for handle in &stale {
            tracing::warn!(
                entity_id = handle.id(),
                last_heartbeat = handle.entity().last_heartbeat(),
                "Closing entity with stale heartbeat"
            );
            handle.entity().close().await;
        }
        stale.len()
    }
}
