//! Direct entity — one user connection bound to one session

use crate::codec::{serialize_or_raw, Args, Payload};
use crate::connection::Connection;
use crate::context::NetContext;
use crate::entity::{Heartbeat, NetworkEntity};
use crate::error::Result;
use crate::protocol::{write_message, OutboundMessage};
use crate::rpc;
use crate::session::Session;
use crate::types::{EntityId, EntityStatus, StatusCell};
use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;
use std::sync::Arc;

/// Connection actor for a connection terminated on this node
///
/// The entity and its session share one id.
pub struct DirectEntity {
    ctx: Arc<NetContext>,
    conn: Arc<dyn Connection>,
    session: Arc<Session>,
    status: StatusCell,
    heartbeat: Heartbeat,
}

impl DirectEntity {
    /// Create the entity and its session for a freshly accepted connection
    pub fn accept(ctx: Arc<NetContext>, conn: Arc<dyn Connection>) -> Arc<Self> {
        let session = ctx.sessions().create_self_owned();
        tracing::info!(
            entity_id = session.id(),
            remote = %conn.remote_addr(),
            "Direct entity started"
        );
        Arc::new(Self {
            ctx,
            conn,
            session,
            status: StatusCell::started(),
            heartbeat: Heartbeat::now(),
        })
    }

    /// The session bound to this connection
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Frame `msg` onto this entity's connection
    pub(crate) async fn write_message(&self, msg: &OutboundMessage) -> Result<()> {
        write_message(self.conn.as_ref(), msg).await
    }

    #[cfg(test)]
    pub(crate) fn heartbeat_cell(&self) -> &Heartbeat {
        &self.heartbeat
    }
}

#[async_trait]
impl NetworkEntity for DirectEntity {
    fn id(&self) -> EntityId {
        self.session.id()
    }

    fn status(&self) -> EntityStatus {
        self.status.get()
    }

    fn heartbeat(&self) {
        self.heartbeat.touch();
    }

    fn last_heartbeat(&self) -> i64 {
        self.heartbeat.get()
    }

    async fn send(&self, data: &[u8]) -> Result<()> {
        self.conn.write(data).await
    }

    async fn push(&self, session: &Session, route: &str, payload: Payload) -> Result<()> {
        let data = serialize_or_raw(self.ctx.serializer(), &payload)?;
        tracing::debug!(uid = session.uid(), route = %route, "Direct push");
        self.ctx.registry().push_direct(session, route, data).await
    }

    async fn response(&self, session: &Session, payload: Payload) -> Result<()> {
        let data = serialize_or_raw(self.ctx.serializer(), &payload)?;
        tracing::debug!(uid = session.uid(), "Direct response");
        self.ctx.registry().respond_direct(session, data).await
    }

    async fn call_raw(&self, session: &Session, route: &str, args: Args) -> Result<Bytes> {
        rpc::dispatch(&self.ctx, session, route, args).await
    }

    async fn close(&self) {
        if !self.status.close() {
            return;
        }

        let registry = self.ctx.registry();
        if let Err(e) = registry.close_session(&self.session).await {
            tracing::warn!(
                entity_id = self.id(),
                error = %e,
                "Failed to close session during teardown"
            );
        }
        registry.remove(self.id()).await;

        // Best-effort: the client may already be gone
        if let Err(e) = self.conn.close().await {
            tracing::debug!(entity_id = self.id(), error = %e, "Connection close failed");
        }

        tracing::info!(entity_id = self.id(), "Direct entity closed");
    }
}

impl fmt::Display for DirectEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, remote address: {}, last heartbeat: {}",
            self.session.id(),
            self.conn.remote_addr(),
            self.heartbeat.get()
        )
    }
}

impl fmt::Debug for DirectEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DirectEntity")
            .field("id", &self.session.id())
            .field("status", &self.status.get())
            .finish()
    }
}
