//! Bridge entity — one connection from a frontend node, many sessions
//!
//! The frontend node tags every frame with its own session id (the frontend
//! sid). The bridge translates those into process-wide backend sessions on the
//! way in, and back into frontend sids when pushing or responding.
//!
//! The owned session table and both translation maps live behind a single
//! lock so that `forward` and `reverse` stay exact inverses under any
//! interleaving of resolution, addressing and close.

use crate::codec::{serialize_or_raw, Args, Payload};
use crate::connection::Connection;
use crate::context::NetContext;
use crate::entity::{Heartbeat, NetworkEntity};
use crate::error::{LinkError, Result};
use crate::protocol::{write_message, MessageKind, OutboundMessage};
use crate::rpc;
use crate::session::Session;
use crate::types::{EntityId, EntityStatus, FrontendSid, SessionId, StatusCell};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Sessions owned by a bridge plus the frontend ⇄ backend id maps
#[derive(Debug, Default)]
pub(crate) struct SessionTables {
    sessions: HashMap<SessionId, Arc<Session>>,
    forward: HashMap<FrontendSid, SessionId>,
    reverse: HashMap<SessionId, FrontendSid>,
}

impl SessionTables {
    fn lookup(&self, frontend_sid: FrontendSid) -> Option<&Arc<Session>> {
        self.forward
            .get(&frontend_sid)
            .and_then(|id| self.sessions.get(id))
    }

    fn insert(&mut self, frontend_sid: FrontendSid, session: Arc<Session>) {
        if let Some(stale) = self.forward.insert(frontend_sid, session.id()) {
            self.reverse.remove(&stale);
        }
        self.reverse.insert(session.id(), frontend_sid);
        self.sessions.insert(session.id(), session);
    }

    fn remove(&mut self, session_id: SessionId) -> Option<Arc<Session>> {
        let session = self.sessions.remove(&session_id)?;
        if let Some(frontend_sid) = self.reverse.remove(&session_id) {
            self.forward.remove(&frontend_sid);
        }
        Some(session)
    }

    fn drain(&mut self) -> Vec<Arc<Session>> {
        self.forward.clear();
        self.reverse.clear();
        self.sessions.drain().map(|(_, session)| session).collect()
    }

    #[cfg(test)]
    pub(crate) fn is_consistent(&self) -> bool {
        self.forward.len() == self.reverse.len()
            && self.forward.len() == self.sessions.len()
            && self.forward.iter().all(|(fsid, id)| {
                self.reverse.get(id) == Some(fsid) && self.sessions.contains_key(id)
            })
    }
}

/// Connection actor multiplexing many logical sessions
pub struct BridgeEntity {
    id: EntityId,
    ctx: Arc<NetContext>,
    conn: Arc<dyn Connection>,
    status: StatusCell,
    heartbeat: Heartbeat,
    tables: RwLock<SessionTables>,
}

impl BridgeEntity {
    /// Create a bridge with an explicit id
    pub fn new(id: EntityId, ctx: Arc<NetContext>, conn: Arc<dyn Connection>) -> Arc<Self> {
        tracing::info!(
            entity_id = id,
            remote = %conn.remote_addr(),
            "Bridge entity started"
        );
        Arc::new(Self {
            id,
            ctx,
            conn,
            status: StatusCell::started(),
            heartbeat: Heartbeat::now(),
            tables: RwLock::new(SessionTables::default()),
        })
    }

    /// Create a bridge for a freshly accepted connection, drawing its id
    /// from the node's id allocator
    pub fn accept(ctx: Arc<NetContext>, conn: Arc<dyn Connection>) -> Arc<Self> {
        let id = ctx.sessions().next_id();
        Self::new(id, ctx, conn)
    }

    /// Return the session for `frontend_sid`, creating it on first sight
    ///
    /// Repeated calls with the same frontend sid return the same session.
    pub async fn resolve_or_create(&self, frontend_sid: FrontendSid) -> Result<Arc<Session>> {
        let mut tables = self.tables.write().await;
        if self.status.get() == EntityStatus::Closed {
            return Err(LinkError::EntityClosed(self.id));
        }
        if let Some(session) = tables.lookup(frontend_sid) {
            return Ok(session.clone());
        }

        let session = self.ctx.sessions().create(self.id);
        tables.insert(frontend_sid, session.clone());
        tracing::debug!(
            entity_id = self.id,
            frontend_sid,
            session_id = session.id(),
            "Session created"
        );
        Ok(session)
    }

    /// Existing session for `frontend_sid`, without creating one
    pub async fn session(&self, frontend_sid: FrontendSid) -> Option<Arc<Session>> {
        self.tables.read().await.lookup(frontend_sid).cloned()
    }

    /// Frontend sid mapped to a backend session id
    pub async fn frontend_sid(&self, session_id: SessionId) -> Option<FrontendSid> {
        self.tables.read().await.reverse.get(&session_id).copied()
    }

    /// Number of sessions currently owned
    pub async fn session_count(&self) -> usize {
        self.tables.read().await.sessions.len()
    }

    /// Release one session when the frontend reports its client gone
    ///
    /// The session and its translation pair leave the tables together, then
    /// the registry closes the session. A later frame with the same frontend
    /// sid starts a new session. Returns the released session, or `None` if
    /// this bridge does not own `session_id`.
    pub async fn release_session(&self, session_id: SessionId) -> Option<Arc<Session>> {
        let session = self.tables.write().await.remove(session_id)?;

        if let Err(e) = self.ctx.registry().close_session(&session).await {
            tracing::warn!(
                entity_id = self.id,
                session_id,
                error = %e,
                "Failed to close released session"
            );
        }
        tracing::debug!(entity_id = self.id, session_id, "Session released");
        Some(session)
    }

    async fn write_to_session(
        &self,
        session: &Session,
        route: &str,
        kind: MessageKind,
        payload: Payload,
    ) -> Result<()> {
        let data = serialize_or_raw(self.ctx.serializer(), &payload)?;

        tracing::debug!(
            uid = session.uid(),
            session_id = session.id(),
            kind = ?kind,
            route = %route,
            "Bridge write"
        );

        let owner = self
            .ctx
            .registry()
            .lookup(session.entity_id())
            .await
            .and_then(|handle| {
                handle
                    .as_bridge()
                    .cloned()
                    .ok_or(LinkError::EntityNotRegistered(session.entity_id()))
            })
            .map_err(|e| {
                tracing::warn!(session_id = session.id(), error = %e, "Owner lookup failed");
                e
            })?;

        let frontend_sid = owner.frontend_sid(session.id()).await.ok_or_else(|| {
            tracing::warn!(
                entity_id = self.id,
                session_id = session.id(),
                "Frontend sid not found"
            );
            LinkError::SessionAddressingMiss {
                session_id: session.id(),
            }
        })?;

        let msg = match kind {
            MessageKind::Response => OutboundMessage::response(data, frontend_sid),
            _ => OutboundMessage::push(route, data, frontend_sid),
        };
        write_message(self.conn.as_ref(), &msg).await
    }

    #[cfg(test)]
    pub(crate) async fn tables_consistent(&self) -> bool {
        self.tables.read().await.is_consistent()
    }

    #[cfg(test)]
    pub(crate) fn heartbeat_cell(&self) -> &Heartbeat {
        &self.heartbeat
    }
}

#[async_trait]
impl NetworkEntity for BridgeEntity {
    fn id(&self) -> EntityId {
        self.id
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
        self.write_to_session(session, route, MessageKind::Push, payload)
            .await
    }

    async fn response(&self, session: &Session, payload: Payload) -> Result<()> {
        self.write_to_session(session, "", MessageKind::Response, payload)
            .await
    }

    async fn call_raw(&self, session: &Session, route: &str, args: Args) -> Result<Bytes> {
        rpc::dispatch(&self.ctx, session, route, args).await
    }

    async fn close(&self) {
        let sessions = {
            let mut tables = self.tables.write().await;
            if !self.status.close() {
                return;
            }
            tables.drain()
        };

        let registry = self.ctx.registry();
        for session in &sessions {
            if let Err(e) = registry.close_session(session).await {
                tracing::warn!(
                    entity_id = self.id,
                    session_id = session.id(),
                    error = %e,
                    "Failed to close session during teardown"
                );
            }
        }
        registry.remove(self.id).await;

        // Best-effort: the peer may already be gone
        if let Err(e) = self.conn.close().await {
            tracing::debug!(entity_id = self.id, error = %e, "Connection close failed");
        }

        tracing::info!(
            entity_id = self.id,
            sessions = sessions.len(),
            "Bridge entity closed"
        );
    }
}

impl fmt::Display for BridgeEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "id: {}, remote address: {}, last heartbeat: {}",
            self.id,
            self.conn.remote_addr(),
            self.heartbeat.get()
        )
    }
}

impl fmt::Debug for BridgeEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BridgeEntity")
            .field("id", &self.id)
            .field("status", &self.status.get())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryCluster;
    use crate::config::NodeConfig;
    use crate::connection::MockConnection;
    use crate::entity::EntityHandle;
    use crate::registry::{ConnectionRegistry, NetService};
    use crate::session::SessionFactory;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Node {
        registry: Arc<NetService>,
        ctx: Arc<NetContext>,
    }

    fn node(server_type: &str, first_id: i64) -> Node {
        let registry = Arc::new(NetService::new());
        let ctx = NetContext::new(
            NodeConfig::new(server_type),
            registry.clone(),
            Arc::new(MemoryCluster::new()),
        )
        .unwrap()
        .with_sessions(Arc::new(SessionFactory::starting_at(first_id)));
        Node {
            registry,
            ctx: Arc::new(ctx),
        }
    }

    async fn registered_bridge(
        node: &Node,
        id: EntityId,
    ) -> (Arc<BridgeEntity>, Arc<MockConnection>) {
        let conn = Arc::new(MockConnection::new());
        let bridge = BridgeEntity::new(id, node.ctx.clone(), conn.clone());
        node.registry.register(bridge.clone().into()).await.unwrap();
        (bridge, conn)
    }

    fn decode_single(conn: &MockConnection) -> OutboundMessage {
        let written = conn.written();
        assert_eq!(written.len(), 1);
        let (msg, used) = OutboundMessage::decode(&written[0]).unwrap().unwrap();
        assert_eq!(used, written[0].len());
        msg
    }

    #[tokio::test]
    async fn test_resolve_is_idempotent() {
        let node = node("chat", 1001);
        let (bridge, _) = registered_bridge(&node, 1).await;

        let first = bridge.resolve_or_create(42).await.unwrap();
        let second = bridge.resolve_or_create(42).await.unwrap();
        assert_eq!(first.id(), 1001);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.entity_id(), 1);
        assert_eq!(bridge.frontend_sid(1001).await, Some(42));
        assert_eq!(bridge.session_count().await, 1);
    }

    #[tokio::test]
    async fn test_distinct_frontend_sids_get_distinct_sessions() {
        let node = node("chat", 1);
        let (bridge, _) = registered_bridge(&node, 100).await;

        let a = bridge.resolve_or_create(1).await.unwrap();
        let b = bridge.resolve_or_create(2).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert!(bridge.tables_consistent().await);
        assert!(bridge.session(3).await.is_none());
    }

    #[tokio::test]
    async fn test_push_translates_to_frontend_sid() {
        let node = node("chat", 1001);
        let (bridge, conn) = registered_bridge(&node, 7).await;
        let session = bridge.resolve_or_create(42).await.unwrap();

        bridge
            .push(&session, "room.message", serde_json::json!({"text": "hi"}).into())
            .await
            .unwrap();

        let msg = decode_single(&conn);
        assert_eq!(msg.route, "room.message");
        assert_eq!(msg.kind, MessageKind::Push);
        assert_eq!(msg.sid, 42);
        assert_eq!(&msg.payload[..], br#"{"text":"hi"}"#);
    }

    #[tokio::test]
    async fn test_response_has_no_route() {
        let node = node("chat", 1001);
        let (bridge, conn) = registered_bridge(&node, 7).await;
        let session = bridge.resolve_or_create(9).await.unwrap();

        bridge
            .response(&session, Payload::raw(&b"\x01\x02"[..]))
            .await
            .unwrap();

        let msg = decode_single(&conn);
        assert!(msg.route.is_empty());
        assert_eq!(msg.kind, MessageKind::Response);
        assert_eq!(msg.sid, 9);
        assert_eq!(&msg.payload[..], &[1, 2]);
    }

    #[tokio::test]
    async fn test_stale_addressing_performs_no_write() {
        let node = node("chat", 1001);
        let (bridge, conn) = registered_bridge(&node, 7).await;
        let session = bridge.resolve_or_create(42).await.unwrap();
        assert_eq!(session.id(), 1001);

        let released = bridge.release_session(1001).await.unwrap();
        assert!(Arc::ptr_eq(&released, &session));
        assert!(bridge.tables_consistent().await);

        let err = bridge
            .push(&session, "room.message", Payload::raw(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::SessionAddressingMiss { session_id: 1001 }));

        let err = bridge
            .response(&session, Payload::raw(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::SessionAddressingMiss { .. }));
        assert!(conn.written().is_empty());
    }

    #[tokio::test]
    async fn test_release_closes_session_and_frees_slot() {
        let node = node("chat", 1);
        let closed = Arc::new(AtomicUsize::new(0));
        let counter = closed.clone();
        node.registry
            .on_session_closed(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await;
        let (bridge, _) = registered_bridge(&node, 7).await;

        let mut previous = None;
        for _ in 0..100 {
            let session = bridge.resolve_or_create(42).await.unwrap();
            assert_ne!(Some(session.id()), previous);
            previous = Some(session.id());
            assert!(bridge.release_session(session.id()).await.is_some());
        }

        assert_eq!(bridge.session_count().await, 0);
        assert_eq!(closed.load(Ordering::SeqCst), 100);
        assert!(bridge.tables_consistent().await);

        // Unknown or already released ids are ignored
        assert!(bridge.release_session(previous.unwrap()).await.is_none());
        assert_eq!(closed.load(Ordering::SeqCst), 100);
    }

    #[tokio::test]
    async fn test_unregistered_owner_fails_lookup() {
        let node = node("chat", 1);
        let conn = Arc::new(MockConnection::new());
        let bridge = BridgeEntity::new(5, node.ctx.clone(), conn.clone());
        let session = bridge.resolve_or_create(1).await.unwrap();

        let err = bridge
            .push(&session, "room.message", Payload::raw(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::EntityNotRegistered(5)));
        assert!(conn.written().is_empty());
    }

    #[tokio::test]
    async fn test_write_failure_is_returned() {
        let node = node("chat", 1);
        let (bridge, conn) = registered_bridge(&node, 3).await;
        let session = bridge.resolve_or_create(1).await.unwrap();
        conn.fail_writes(true);

        let err = bridge
            .push(&session, "room.message", Payload::raw(Bytes::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, LinkError::ConnectionWrite(_)));
        assert_eq!(bridge.status(), EntityStatus::Started);
    }

    #[tokio::test]
    async fn test_send_writes_raw_bytes() {
        let node = node("chat", 1);
        let (bridge, conn) = registered_bridge(&node, 3).await;
        bridge.send(b"\x03heartbeat").await.unwrap();
        assert_eq!(conn.written(), vec![b"\x03heartbeat".to_vec()]);
    }

    #[tokio::test]
    async fn test_heartbeat_and_display() {
        let node = node("chat", 1);
        let (bridge, _) = registered_bridge(&node, 3).await;
        bridge.heartbeat_cell().set(0);
        assert!(bridge.is_stale(std::time::Duration::from_secs(1)));

        bridge.heartbeat();
        assert!(bridge.last_heartbeat() > 0);
        assert!(!bridge.is_stale(std::time::Duration::from_secs(60)));
        assert!(bridge.to_string().starts_with("id: 3, remote address: mock"));
    }

    #[tokio::test]
    async fn test_resolve_after_close_fails() {
        let node = node("chat", 1);
        let (bridge, _) = registered_bridge(&node, 3).await;
        bridge.close().await;

        let err = bridge.resolve_or_create(1).await.unwrap_err();
        assert!(matches!(err, LinkError::EntityClosed(3)));
        assert_eq!(bridge.session_count().await, 0);
    }

    /// Registry double that counts teardown calls and fails every close_session
    #[derive(Default)]
    struct CountingRegistry {
        closed_sessions: Mutex<Vec<SessionId>>,
        removes: AtomicUsize,
    }

    #[async_trait]
    impl ConnectionRegistry for CountingRegistry {
        async fn lookup(&self, entity_id: EntityId) -> Result<EntityHandle> {
            Err(LinkError::EntityNotRegistered(entity_id))
        }

        async fn remove(&self, _entity_id: EntityId) {
            self.removes.fetch_add(1, Ordering::SeqCst);
        }

        async fn close_session(&self, session: &Session) -> Result<()> {
            self.closed_sessions.lock().unwrap().push(session.id());
            Err(LinkError::Transport("hook failed".to_string()))
        }

        async fn push_direct(&self, session: &Session, _route: &str, _data: Bytes) -> Result<()> {
            Err(LinkError::EntityNotRegistered(session.entity_id()))
        }

        async fn respond_direct(&self, session: &Session, _data: Bytes) -> Result<()> {
            Err(LinkError::EntityNotRegistered(session.entity_id()))
        }

        async fn sweep_stale(&self, _timeout: std::time::Duration) -> usize {
            0
        }
    }

    #[tokio::test]
    async fn test_close_releases_everything_once() {
        let registry = Arc::new(CountingRegistry::default());
        let ctx = Arc::new(
            NetContext::new(
                NodeConfig::new("chat"),
                registry.clone(),
                Arc::new(MemoryCluster::new()),
            )
            .unwrap(),
        );
        let conn = Arc::new(MockConnection::new());
        conn.fail_close(true);
        let bridge = BridgeEntity::new(11, ctx, conn.clone());

        let mut ids = Vec::new();
        for fsid in [1, 2, 3] {
            ids.push(bridge.resolve_or_create(fsid).await.unwrap().id());
        }

        bridge.close().await;
        bridge.close().await;

        let mut closed = registry.closed_sessions.lock().unwrap().clone();
        closed.sort_unstable();
        ids.sort_unstable();
        assert_eq!(closed, ids);
        assert_eq!(registry.removes.load(Ordering::SeqCst), 1);
        assert_eq!(conn.close_count(), 1);
        assert_eq!(bridge.status(), EntityStatus::Closed);
        assert_eq!(bridge.session_count().await, 0);
    }

    #[tokio::test]
    async fn test_concurrent_resolution_keeps_tables_inverse() {
        let node = node("chat", 1);
        let (bridge, _) = registered_bridge(&node, 1).await;

        let mut handles = Vec::new();
        for worker in 0..8 {
            let bridge = bridge.clone();
            handles.push(tokio::spawn(async move {
                let mut seen = Vec::new();
                for fsid in 0..50 {
                    let session = bridge.resolve_or_create(fsid).await.unwrap();
                    seen.push((fsid, session.id()));
                    if fsid % 10 == worker {
                        bridge.release_session(session.id()).await;
                    }
                }
                seen
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert!(bridge.tables_consistent().await);
    }
}
