//! Network entity trait — the capability shared by every connection actor
//!
//! Two implementations exist: [`BridgeEntity`] multiplexes many sessions over
//! one connection from a frontend node, [`DirectEntity`] binds one user
//! connection to one session. Which one handles a connection is decided when
//! the connection is accepted.

use crate::bridge::BridgeEntity;
use crate::codec::{decode_reply, Args, Payload};
use crate::direct::DirectEntity;
use crate::error::Result;
use crate::session::Session;
use crate::types::{now_millis, EntityId, EntityStatus};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Core trait for connection actors
#[async_trait]
pub trait NetworkEntity: Send + Sync + fmt::Display {
    /// Process-unique entity id
    fn id(&self) -> EntityId;

    fn status(&self) -> EntityStatus;

    /// Record a liveness signal
    fn heartbeat(&self);

    /// Unix timestamp in milliseconds of the last liveness signal
    fn last_heartbeat(&self) -> i64;

    /// Whether no liveness signal arrived within `timeout`
    fn is_stale(&self, timeout: Duration) -> bool {
        let timeout = i64::try_from(timeout.as_millis()).unwrap_or(i64::MAX);
        now_millis().saturating_sub(self.last_heartbeat()) > timeout
    }

    /// Write raw bytes to the physical connection, without framing
    async fn send(&self, data: &[u8]) -> Result<()>;

    /// Push an unsolicited message to a session
    async fn push(&self, session: &Session, route: &str, payload: Payload) -> Result<()>;

    /// Reply to the request most recently received on a session
    async fn response(&self, session: &Session, payload: Payload) -> Result<()>;

    /// Invoke `route` on a node of another server type, returning the raw reply
    async fn call_raw(&self, session: &Session, route: &str, args: Args) -> Result<Bytes>;

    /// Tear the entity down
    ///
    /// Idempotent and best-effort: failures while releasing sessions or the
    /// connection are logged, never returned.
    async fn close(&self);
}

/// Typed remote calls for any network entity
#[async_trait]
pub trait CallExt: NetworkEntity {
    /// Invoke `route` and decode the reply as `R`
    ///
    /// Transport failures and reply decode failures are reported as
    /// distinct error variants.
    async fn call<R>(&self, session: &Session, route: &str, args: Args) -> Result<R>
    where
        R: DeserializeOwned + Send,
    {
        let reply = self.call_raw(session, route, args).await?;
        decode_reply(&reply)
    }
}

impl<T: NetworkEntity + ?Sized> CallExt for T {}

/// Last-heartbeat timestamp shared by both entity variants
#[derive(Debug)]
pub(crate) struct Heartbeat(AtomicI64);

impl Heartbeat {
    pub(crate) fn now() -> Self {
        Self(AtomicI64::new(now_millis()))
    }

    pub(crate) fn touch(&self) {
        self.0.store(now_millis(), Ordering::Release);
    }

    pub(crate) fn get(&self) -> i64 {
        self.0.load(Ordering::Acquire)
    }

    #[cfg(test)]
    pub(crate) fn set(&self, millis: i64) {
        self.0.store(millis, Ordering::Release);
    }
}

/// A registered entity, as resolved by the connection registry
#[derive(Clone)]
pub enum EntityHandle {
    Bridge(Arc<BridgeEntity>),
    Direct(Arc<DirectEntity>),
}

impl EntityHandle {
    pub fn id(&self) -> EntityId {
        self.entity().id()
    }

    /// View the handle through the shared capability
    pub fn entity(&self) -> &dyn NetworkEntity {
        match self {
            EntityHandle::Bridge(bridge) => &**bridge,
            EntityHandle::Direct(direct) => &**direct,
        }
    }

    pub fn as_bridge(&self) -> Option<&Arc<BridgeEntity>> {
        match self {
            EntityHandle::Bridge(bridge) => Some(bridge),
            EntityHandle::Direct(_) => None,
        }
    }

    pub fn as_direct(&self) -> Option<&Arc<DirectEntity>> {
        match self {
            EntityHandle::Direct(direct) => Some(direct),
            EntityHandle::Bridge(_) => None,
        }
    }
}

impl From<Arc<BridgeEntity>> for EntityHandle {
    fn from(bridge: Arc<BridgeEntity>) -> Self {
        EntityHandle::Bridge(bridge)
    }
}

impl From<Arc<DirectEntity>> for EntityHandle {
    fn from(direct: Arc<DirectEntity>) -> Self {
        EntityHandle::Direct(direct)
    }
}

impl fmt::Debug for EntityHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityHandle::Bridge(bridge) => write!(f, "Bridge({})", bridge.id()),
            EntityHandle::Direct(direct) => write!(f, "Direct({})", direct.id()),
        }
    }
}
