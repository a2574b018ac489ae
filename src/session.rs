//! Logical client sessions and the id allocator that creates them
//!
//! A session is owned by exactly one network entity. It refers back to that
//! entity only by id; the connection registry resolves the id to the live
//! instance when a message has to be written.

use crate::error::{LinkError, Result};
use crate::types::{now_millis, EntityId, SessionId};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

/// A logical user session
#[derive(Debug)]
pub struct Session {
    id: SessionId,
    entity_id: EntityId,
    uid: AtomicI64,
    created_at: i64,
}

impl Session {
    fn new(id: SessionId, entity_id: EntityId) -> Self {
        Self {
            id,
            entity_id,
            uid: AtomicI64::new(0),
            created_at: now_millis(),
        }
    }

    /// Process-unique session id
    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Id of the entity responsible for this session's transport
    pub fn entity_id(&self) -> EntityId {
        self.entity_id
    }

    /// Bound user id, `0` while unauthenticated
    pub fn uid(&self) -> i64 {
        self.uid.load(Ordering::Acquire)
    }

    /// Whether an authentication step has bound a user id
    pub fn is_bound(&self) -> bool {
        self.uid() > 0
    }

    /// Bind the session to an authenticated user
    pub fn bind(&self, uid: i64) -> Result<()> {
        if uid <= 0 {
            return Err(LinkError::InvalidUid(uid));
        }
        self.uid.store(uid, Ordering::Release);
        Ok(())
    }

    /// Unix timestamp in milliseconds when the session was created
    pub fn created_at(&self) -> i64 {
        self.created_at
    }
}

impl fmt::Display for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "session {} (uid: {}, entity: {})",
            self.id,
            self.uid(),
            self.entity_id
        )
    }
}

/// Allocator for process-unique session ids
///
/// One factory lives in the node context; every session (and every
/// entity id drawn from it) is unique for the lifetime of the process.
#[derive(Debug)]
pub struct SessionFactory {
    next: AtomicI64,
}

impl Default for SessionFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionFactory {
    /// Create a factory whose first id is 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    /// Create a factory whose first id is `first`
    pub fn starting_at(first: i64) -> Self {
        Self {
            next: AtomicI64::new(first),
        }
    }

    /// Reserve the next id
    pub fn next_id(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Create a fresh session owned by `owner`
    pub fn create(&self, owner: EntityId) -> Arc<Session> {
        Arc::new(Session::new(self.next_id(), owner))
    }

    /// Create a session bound 1:1 to an entity that shares its id
    pub(crate) fn create_self_owned(&self) -> Arc<Session> {
        let id = self.next_id();
        Arc::new(Session::new(id, id))
    }
}
