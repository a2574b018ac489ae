//! Core identifier and status types shared by every entity

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU8, Ordering};

/// Process-unique id of a network entity
pub type EntityId = i64;

/// Process-unique id of a backend session
pub type SessionId = i64;

/// Session id assigned by the upstream proxying node, meaningful only
/// within one multiplexed connection
pub type FrontendSid = i64;

/// Lifecycle status of a network entity
///
/// Monotonic: once `Closed`, an entity never returns to `Started`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[repr(u8)]
pub enum EntityStatus {
    Started = 0,
    Closed = 1,
}

/// Atomic cell holding an [`EntityStatus`]
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU8);

impl StatusCell {
    pub(crate) fn started() -> Self {
        Self(AtomicU8::new(EntityStatus::Started as u8))
    }

    pub(crate) fn get(&self) -> EntityStatus {
        match self.0.load(Ordering::Acquire) {
            0 => EntityStatus::Started,
            _ => EntityStatus::Closed,
        }
    }

    /// Mark closed, returning true only for the transition that actually closed it
    pub(crate) fn close(&self) -> bool {
        self.0.swap(EntityStatus::Closed as u8, Ordering::AcqRel) == EntityStatus::Started as u8
    }
}

/// Current unix time in milliseconds
pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
