//! # a3s-link
//!
//! Connection actors, session translation, and cross-server RPC dispatch for
//! A3S cluster nodes.
//!
//! ## Overview
//!
//! A cluster is split into frontend nodes, which hold user connections, and
//! backend nodes, which hold state. `a3s-link` is the layer between a raw
//! connection and application handler code on either kind of node:
//!
//! - **BridgeEntity** — on a backend node, one connection from a frontend node
//!   multiplexes many user sessions. Frontend session ids are translated to
//!   process-wide backend sessions on the way in and back on the way out.
//! - **DirectEntity** — on the node terminating a user connection, the
//!   connection is bound 1:1 to one session.
//!
//! Both implement [`NetworkEntity`]: push, response, raw send, heartbeat,
//! close, and remote calls to nodes of *other* server types.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use a3s_link::{BridgeEntity, MemoryCluster, MockConnection, NetContext, NetService,
//!     NetworkEntity, NodeConfig};
//!
//! # async fn example() -> a3s_link::Result<()> {
//! let registry = Arc::new(NetService::new());
//! let ctx = Arc::new(NetContext::new(
//!     NodeConfig::new("chat"),
//!     registry.clone(),
//!     Arc::new(MemoryCluster::new()),
//! )?);
//!
//! // A frontend node connected to us
//! let bridge = BridgeEntity::accept(ctx, Arc::new(MockConnection::new()));
//! registry.register(bridge.clone().into()).await?;
//!
//! // Frame tagged with frontend sid 42 arrives
//! let session = bridge.resolve_or_create(42).await?;
//! bridge
//!     .push(&session, "room.message", serde_json::json!({"text": "hi"}).into())
//!     .await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - **NetworkEntity** trait — capability shared by both connection actors
//! - **ConnectionRegistry** trait — resolves entity ids; `NetService` implements it
//! - **ClusterTransport** trait — carries RPC calls; `MemoryCluster` implements it
//! - **Connection** trait — physical stream; `StreamConnection`, `MockConnection`
//! - **NetContext** — node config plus collaborators, injected at construction

pub mod bridge;
pub mod cluster;
pub mod codec;
pub mod config;
pub mod connection;
pub mod context;
pub mod direct;
pub mod entity;
pub mod error;
pub mod protocol;
pub mod registry;
pub mod route;
pub mod session;
pub mod types;

mod rpc;

// Re-export core types
pub use bridge::BridgeEntity;
pub use cluster::{CallKind, ClusterTransport, MemoryCluster, RemoteHandler};
pub use codec::{Args, ArgsReader, JsonSerializer, Payload, Serializer};
pub use config::NodeConfig;
pub use connection::{Connection, MockConnection, StreamConnection};
pub use context::NetContext;
pub use direct::DirectEntity;
pub use entity::{CallExt, EntityHandle, NetworkEntity};
pub use error::{LinkError, Result};
pub use protocol::{MessageKind, OutboundMessage};
pub use registry::{ConnectionRegistry, NetService, SessionClosedHook};
pub use route::Route;
pub use session::{Session, SessionFactory};
pub use types::{EntityId, EntityStatus, FrontendSid, SessionId};
