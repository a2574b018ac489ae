//! Cross-server RPC dispatch shared by both entity variants

use crate::cluster::CallKind;
use crate::codec::Args;
use crate::context::NetContext;
use crate::error::{LinkError, Result};
use crate::route::Route;
use crate::session::Session;
use bytes::Bytes;

/// Decode `route`, enforce that it targets another server type, and run
/// the call through the cluster transport
///
/// A route without a server type addresses the local node and is rejected
/// the same way as one naming the local type. The round-trip is bounded by
/// the configured call timeout; nothing is retried.
pub(crate) async fn dispatch(
    ctx: &NetContext,
    session: &Session,
    route: &str,
    args: Args,
) -> Result<Bytes> {
    let route = Route::decode(route)?;

    if route.server_type.is_empty() || route.server_type == ctx.server_type() {
        tracing::warn!(
            route = %route,
            server_type = %ctx.server_type(),
            "Rejected RPC to local server type"
        );
        return Err(LinkError::LocalCallAttempted {
            server_type: ctx.server_type().to_string(),
        });
    }

    let payload = args.encode()?;

    tracing::debug!(
        uid = session.uid(),
        session_id = session.id(),
        route = %route,
        args = args.len(),
        "Remote call"
    );

    let timeout = ctx.config().call_timeout();
    tokio::time::timeout(
        timeout,
        ctx.cluster().invoke(CallKind::User, &route, session, payload),
    )
    .await
    .map_err(|_| {
        LinkError::Timeout(format!(
            "call to '{}' exceeded {}s",
            route,
            timeout.as_secs()
        ))
    })?
}
