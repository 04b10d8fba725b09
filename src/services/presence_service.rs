//! Presence bookkeeping for connected clients and its broadcasts.

use std::time::SystemTime;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dto::presence::PresenceSnapshot,
    error::ServiceError,
    services::{session_service::load_session, sse_events},
    state::{
        SharedState,
        presence::{PresenceState, PresenceStatus, TrackKind},
    },
};

/// Current presence map of a session.
pub async fn snapshot(state: &SharedState, session_id: Uuid) -> Result<PresenceSnapshot, ServiceError> {
    ensure_session(state, session_id).await?;
    Ok(PresenceSnapshot::new(
        session_id,
        state.presence().snapshot(session_id),
    ))
}

/// Fail unless `session_id` names a stored session.
pub async fn ensure_session(state: &SharedState, session_id: Uuid) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    load_session(store.as_ref(), session_id).await.map(|_| ())
}

/// Track a user on connection `conn_id`, then broadcast the join and the full map.
pub fn track(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    status: PresenceStatus,
    conn_id: Uuid,
) -> PresenceState {
    let (presence, kind) =
        state
            .presence()
            .track(session_id, user_id, status, conn_id, SystemTime::now());
    info!(%session_id, %user_id, ?kind, "presence tracked");
    if kind == TrackKind::Joined {
        sse_events::broadcast_presence_join(state, session_id, presence.clone());
    }
    sse_events::broadcast_presence_sync(state, session_id);
    presence
}

/// Untrack a user if `conn_id` still owns the entry.
pub fn untrack(state: &SharedState, session_id: Uuid, user_id: &str, conn_id: Uuid) {
    if let Some(presence) = state.presence().untrack(session_id, user_id, conn_id) {
        info!(%session_id, %user_id, "presence untracked");
        sse_events::broadcast_presence_leave(state, session_id, presence);
        sse_events::broadcast_presence_sync(state, session_id);
    }
}

/// Record a status change reported by the client.
pub fn update_status(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
    conn_id: Uuid,
    status: PresenceStatus,
) -> Option<PresenceState> {
    let presence = state.presence().update_status(
        session_id,
        user_id,
        conn_id,
        status,
        SystemTime::now(),
    )?;
    debug!(%session_id, %user_id, ?status, "presence status changed");
    sse_events::broadcast_presence_sync(state, session_id);
    Some(presence)
}

/// Refresh `last_seen_at`. Nothing is broadcast.
pub fn heartbeat(state: &SharedState, session_id: Uuid, user_id: &str, conn_id: Uuid) -> bool {
    state
        .presence()
        .heartbeat(session_id, user_id, conn_id, SystemTime::now())
        .is_some()
}

/// Forget everyone tracked on a finished session and publish the empty map.
pub fn release_session(state: &SharedState, session_id: Uuid) {
    state.presence().clear_session(session_id);
    debug!(%session_id, "presence released");
    sse_events::broadcast_presence_sync(state, session_id);
}

/// Drop presences whose heartbeat is older than the configured timeout.
pub fn sweep_stale(state: &SharedState) -> usize {
    let removed = state
        .presence()
        .sweep_stale(SystemTime::now(), state.config().presence.timeout);
    let count = removed.len();
    let mut sessions = Vec::new();
    for (session_id, presence) in removed {
        info!(%session_id, user_id = %presence.user_id, "stale presence removed");
        sse_events::broadcast_presence_leave(state, session_id, presence);
        if !sessions.contains(&session_id) {
            sessions.push(session_id);
        }
    }
    for session_id in sessions {
        sse_events::broadcast_presence_sync(state, session_id);
    }
    count
}

/// Periodically run [`sweep_stale`].
pub async fn run_sweeper(state: SharedState) {
    let mut ticker = interval(state.config().presence.sweep_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        sweep_stale(&state);
    }
}
