use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::{
    dto::{
        board::WinResultDto,
        presence::PresenceStateDto,
        queue::QueueEntryDto,
        session::{SessionPlayerDto, SessionSummary},
        sse::{
            BoardUpdatedEvent, PlayerJoinedEvent, PlayerLeftEvent, PresenceChangeEvent,
            PresenceSyncEvent, QueueUpdatedEvent, ServerEvent, SessionCompletedEvent,
            SessionCreatedEvent, SessionStatusEvent, SystemStatus,
        },
    },
    state::{SharedState, presence::PresenceState, state_machine::SessionPhase},
};

pub const EVENT_SESSION_CREATED: &str = "session.created";
pub const EVENT_SESSION_STATUS: &str = "session.status";
pub const EVENT_SESSION_COMPLETED: &str = "session.completed";
pub const EVENT_BOARD_UPDATED: &str = "board.updated";
pub const EVENT_PLAYER_JOINED: &str = "player.joined";
pub const EVENT_PLAYER_LEFT: &str = "player.left";
pub const EVENT_QUEUE_UPDATED: &str = "queue.updated";
pub const EVENT_PRESENCE_JOIN: &str = "presence.join";
pub const EVENT_PRESENCE_LEAVE: &str = "presence.leave";
pub const EVENT_PRESENCE_SYNC: &str = "presence.sync";
pub const EVENT_SYSTEM_STATUS: &str = "system.status";

/// Announce a new session on the lobby stream.
pub fn broadcast_session_created(state: &SharedState, summary: SessionSummary) {
    send_lobby_event(state, EVENT_SESSION_CREATED, &SessionCreatedEvent(summary));
}

/// Announce a phase change on the lobby and on the session stream.
pub fn broadcast_status_changed(
    state: &SharedState,
    session_id: Uuid,
    previous: SessionPhase,
    status: SessionPhase,
) {
    let payload = SessionStatusEvent {
        session_id,
        previous,
        status,
    };
    send_lobby_event(state, EVENT_SESSION_STATUS, &payload);
    send_session_event(state, session_id, EVENT_SESSION_STATUS, &payload);
}

/// Broadcast the board after an accepted write.
pub fn broadcast_board_updated(state: &SharedState, payload: BoardUpdatedEvent) {
    send_session_event(state, payload.session_id, EVENT_BOARD_UPDATED, &payload);
}

/// Broadcast the final result of a decided game.
pub fn broadcast_session_completed(state: &SharedState, session_id: Uuid, result: WinResultDto) {
    let payload = SessionCompletedEvent {
        session_id,
        winner_id: result.winner_id.clone(),
        result,
    };
    send_session_event(state, session_id, EVENT_SESSION_COMPLETED, &payload);
}

pub fn broadcast_player_joined(state: &SharedState, session_id: Uuid, player: SessionPlayerDto) {
    let payload = PlayerJoinedEvent { session_id, player };
    send_session_event(state, session_id, EVENT_PLAYER_JOINED, &payload);
}

pub fn broadcast_player_left(state: &SharedState, session_id: Uuid, user_id: &str) {
    let payload = PlayerLeftEvent {
        session_id,
        user_id: user_id.to_string(),
    };
    send_session_event(state, session_id, EVENT_PLAYER_LEFT, &payload);
}

/// Broadcast the current queue of a session.
pub fn broadcast_queue_updated(state: &SharedState, session_id: Uuid, entries: Vec<QueueEntryDto>) {
    let payload = QueueUpdatedEvent {
        session_id,
        entries,
    };
    send_session_event(state, session_id, EVENT_QUEUE_UPDATED, &payload);
}

pub fn broadcast_presence_join(state: &SharedState, session_id: Uuid, presence: PresenceState) {
    let payload = PresenceChangeEvent {
        session_id,
        presence: presence.into(),
    };
    send_session_event(state, session_id, EVENT_PRESENCE_JOIN, &payload);
}

pub fn broadcast_presence_leave(state: &SharedState, session_id: Uuid, presence: PresenceState) {
    let payload = PresenceChangeEvent {
        session_id,
        presence: presence.into(),
    };
    send_session_event(state, session_id, EVENT_PRESENCE_LEAVE, &payload);
}

/// Broadcast the full presence map of a session.
pub fn broadcast_presence_sync(state: &SharedState, session_id: Uuid) {
    let presences = state
        .presence()
        .snapshot(session_id)
        .into_iter()
        .map(PresenceStateDto::from)
        .collect();
    let payload = PresenceSyncEvent {
        session_id,
        presences,
    };
    send_session_event(state, session_id, EVENT_PRESENCE_SYNC, &payload);
}

/// Tell lobby listeners whether the backend runs without storage.
pub fn broadcast_system_status(state: &SharedState, degraded: bool) {
    send_lobby_event(state, EVENT_SYSTEM_STATUS, &SystemStatus { degraded });
}

fn send_lobby_event<T: Serialize>(state: &SharedState, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.sse().lobby().broadcast(message),
        Err(err) => warn!(event, error = %err, "failed to serialize lobby event"),
    }
}

fn send_session_event<T: Serialize>(state: &SharedState, session_id: Uuid, event: &str, payload: &T) {
    match ServerEvent::json(Some(event.to_string()), payload) {
        Ok(message) => state.sse().broadcast_session(session_id, message),
        Err(err) => warn!(%session_id, event, error = %err, "failed to serialize session event"),
    }
}
