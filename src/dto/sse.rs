use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::{
        board::{BoardCellDto, WinResultDto},
        presence::PresenceStateDto,
        queue::QueueEntryDto,
        session::{SessionPlayerDto, SessionSummary},
    },
    state::state_machine::SessionPhase,
};

#[derive(Clone, Debug)]
/// Dispatched payload carried across SSE channels.
pub struct ServerEvent {
    pub event: Option<String>,
    pub data: String,
}

impl ServerEvent {
    /// Convenience wrapper that serialises `payload` into the SSE data field.
    pub fn json<E, T>(event: E, payload: &T) -> serde_json::Result<Self>
    where
        E: Into<Option<String>>,
        T: Serialize,
    {
        Ok(Self {
            event: event.into(),
            data: serde_json::to_string(payload)?,
        })
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Initial metadata sent to an SSE client when it connects.
pub struct Handshake {
    /// Identifier of the stream (`lobby` or `session:<id>`).
    pub stream: String,
    /// Human-readable message confirming the subscription.
    pub message: String,
    /// Whether the backend is running without a storage backend connection.
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast on the lobby when the backend enters or leaves degraded mode.
pub struct SystemStatus {
    pub degraded: bool,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast after every accepted board write.
pub struct BoardUpdatedEvent {
    pub session_id: Uuid,
    pub version: u64,
    pub last_update: String,
    /// Player whose write was accepted.
    pub updated_by: String,
    pub current_state: Vec<BoardCellDto>,
    pub result: WinResultDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a board write decided the game.
pub struct SessionCompletedEvent {
    pub session_id: Uuid,
    /// Absent on ties.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    pub result: WinResultDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast on the lobby and the session stream when the phase changes.
pub struct SessionStatusEvent {
    pub session_id: Uuid,
    pub previous: SessionPhase,
    pub status: SessionPhase,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
/// Broadcast on the lobby when a session opens.
pub struct SessionCreatedEvent(pub SessionSummary);

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player takes a seat.
pub struct PlayerJoinedEvent {
    pub session_id: Uuid,
    pub player: SessionPlayerDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a player leaves their seat.
pub struct PlayerLeftEvent {
    pub session_id: Uuid,
    pub user_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast with the whole queue of a session whenever it changes.
pub struct QueueUpdatedEvent {
    pub session_id: Uuid,
    pub entries: Vec<QueueEntryDto>,
}

#[derive(Debug, Serialize, ToSchema)]
/// Broadcast when a user starts or stops being tracked.
pub struct PresenceChangeEvent {
    pub session_id: Uuid,
    pub presence: PresenceStateDto,
}

#[derive(Debug, Serialize, ToSchema)]
/// Full presence map of a session, sent after every join and leave.
pub struct PresenceSyncEvent {
    pub session_id: Uuid,
    pub presences: Vec<PresenceStateDto>,
}
