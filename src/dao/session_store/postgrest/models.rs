use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use serde_with::{TimestampMilliSeconds, serde_as};
use uuid::Uuid;

use crate::{
    dao::models::{
        BoardCellEntity, GameStateEntity, PlayerEntity, QueueEntryEntity, SessionEntity,
        SessionSettingsEntity,
    },
    state::{queue::QueueStatus, state_machine::SessionPhase},
};

pub const SESSIONS_TABLE: &str = "bingo_sessions";
pub const PLAYERS_TABLE: &str = "bingo_session_players";
pub const QUEUE_TABLE: &str = "bingo_session_queue";

/// Row of `bingo_sessions`. The board is a `jsonb` column next to its version.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: Uuid,
    pub session_code: String,
    pub host_id: String,
    pub status: SessionPhase,
    pub settings: SessionSettingsEntity,
    pub current_state: Vec<BoardCellEntity>,
    pub version: u64,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub last_update: SystemTime,
    pub winner_id: Option<String>,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub created_at: SystemTime,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: SystemTime,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    pub started_at: Option<SystemTime>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    pub ended_at: Option<SystemTime>,
}

impl From<SessionEntity> for SessionRow {
    fn from(session: SessionEntity) -> Self {
        Self {
            id: session.id,
            session_code: session.session_code,
            host_id: session.host_id,
            status: session.status,
            settings: session.settings,
            current_state: session.game_state.current_state,
            version: session.game_state.version,
            last_update: session.game_state.last_update,
            winner_id: session.winner_id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

impl From<SessionRow> for SessionEntity {
    fn from(row: SessionRow) -> Self {
        Self {
            id: row.id,
            session_code: row.session_code,
            host_id: row.host_id,
            status: row.status,
            settings: row.settings,
            game_state: GameStateEntity {
                current_state: row.current_state,
                version: row.version,
                last_update: row.last_update,
            },
            winner_id: row.winner_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            started_at: row.started_at,
            ended_at: row.ended_at,
        }
    }
}

/// Body of the version-guarded board PATCH.
#[serde_as]
#[derive(Debug, Serialize)]
pub struct GameStatePatch {
    pub current_state: Vec<BoardCellEntity>,
    pub version: u64,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub last_update: SystemTime,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: SystemTime,
}

/// Body of the phase-guarded status PATCH. Unset optionals are left untouched.
#[serde_as]
#[derive(Debug, Serialize)]
pub struct StatusPatch {
    pub status: SessionPhase,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub updated_at: SystemTime,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<SystemTime>,
    #[serde_as(as = "Option<TimestampMilliSeconds<i64>>")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<SystemTime>,
}

/// Row of `bingo_session_players`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlayerRow {
    pub session_id: Uuid,
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub joined_at: SystemTime,
    pub is_host: bool,
}

impl From<PlayerEntity> for PlayerRow {
    fn from(player: PlayerEntity) -> Self {
        Self {
            session_id: player.session_id,
            user_id: player.user_id,
            display_name: player.display_name,
            color: player.color,
            joined_at: player.joined_at,
            is_host: player.is_host,
        }
    }
}

impl From<PlayerRow> for PlayerEntity {
    fn from(row: PlayerRow) -> Self {
        Self {
            session_id: row.session_id,
            user_id: row.user_id,
            display_name: row.display_name,
            color: row.color,
            joined_at: row.joined_at,
            is_host: row.is_host,
        }
    }
}

/// Row of `bingo_session_queue`.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueRow {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: String,
    pub player_name: String,
    pub color: String,
    pub status: QueueStatus,
    #[serde_as(as = "TimestampMilliSeconds<i64>")]
    pub requested_at: SystemTime,
    pub position: u32,
    pub priority: i32,
}

impl From<QueueEntryEntity> for QueueRow {
    fn from(entry: QueueEntryEntity) -> Self {
        Self {
            id: entry.id,
            session_id: entry.session_id,
            user_id: entry.user_id,
            player_name: entry.player_name,
            color: entry.color,
            status: entry.status,
            requested_at: entry.requested_at,
            position: entry.position,
            priority: entry.priority,
        }
    }
}

impl From<QueueRow> for QueueEntryEntity {
    fn from(row: QueueRow) -> Self {
        Self {
            id: row.id,
            session_id: row.session_id,
            user_id: row.user_id,
            player_name: row.player_name,
            color: row.color,
            status: row.status,
            requested_at: row.requested_at,
            position: row.position,
            priority: row.priority,
        }
    }
}
