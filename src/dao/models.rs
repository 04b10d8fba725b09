use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

use crate::state::{
    queue::QueueStatus, state_machine::SessionPhase, win::WinConditions,
};

/// Persisted form of a board cell.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct BoardCellEntity {
    /// Stable identifier of the cell.
    pub cell_id: String,
    /// Prompt displayed on the cell.
    pub text: String,
    /// Colors of the players who marked the cell.
    pub colors: Vec<String>,
    /// Players who marked the cell.
    pub completed_by: Vec<String>,
    /// Whether the cell is blocked.
    pub blocked: bool,
    /// Whether at least one player marked the cell.
    pub is_marked: bool,
}

/// Board contents with the optimistic-concurrency token.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameStateEntity {
    /// Row-major cells.
    pub current_state: Vec<BoardCellEntity>,
    /// Incremented on every accepted write.
    pub version: u64,
    /// Time of the last accepted write.
    pub last_update: SystemTime,
}

/// Settings chosen when the session was created.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionSettingsEntity {
    /// Board edge length.
    pub board_size: usize,
    /// Maximum number of seated players.
    pub max_players: usize,
    /// Enabled win rules.
    pub win_conditions: WinConditions,
    /// Whether joiners are queued when the session is full.
    pub allow_queue: bool,
    /// Prompts the board was drawn from.
    pub card_pool: Vec<String>,
}

/// Aggregate session row persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Short join code shared with friends.
    pub session_code: String,
    /// User who created the session.
    pub host_id: String,
    /// Lifecycle phase.
    pub status: SessionPhase,
    /// Creation settings.
    pub settings: SessionSettingsEntity,
    /// Board and version.
    pub game_state: GameStateEntity,
    /// Winner once completed; `None` for ties and unfinished sessions.
    pub winner_id: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the row changed.
    pub updated_at: SystemTime,
    /// When the session went active for the first time.
    pub started_at: Option<SystemTime>,
    /// When the session completed or was cancelled.
    pub ended_at: Option<SystemTime>,
}

/// Seated player of a session.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PlayerEntity {
    /// Session the player sits in.
    pub session_id: Uuid,
    /// Player identifier.
    pub user_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Color used to mark cells, unique within the session.
    pub color: String,
    /// When the player was seated.
    pub joined_at: SystemTime,
    /// Whether the player created the session.
    pub is_host: bool,
}

/// Queued join request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEntryEntity {
    /// Entry identifier.
    pub id: Uuid,
    /// Session the user asked to join.
    pub session_id: Uuid,
    /// Requesting user.
    pub user_id: String,
    /// Name the user will play under.
    pub player_name: String,
    /// Requested color.
    pub color: String,
    /// Lifecycle status.
    pub status: QueueStatus,
    /// When the request was made.
    pub requested_at: SystemTime,
    /// 1-based FIFO position.
    pub position: u32,
    /// Informational priority.
    pub priority: i32,
}
