//! Runtime representation of sessions and their players.

use std::time::SystemTime;

use uuid::Uuid;

use crate::dao::models::{
    BoardCellEntity, GameStateEntity, PlayerEntity, QueueEntryEntity, SessionEntity,
    SessionSettingsEntity,
};
use crate::state::{
    board::{BoardCell, GameState},
    queue::QueueEntry,
    state_machine::SessionPhase,
    win::WinConditions,
};

/// Settings fixed when a session is created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSettings {
    /// Board edge length, 3 to 6.
    pub board_size: usize,
    /// Maximum number of seated players.
    pub max_players: usize,
    /// Enabled win rules.
    pub win_conditions: WinConditions,
    /// Queue joiners once every seat is taken instead of refusing them.
    pub allow_queue: bool,
    /// Prompts the board was drawn from; empty for numbered cells.
    pub card_pool: Vec<String>,
}

/// A player seated in a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionPlayer {
    /// Player identifier.
    pub user_id: String,
    /// Name shown to other players.
    pub display_name: String,
    /// Marking color, unique within the session.
    pub color: String,
    /// When the player was seated.
    pub joined_at: SystemTime,
    /// Whether the player hosts the session.
    pub is_host: bool,
}

/// Aggregated state of one bingo session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Primary key.
    pub id: Uuid,
    /// Six-character join code.
    pub session_code: String,
    /// Player who created the session.
    pub host_id: String,
    /// Lifecycle phase.
    pub status: SessionPhase,
    /// Creation settings.
    pub settings: SessionSettings,
    /// Board and version.
    pub game_state: GameState,
    /// Winner once completed; `None` on ties.
    pub winner_id: Option<String>,
    /// Creation timestamp.
    pub created_at: SystemTime,
    /// Last time the row changed.
    pub updated_at: SystemTime,
    /// First transition to active.
    pub started_at: Option<SystemTime>,
    /// Completion or cancellation time.
    pub ended_at: Option<SystemTime>,
}

impl Session {
    /// Whether `user_id` hosts this session.
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }
}

impl From<BoardCellEntity> for BoardCell {
    fn from(entity: BoardCellEntity) -> Self {
        Self {
            cell_id: entity.cell_id,
            text: entity.text,
            colors: entity.colors,
            completed_by: entity.completed_by,
            blocked: entity.blocked,
            is_marked: entity.is_marked,
        }
    }
}

impl From<BoardCell> for BoardCellEntity {
    fn from(cell: BoardCell) -> Self {
        Self {
            cell_id: cell.cell_id,
            text: cell.text,
            colors: cell.colors,
            completed_by: cell.completed_by,
            blocked: cell.blocked,
            is_marked: cell.is_marked,
        }
    }
}

impl From<GameStateEntity> for GameState {
    fn from(entity: GameStateEntity) -> Self {
        Self {
            cells: entity.current_state.into_iter().map(Into::into).collect(),
            version: entity.version,
            last_update: entity.last_update,
        }
    }
}

impl From<GameState> for GameStateEntity {
    fn from(state: GameState) -> Self {
        Self {
            current_state: state.cells.into_iter().map(Into::into).collect(),
            version: state.version,
            last_update: state.last_update,
        }
    }
}

impl From<SessionSettingsEntity> for SessionSettings {
    fn from(entity: SessionSettingsEntity) -> Self {
        Self {
            board_size: entity.board_size,
            max_players: entity.max_players,
            win_conditions: entity.win_conditions,
            allow_queue: entity.allow_queue,
            card_pool: entity.card_pool,
        }
    }
}

impl From<SessionSettings> for SessionSettingsEntity {
    fn from(settings: SessionSettings) -> Self {
        Self {
            board_size: settings.board_size,
            max_players: settings.max_players,
            win_conditions: settings.win_conditions,
            allow_queue: settings.allow_queue,
            card_pool: settings.card_pool,
        }
    }
}

impl From<SessionEntity> for Session {
    fn from(entity: SessionEntity) -> Self {
        Self {
            id: entity.id,
            session_code: entity.session_code,
            host_id: entity.host_id,
            status: entity.status,
            settings: entity.settings.into(),
            game_state: entity.game_state.into(),
            winner_id: entity.winner_id,
            created_at: entity.created_at,
            updated_at: entity.updated_at,
            started_at: entity.started_at,
            ended_at: entity.ended_at,
        }
    }
}

impl From<Session> for SessionEntity {
    fn from(session: Session) -> Self {
        Self {
            id: session.id,
            session_code: session.session_code,
            host_id: session.host_id,
            status: session.status,
            settings: session.settings.into(),
            game_state: session.game_state.into(),
            winner_id: session.winner_id,
            created_at: session.created_at,
            updated_at: session.updated_at,
            started_at: session.started_at,
            ended_at: session.ended_at,
        }
    }
}

impl From<PlayerEntity> for SessionPlayer {
    fn from(entity: PlayerEntity) -> Self {
        Self {
            user_id: entity.user_id,
            display_name: entity.display_name,
            color: entity.color,
            joined_at: entity.joined_at,
            is_host: entity.is_host,
        }
    }
}

impl SessionPlayer {
    /// Persisted form of the player within `session_id`.
    pub fn into_entity(self, session_id: Uuid) -> PlayerEntity {
        PlayerEntity {
            session_id,
            user_id: self.user_id,
            display_name: self.display_name,
            color: self.color,
            joined_at: self.joined_at,
            is_host: self.is_host,
        }
    }
}

impl From<QueueEntryEntity> for QueueEntry {
    fn from(entity: QueueEntryEntity) -> Self {
        Self {
            id: entity.id,
            session_id: entity.session_id,
            user_id: entity.user_id,
            player_name: entity.player_name,
            color: entity.color,
            status: entity.status,
            requested_at: entity.requested_at,
            position: entity.position,
            priority: entity.priority,
        }
    }
}

impl From<QueueEntry> for QueueEntryEntity {
    fn from(entry: QueueEntry) -> Self {
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

/// Colors already taken by `players`.
pub fn used_colors(players: &[SessionPlayer]) -> Vec<String> {
    players.iter().map(|p| p.color.clone()).collect()
}
