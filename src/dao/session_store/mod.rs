pub mod memory;
#[cfg(feature = "rest-store")]
pub mod postgrest;

use std::time::SystemTime;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::models::{
    BoardCellEntity, GameStateEntity, PlayerEntity, QueueEntryEntity, SessionEntity,
};
use crate::dao::storage::StorageResult;
use crate::state::state_machine::SessionPhase;

/// Outcome of a version-guarded board write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StateWrite {
    /// The stored version matched; the new state is returned.
    Applied(GameStateEntity),
    /// Another writer got there first.
    Conflict {
        /// Version currently stored.
        current_version: u64,
    },
    /// No such session.
    NotFound,
}

/// Status change guarded by the phase the caller observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    /// Session to update.
    pub session_id: Uuid,
    /// Phase the stored row must still be in.
    pub expected: SessionPhase,
    /// Phase to write.
    pub next: SessionPhase,
    /// Winner to record, if any.
    pub winner_id: Option<String>,
    /// Written to `started_at` when set.
    pub started_at: Option<SystemTime>,
    /// Written to `ended_at` when set.
    pub ended_at: Option<SystemTime>,
    /// Written to `updated_at`.
    pub at: SystemTime,
}

/// Outcome of a guarded status write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusWrite {
    /// The row was updated.
    Applied(SessionEntity),
    /// The stored phase no longer matches.
    Conflict {
        /// Phase currently stored.
        current: SessionPhase,
    },
    /// No such session.
    NotFound,
}

/// Outcome of seating a player.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerInsert {
    /// Player seated.
    Inserted,
    /// `max_players` already reached.
    SessionFull,
    /// User already seated.
    UserExists,
    /// Another player holds the requested color.
    ColorTaken,
}

/// Outcome of queueing a join request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueInsert {
    /// Entry stored with its assigned position.
    Inserted(QueueEntryEntity),
    /// The session queue reached its capacity.
    Full,
    /// The user already has a pending entry.
    AlreadyQueued,
}

/// Abstraction over the persistence layer for sessions, players and queues.
pub trait SessionStore: Send + Sync {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>>;
    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    fn list_sessions(
        &self,
        status: Option<SessionPhase>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>>;
    fn update_status(&self, update: StatusUpdate) -> BoxFuture<'static, StorageResult<StatusWrite>>;
    /// Replace the board if the stored version equals `expected_version`,
    /// bumping it by one.
    fn update_game_state(
        &self,
        session_id: Uuid,
        expected_version: u64,
        cells: Vec<BoardCellEntity>,
    ) -> BoxFuture<'static, StorageResult<StateWrite>>;

    fn insert_player(
        &self,
        player: PlayerEntity,
        max_players: usize,
    ) -> BoxFuture<'static, StorageResult<PlayerInsert>>;
    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>>;
    fn delete_player(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;

    /// Store `entry` unless the session queue holds `max_size` pending entries already.
    /// The store assigns the FIFO position.
    fn insert_queue_entry(
        &self,
        entry: QueueEntryEntity,
        max_size: usize,
    ) -> BoxFuture<'static, StorageResult<QueueInsert>>;
    fn find_queue_entry(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>>;
    /// Entries of one session, or of every session when `None`.
    fn list_queue(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>>;
    fn update_queue_entry(&self, entry: QueueEntryEntity)
    -> BoxFuture<'static, StorageResult<bool>>;
    fn delete_queue_entry(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;

    /// Short backend name reported by the health endpoint.
    fn backend_name(&self) -> &'static str;
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
