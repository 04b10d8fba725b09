//! Process-local store used when no remote backend is configured, and by tests.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::{self, BoxFuture, FutureExt};
use uuid::Uuid;

use crate::{
    dao::{
        models::{BoardCellEntity, PlayerEntity, QueueEntryEntity, SessionEntity},
        session_store::{
            PlayerInsert, QueueInsert, SessionStore, StateWrite, StatusUpdate, StatusWrite,
        },
        storage::StorageResult,
    },
    state::{
        queue::{QueueEntry, ensure_capacity, has_pending, next_position},
        state_machine::SessionPhase,
    },
};

struct SessionRecord {
    session: SessionEntity,
    players: Vec<PlayerEntity>,
    queue: Vec<QueueEntryEntity>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionRecord>,
    codes: DashMap<String, Uuid>,
}

/// [`SessionStore`] keeping every row in `DashMap`s. Each session's row,
/// players and queue share one map entry so guarded writes are atomic.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

impl MemorySessionStore {
    /// Build an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn ready<T: Send + 'static>(value: T) -> BoxFuture<'static, StorageResult<T>> {
        future::ready(Ok(value)).boxed()
    }
}

impl SessionStore for MemorySessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        self.inner
            .codes
            .insert(session.session_code.clone(), session.id);
        self.inner.sessions.insert(
            session.id,
            SessionRecord {
                session,
                players: Vec::new(),
                queue: Vec::new(),
            },
        );
        Self::ready(())
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self
            .inner
            .sessions
            .get(&id)
            .map(|record| record.session.clone());
        Self::ready(found)
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let found = self
            .inner
            .codes
            .get(&code)
            .map(|id| *id)
            .and_then(|id| self.inner.sessions.get(&id))
            .map(|record| record.session.clone());
        Self::ready(found)
    }

    fn list_sessions(
        &self,
        status: Option<SessionPhase>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let mut sessions = self
            .inner
            .sessions
            .iter()
            .filter(|record| status.is_none_or(|wanted| record.session.status == wanted))
            .map(|record| record.session.clone())
            .collect::<Vec<_>>();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Self::ready(sessions)
    }

    fn update_status(&self, update: StatusUpdate) -> BoxFuture<'static, StorageResult<StatusWrite>> {
        let outcome = match self.inner.sessions.get_mut(&update.session_id) {
            None => StatusWrite::NotFound,
            Some(mut record) => {
                let session = &mut record.session;
                if session.status != update.expected {
                    StatusWrite::Conflict {
                        current: session.status,
                    }
                } else {
                    session.status = update.next;
                    session.updated_at = update.at;
                    if update.winner_id.is_some() {
                        session.winner_id = update.winner_id;
                    }
                    if update.started_at.is_some() {
                        session.started_at = update.started_at;
                    }
                    if update.ended_at.is_some() {
                        session.ended_at = update.ended_at;
                    }
                    StatusWrite::Applied(session.clone())
                }
            }
        };
        Self::ready(outcome)
    }

    fn update_game_state(
        &self,
        session_id: Uuid,
        expected_version: u64,
        cells: Vec<BoardCellEntity>,
    ) -> BoxFuture<'static, StorageResult<StateWrite>> {
        let outcome = match self.inner.sessions.get_mut(&session_id) {
            None => StateWrite::NotFound,
            Some(mut record) => {
                let session = &mut record.session;
                let state = &mut session.game_state;
                if state.version != expected_version {
                    StateWrite::Conflict {
                        current_version: state.version,
                    }
                } else {
                    let now = SystemTime::now();
                    state.current_state = cells;
                    state.version += 1;
                    state.last_update = now;
                    let written = state.clone();
                    session.updated_at = now;
                    StateWrite::Applied(written)
                }
            }
        };
        Self::ready(outcome)
    }

    fn insert_player(
        &self,
        player: PlayerEntity,
        max_players: usize,
    ) -> BoxFuture<'static, StorageResult<PlayerInsert>> {
        let outcome = match self.inner.sessions.get_mut(&player.session_id) {
            None => PlayerInsert::SessionFull,
            Some(mut record) => {
                if record.players.iter().any(|p| p.user_id == player.user_id) {
                    PlayerInsert::UserExists
                } else if record.players.iter().any(|p| p.color == player.color) {
                    PlayerInsert::ColorTaken
                } else if record.players.len() >= max_players {
                    PlayerInsert::SessionFull
                } else {
                    record.players.push(player);
                    PlayerInsert::Inserted
                }
            }
        };
        Self::ready(outcome)
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let players = self
            .inner
            .sessions
            .get(&session_id)
            .map(|record| record.players.clone())
            .unwrap_or_default();
        Self::ready(players)
    }

    fn delete_player(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let removed = self
            .inner
            .sessions
            .get_mut(&session_id)
            .map(|mut record| {
                let before = record.players.len();
                record.players.retain(|p| p.user_id != user_id);
                record.players.len() != before
            })
            .unwrap_or(false);
        Self::ready(removed)
    }

    fn insert_queue_entry(
        &self,
        mut entry: QueueEntryEntity,
        max_size: usize,
    ) -> BoxFuture<'static, StorageResult<QueueInsert>> {
        let outcome = match self.inner.sessions.get_mut(&entry.session_id) {
            None => QueueInsert::Full,
            Some(mut record) => {
                let entries = record
                    .queue
                    .iter()
                    .cloned()
                    .map(QueueEntry::from)
                    .collect::<Vec<_>>();
                if has_pending(&entries, &entry.user_id) {
                    QueueInsert::AlreadyQueued
                } else if ensure_capacity(&entries, max_size).is_err() {
                    QueueInsert::Full
                } else {
                    entry.position = next_position(&entries);
                    record.queue.push(entry.clone());
                    QueueInsert::Inserted(entry)
                }
            }
        };
        Self::ready(outcome)
    }

    fn find_queue_entry(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>> {
        let found = self
            .inner
            .sessions
            .iter()
            .find_map(|record| record.queue.iter().find(|e| e.id == id).cloned());
        Self::ready(found)
    }

    fn list_queue(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>> {
        let mut entries = match session_id {
            Some(id) => self
                .inner
                .sessions
                .get(&id)
                .map(|record| record.queue.clone())
                .unwrap_or_default(),
            None => self
                .inner
                .sessions
                .iter()
                .flat_map(|record| record.queue.clone())
                .collect(),
        };
        entries.sort_by_key(|e| (e.position, e.requested_at));
        Self::ready(entries)
    }

    fn update_queue_entry(
        &self,
        entry: QueueEntryEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let updated = self
            .inner
            .sessions
            .get_mut(&entry.session_id)
            .and_then(|mut record| {
                let slot = record.queue.iter_mut().find(|e| e.id == entry.id)?;
                *slot = entry;
                Some(())
            })
            .is_some();
        Self::ready(updated)
    }

    fn delete_queue_entry(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let mut removed = false;
        for mut record in self.inner.sessions.iter_mut() {
            let before = record.queue.len();
            record.queue.retain(|e| e.id != id);
            if record.queue.len() != before {
                removed = true;
                break;
            }
        }
        Self::ready(removed)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Self::ready(())
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Self::ready(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dao::models::{GameStateEntity, SessionSettingsEntity};
    use crate::state::{queue::QueueStatus, win::WinConditions};

    fn session() -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            session_code: "ABC234".into(),
            host_id: "host".into(),
            status: SessionPhase::Waiting,
            settings: SessionSettingsEntity {
                board_size: 3,
                max_players: 2,
                win_conditions: WinConditions::default(),
                allow_queue: true,
                card_pool: Vec::new(),
            },
            game_state: GameStateEntity {
                current_state: Vec::new(),
                version: 0,
                last_update: now,
            },
            winner_id: None,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
        }
    }

    fn player(session_id: Uuid, user: &str, color: &str) -> PlayerEntity {
        PlayerEntity {
            session_id,
            user_id: user.into(),
            display_name: user.into(),
            color: color.into(),
            joined_at: SystemTime::now(),
            is_host: false,
        }
    }

    #[tokio::test]
    async fn version_guard_rejects_stale_writes() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let first = store.update_game_state(id, 0, Vec::new()).await.unwrap();
        assert!(matches!(first, StateWrite::Applied(ref s) if s.version == 1));

        let stale = store.update_game_state(id, 0, Vec::new()).await.unwrap();
        assert_eq!(stale, StateWrite::Conflict { current_version: 1 });

        let missing = store
            .update_game_state(Uuid::new_v4(), 0, Vec::new())
            .await
            .unwrap();
        assert_eq!(missing, StateWrite::NotFound);
    }

    #[tokio::test]
    async fn players_are_unique_and_capped() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let insert = |p| store.insert_player(p, 2);
        assert_eq!(insert(player(id, "a", "blue")).await.unwrap(), PlayerInsert::Inserted);
        assert_eq!(insert(player(id, "a", "red")).await.unwrap(), PlayerInsert::UserExists);
        assert_eq!(insert(player(id, "b", "blue")).await.unwrap(), PlayerInsert::ColorTaken);
        assert_eq!(insert(player(id, "b", "red")).await.unwrap(), PlayerInsert::Inserted);
        assert_eq!(insert(player(id, "c", "green")).await.unwrap(), PlayerInsert::SessionFull);
    }

    #[tokio::test]
    async fn status_guard_compares_phase() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let update = StatusUpdate {
            session_id: id,
            expected: SessionPhase::Active,
            next: SessionPhase::Paused,
            winner_id: None,
            started_at: None,
            ended_at: None,
            at: SystemTime::now(),
        };
        assert_eq!(
            store.update_status(update).await.unwrap(),
            StatusWrite::Conflict {
                current: SessionPhase::Waiting
            }
        );
    }

    #[tokio::test]
    async fn finds_sessions_by_code() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();
        let found = store.find_session_by_code("ABC234".into()).await.unwrap();
        assert_eq!(found.map(|s| s.id), Some(id));
        assert!(store.find_session_by_code("ZZZZZZ".into()).await.unwrap().is_none());
    }

    fn queued(session_id: Uuid, user: &str) -> QueueEntryEntity {
        QueueEntryEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id: user.into(),
            player_name: user.into(),
            color: "green".into(),
            status: QueueStatus::Pending,
            requested_at: SystemTime::now(),
            position: 0,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn queue_positions_are_fifo_and_capped() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let first = store.insert_queue_entry(queued(id, "a"), 2).await.unwrap();
        let second = store.insert_queue_entry(queued(id, "b"), 2).await.unwrap();
        match (first, second) {
            (QueueInsert::Inserted(a), QueueInsert::Inserted(b)) => {
                assert_eq!(a.position, 1);
                assert_eq!(b.position, 2);
            }
            other => panic!("unexpected inserts: {other:?}"),
        }

        assert_eq!(
            store.insert_queue_entry(queued(id, "a"), 5).await.unwrap(),
            QueueInsert::AlreadyQueued
        );
        assert_eq!(
            store.insert_queue_entry(queued(id, "c"), 2).await.unwrap(),
            QueueInsert::Full
        );

        let listed = store.list_queue(Some(id)).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert!(store.delete_queue_entry(listed[0].id).await.unwrap());
        assert!(!store.delete_queue_entry(listed[0].id).await.unwrap());
    }

    #[tokio::test]
    async fn settled_entries_free_queue_capacity() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let QueueInsert::Inserted(mut first) =
            store.insert_queue_entry(queued(id, "a"), 1).await.unwrap()
        else {
            panic!("first entry should be queued");
        };
        first.status = QueueStatus::Approved;
        assert!(store.update_queue_entry(first).await.unwrap());

        match store.insert_queue_entry(queued(id, "b"), 1).await.unwrap() {
            QueueInsert::Inserted(entry) => assert_eq!(entry.position, 1),
            other => panic!("unexpected insert: {other:?}"),
        }
    }

    #[tokio::test]
    async fn concurrent_writers_converge_on_accepted_writes() {
        let store = MemorySessionStore::new();
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let mut accepted = 0u64;
                for _ in 0..5 {
                    loop {
                        let current = store.find_session(id).await.unwrap().unwrap();
                        let write = store
                            .update_game_state(id, current.game_state.version, Vec::new())
                            .await
                            .unwrap();
                        if matches!(write, StateWrite::Applied(_)) {
                            accepted += 1;
                            break;
                        }
                    }
                }
                accepted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        let stored = store.find_session(id).await.unwrap().unwrap();
        assert_eq!(total, 40);
        assert_eq!(stored.game_state.version, total);
    }
}
