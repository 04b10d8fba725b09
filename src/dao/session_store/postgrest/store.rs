use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::warn;
use uuid::Uuid;

use crate::dao::{
    models::{BoardCellEntity, PlayerEntity, QueueEntryEntity, SessionEntity},
    session_store::{
        PlayerInsert, QueueInsert, SessionStore, StateWrite, StatusUpdate, StatusWrite,
    },
    storage::StorageResult,
};
use crate::state::{
    queue::{QueueEntry, ensure_capacity, has_pending, next_position},
    state_machine::SessionPhase,
};

use super::{
    config::{PostgrestConfig, RetryPolicy},
    error::{PostgrestError, PostgrestResult},
    models::{
        GameStatePatch, PLAYERS_TABLE, PlayerRow, QUEUE_TABLE, QueueRow, SESSIONS_TABLE,
        SessionRow, StatusPatch,
    },
};

const RETURN_REPRESENTATION: &str = "return=representation";

/// When a failed request may be sent again.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Replay {
    /// Reads and whole-row overwrites; repeating them changes nothing.
    Safe,
    /// Guarded or inserting writes; only resent if the first attempt never left.
    Unsent,
}

fn eq(value: impl std::fmt::Display) -> String {
    format!("eq.{value}")
}

/// [`SessionStore`] backed by a PostgREST endpoint such as Supabase.
#[derive(Clone)]
pub struct PostgrestSessionStore {
    client: Client,
    rest_root: Arc<str>,
    service_key: Arc<str>,
    retry: RetryPolicy,
}

impl PostgrestSessionStore {
    /// Build the client and verify the endpoint answers.
    pub async fn connect(config: PostgrestConfig) -> PostgrestResult<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|source| PostgrestError::ClientBuilder { source })?;

        let store = Self {
            client,
            rest_root: Arc::from(config.rest_root()),
            service_key: Arc::from(config.service_key),
            retry: config.retry,
        };

        store.ping().await?;
        Ok(store)
    }

    fn request(&self, method: Method, table: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.rest_root, table);
        self.client
            .request(method, url)
            .header("apikey", self.service_key.as_ref())
            .bearer_auth(self.service_key.as_ref())
    }

    /// Send the request built by `build`, retrying transient failures.
    async fn execute<F>(&self, table: &str, replay: Replay, build: F) -> PostgrestResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut attempt = 1;
        loop {
            let err = match build().send().await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let body = response.text().await.unwrap_or_default();
                    PostgrestError::RequestStatus {
                        table: table.to_string(),
                        status,
                        body,
                    }
                }
                Err(source) => PostgrestError::RequestSend {
                    table: table.to_string(),
                    source,
                },
            };

            let retryable = match replay {
                Replay::Safe => err.is_transient(),
                Replay::Unsent => err.is_unsent(),
            };
            if attempt >= self.retry.attempts || !retryable {
                return Err(err);
            }

            let delay = self.retry.delay_after(attempt);
            warn!(table, attempt, ?delay, error = %err, "retrying PostgREST request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    async fn rows<T, F>(&self, table: &str, replay: Replay, build: F) -> PostgrestResult<Vec<T>>
    where
        T: DeserializeOwned,
        F: Fn() -> RequestBuilder,
    {
        let response = self.execute(table, replay, build).await?;
        response
            .json::<Vec<T>>()
            .await
            .map_err(|source| PostgrestError::DeserializeRow {
                table: table.to_string(),
                source,
            })
    }

    async fn ping(&self) -> PostgrestResult<()> {
        self.execute(SESSIONS_TABLE, Replay::Safe, || {
            self.request(Method::GET, SESSIONS_TABLE)
                .query(&[("select", "id"), ("limit", "1")])
        })
        .await
        .map(|_| ())
    }

    async fn fetch_session(&self, id: Uuid) -> PostgrestResult<Option<SessionRow>> {
        let rows = self
            .rows::<SessionRow, _>(SESSIONS_TABLE, Replay::Safe, || {
                self.request(Method::GET, SESSIONS_TABLE)
                    .query(&[("id", eq(id)), ("limit", "1".to_string())])
            })
            .await?;
        Ok(rows.into_iter().next())
    }

    async fn fetch_players(&self, session_id: Uuid) -> PostgrestResult<Vec<PlayerRow>> {
        self.rows(PLAYERS_TABLE, Replay::Safe, || {
            self.request(Method::GET, PLAYERS_TABLE).query(&[
                ("session_id", eq(session_id)),
                ("order", "joined_at.asc".to_string()),
            ])
        })
        .await
    }

    async fn fetch_queue(&self, session_id: Option<Uuid>) -> PostgrestResult<Vec<QueueRow>> {
        self.rows(QUEUE_TABLE, Replay::Safe, || {
            let builder = self
                .request(Method::GET, QUEUE_TABLE)
                .query(&[("order", "position.asc,requested_at.asc")]);
            match session_id {
                Some(id) => builder.query(&[("session_id", eq(id))]),
                None => builder,
            }
        })
        .await
    }

    async fn fetch_queue_row(&self, id: Uuid) -> PostgrestResult<Option<QueueRow>> {
        let rows = self
            .rows::<QueueRow, _>(QUEUE_TABLE, Replay::Safe, || {
                self.request(Method::GET, QUEUE_TABLE)
                    .query(&[("id", eq(id)), ("limit", "1".to_string())])
            })
            .await?;
        Ok(rows.into_iter().next())
    }

    fn classify_player(
        players: &[PlayerRow],
        player: &PlayerEntity,
        max: usize,
    ) -> Option<PlayerInsert> {
        if players.iter().any(|p| p.user_id == player.user_id) {
            Some(PlayerInsert::UserExists)
        } else if players.iter().any(|p| p.color == player.color) {
            Some(PlayerInsert::ColorTaken)
        } else if players.len() >= max {
            Some(PlayerInsert::SessionFull)
        } else {
            None
        }
    }
}

impl SessionStore for PostgrestSessionStore {
    fn insert_session(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let id = session.id;
            let row = SessionRow::from(session);
            let inserted = store
                .execute(SESSIONS_TABLE, Replay::Unsent, || {
                    store.request(Method::POST, SESSIONS_TABLE).json(&row)
                })
                .await;
            match inserted {
                Ok(_) => Ok(()),
                Err(err) if err.may_have_committed() => match store.fetch_session(id).await? {
                    Some(_) => {
                        warn!(session_id = %id, error = %err, "session insert answered late but was stored");
                        Ok(())
                    }
                    None => Err(err.into()),
                },
                Err(err) => Err(err.into()),
            }
        })
    }

    fn find_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.fetch_session(id).await?.map(Into::into)) })
    }

    fn find_session_by_code(
        &self,
        code: String,
    ) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .rows::<SessionRow, _>(SESSIONS_TABLE, Replay::Safe, || {
                    store.request(Method::GET, SESSIONS_TABLE).query(&[
                        ("session_code", eq(&code)),
                        ("order", "created_at.desc".to_string()),
                        ("limit", "1".to_string()),
                    ])
                })
                .await?;
            Ok(rows.into_iter().next().map(Into::into))
        })
    }

    fn list_sessions(
        &self,
        status: Option<SessionPhase>,
    ) -> BoxFuture<'static, StorageResult<Vec<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .rows::<SessionRow, _>(SESSIONS_TABLE, Replay::Safe, || {
                    let builder = store
                        .request(Method::GET, SESSIONS_TABLE)
                        .query(&[("order", "created_at.desc")]);
                    match status {
                        Some(phase) => builder.query(&[("status", eq(phase.as_str()))]),
                        None => builder,
                    }
                })
                .await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_status(&self, update: StatusUpdate) -> BoxFuture<'static, StorageResult<StatusWrite>> {
        let store = self.clone();
        Box::pin(async move {
            let patch = StatusPatch {
                status: update.next,
                updated_at: update.at,
                winner_id: update.winner_id,
                started_at: update.started_at,
                ended_at: update.ended_at,
            };
            let written = store
                .rows::<SessionRow, _>(SESSIONS_TABLE, Replay::Unsent, || {
                    store
                        .request(Method::PATCH, SESSIONS_TABLE)
                        .query(&[
                            ("id", eq(update.session_id)),
                            ("status", eq(update.expected.as_str())),
                        ])
                        .header("Prefer", RETURN_REPRESENTATION)
                        .json(&patch)
                })
                .await;
            let rows = match written {
                Ok(rows) => rows,
                Err(err) if err.may_have_committed() => {
                    return match store.fetch_session(update.session_id).await? {
                        Some(row) if row.status == update.next => {
                            warn!(session_id = %update.session_id, error = %err, "status write answered late but was stored");
                            Ok(StatusWrite::Applied(row.into()))
                        }
                        Some(row) if row.status != update.expected => {
                            Ok(StatusWrite::Conflict { current: row.status })
                        }
                        Some(_) => Err(err.into()),
                        None => Ok(StatusWrite::NotFound),
                    };
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(row) = rows.into_iter().next() {
                return Ok(StatusWrite::Applied(row.into()));
            }
            Ok(match store.fetch_session(update.session_id).await? {
                Some(row) => StatusWrite::Conflict {
                    current: row.status,
                },
                None => StatusWrite::NotFound,
            })
        })
    }

    fn update_game_state(
        &self,
        session_id: Uuid,
        expected_version: u64,
        cells: Vec<BoardCellEntity>,
    ) -> BoxFuture<'static, StorageResult<StateWrite>> {
        let store = self.clone();
        Box::pin(async move {
            let now = std::time::SystemTime::now();
            let patch = GameStatePatch {
                current_state: cells,
                version: expected_version + 1,
                last_update: now,
                updated_at: now,
            };
            let written = store
                .rows::<SessionRow, _>(SESSIONS_TABLE, Replay::Unsent, || {
                    store
                        .request(Method::PATCH, SESSIONS_TABLE)
                        .query(&[
                            ("id", eq(session_id)),
                            ("version", eq(expected_version)),
                        ])
                        .header("Prefer", RETURN_REPRESENTATION)
                        .json(&patch)
                })
                .await;
            let rows = match written {
                Ok(rows) => rows,
                // The answer was lost; the stored row tells whether this write landed.
                Err(err) if err.may_have_committed() => {
                    return match store.fetch_session(session_id).await? {
                        Some(row)
                            if row.version == patch.version
                                && row.current_state == patch.current_state =>
                        {
                            warn!(%session_id, version = row.version, error = %err, "board write answered late but was stored");
                            Ok(StateWrite::Applied(SessionEntity::from(row).game_state))
                        }
                        Some(row) if row.version != expected_version => Ok(StateWrite::Conflict {
                            current_version: row.version,
                        }),
                        Some(_) => Err(err.into()),
                        None => Ok(StateWrite::NotFound),
                    };
                }
                Err(err) => return Err(err.into()),
            };

            if let Some(row) = rows.into_iter().next() {
                let session = SessionEntity::from(row);
                return Ok(StateWrite::Applied(session.game_state));
            }
            Ok(match store.fetch_session(session_id).await? {
                Some(row) => StateWrite::Conflict {
                    current_version: row.version,
                },
                None => StateWrite::NotFound,
            })
        })
    }

    fn insert_player(
        &self,
        player: PlayerEntity,
        max_players: usize,
    ) -> BoxFuture<'static, StorageResult<PlayerInsert>> {
        let store = self.clone();
        Box::pin(async move {
            let players = store.fetch_players(player.session_id).await?;
            if let Some(rejected) = Self::classify_player(&players, &player, max_players) {
                return Ok(rejected);
            }

            let row = PlayerRow::from(player.clone());
            let inserted = store
                .execute(PLAYERS_TABLE, Replay::Unsent, || {
                    store.request(Method::POST, PLAYERS_TABLE).json(&row)
                })
                .await;
            match inserted {
                Ok(_) => Ok(PlayerInsert::Inserted),
                Err(err) if err.may_have_committed() => {
                    let players = store.fetch_players(player.session_id).await?;
                    if players
                        .iter()
                        .any(|p| p.user_id == player.user_id && p.color == player.color)
                    {
                        warn!(session_id = %player.session_id, user_id = %player.user_id, error = %err, "player insert answered late but was stored");
                        Ok(PlayerInsert::Inserted)
                    } else {
                        Err(err.into())
                    }
                }
                // A concurrent join won the unique constraint; report which one.
                Err(err) if err.is_unique_violation() => {
                    let players = store.fetch_players(player.session_id).await?;
                    Ok(Self::classify_player(&players, &player, max_players)
                        .unwrap_or(PlayerInsert::UserExists))
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn list_players(&self, session_id: Uuid) -> BoxFuture<'static, StorageResult<Vec<PlayerEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store.fetch_players(session_id).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn delete_player(
        &self,
        session_id: Uuid,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .rows::<PlayerRow, _>(PLAYERS_TABLE, Replay::Unsent, || {
                    store
                        .request(Method::DELETE, PLAYERS_TABLE)
                        .query(&[("session_id", eq(session_id)), ("user_id", eq(&user_id))])
                        .header("Prefer", RETURN_REPRESENTATION)
                })
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn insert_queue_entry(
        &self,
        mut entry: QueueEntryEntity,
        max_size: usize,
    ) -> BoxFuture<'static, StorageResult<QueueInsert>> {
        let store = self.clone();
        Box::pin(async move {
            let queue = store
                .fetch_queue(Some(entry.session_id))
                .await?
                .into_iter()
                .map(|row| QueueEntry::from(QueueEntryEntity::from(row)))
                .collect::<Vec<_>>();
            if has_pending(&queue, &entry.user_id) {
                return Ok(QueueInsert::AlreadyQueued);
            }
            if ensure_capacity(&queue, max_size).is_err() {
                return Ok(QueueInsert::Full);
            }

            entry.position = next_position(&queue);
            let id = entry.id;
            let row = QueueRow::from(entry);
            let written = store
                .rows::<QueueRow, _>(QUEUE_TABLE, Replay::Unsent, || {
                    store
                        .request(Method::POST, QUEUE_TABLE)
                        .header("Prefer", RETURN_REPRESENTATION)
                        .json(&row)
                })
                .await;
            let rows = match written {
                Ok(rows) => rows,
                Err(err) if err.may_have_committed() => {
                    return match store.fetch_queue_row(id).await? {
                        Some(stored) => {
                            warn!(entry_id = %id, error = %err, "queue insert answered late but was stored");
                            Ok(QueueInsert::Inserted(stored.into()))
                        }
                        None => Err(err.into()),
                    };
                }
                Err(err) => return Err(err.into()),
            };
            Ok(match rows.into_iter().next() {
                Some(stored) => QueueInsert::Inserted(stored.into()),
                None => QueueInsert::Inserted(row.into()),
            })
        })
    }

    fn find_queue_entry(
        &self,
        id: Uuid,
    ) -> BoxFuture<'static, StorageResult<Option<QueueEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.fetch_queue_row(id).await?.map(Into::into)) })
    }

    fn list_queue(
        &self,
        session_id: Option<Uuid>,
    ) -> BoxFuture<'static, StorageResult<Vec<QueueEntryEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store.fetch_queue(session_id).await?;
            Ok(rows.into_iter().map(Into::into).collect())
        })
    }

    fn update_queue_entry(
        &self,
        entry: QueueEntryEntity,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let id = entry.id;
            let row = QueueRow::from(entry);
            let rows = store
                .rows::<QueueRow, _>(QUEUE_TABLE, Replay::Safe, || {
                    store
                        .request(Method::PATCH, QUEUE_TABLE)
                        .query(&[("id", eq(id))])
                        .header("Prefer", RETURN_REPRESENTATION)
                        .json(&row)
                })
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn delete_queue_entry(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            let rows = store
                .rows::<QueueRow, _>(QUEUE_TABLE, Replay::Unsent, || {
                    store
                        .request(Method::DELETE, QUEUE_TABLE)
                        .query(&[("id", eq(id))])
                        .header("Prefer", RETURN_REPRESENTATION)
                })
                .await?;
            Ok(!rows.is_empty())
        })
    }

    fn backend_name(&self) -> &'static str {
        "postgrest"
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.ping().await.map_err(Into::into) })
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::HashMap,
        net::SocketAddr,
        sync::{
            Mutex,
            atomic::{AtomicBool, AtomicUsize, Ordering},
        },
        time::{Duration, SystemTime},
    };

    use axum::{
        Json, Router,
        extract::{Path, Query, State},
        http::StatusCode,
        response::{IntoResponse, Response},
        routing::get,
    };
    use serde_json::{Value, json};

    use super::*;
    use crate::dao::models::{GameStateEntity, SessionSettingsEntity};
    use crate::state::{queue::QueueStatus, win::WinConditions};

    const STALL: Duration = Duration::from_millis(500);
    const CLIENT_TIMEOUT: Duration = Duration::from_millis(200);

    /// Tiny PostgREST stand-in: `eq.` filters, representation bodies and a
    /// unique constraint on players.
    #[derive(Default)]
    struct FakeRest {
        tables: Mutex<HashMap<String, Vec<Value>>>,
        writes: AtomicUsize,
        stall_next_write: AtomicBool,
        racing_player: Mutex<Option<Value>>,
    }

    impl FakeRest {
        fn writes(&self) -> usize {
            self.writes.load(Ordering::SeqCst)
        }

        fn rows(&self, table: &str) -> Vec<Value> {
            self.tables
                .lock()
                .unwrap()
                .get(table)
                .cloned()
                .unwrap_or_default()
        }

        async fn finish_write(&self) {
            self.writes.fetch_add(1, Ordering::SeqCst);
            if self.stall_next_write.swap(false, Ordering::SeqCst) {
                tokio::time::sleep(STALL).await;
            }
        }
    }

    fn row_matches(row: &Value, filters: &HashMap<String, String>) -> bool {
        filters
            .iter()
            .filter(|(key, _)| !matches!(key.as_str(), "select" | "order" | "limit"))
            .all(|(key, value)| {
                let expected = value.strip_prefix("eq.").unwrap_or(value);
                match row.get(key) {
                    Some(Value::String(text)) => text == expected,
                    Some(other) => other.to_string() == expected,
                    None => false,
                }
            })
    }

    async fn select(
        State(rest): State<Arc<FakeRest>>,
        Path(table): Path<String>,
        Query(filters): Query<HashMap<String, String>>,
    ) -> Json<Vec<Value>> {
        let rows = rest.rows(&table);
        Json(rows.into_iter().filter(|row| row_matches(row, &filters)).collect())
    }

    async fn insert(
        State(rest): State<Arc<FakeRest>>,
        Path(table): Path<String>,
        Json(row): Json<Value>,
    ) -> Response {
        {
            let mut tables = rest.tables.lock().unwrap();
            let rows = tables.entry(table.clone()).or_default();
            if table == PLAYERS_TABLE {
                if let Some(racer) = rest.racing_player.lock().unwrap().take() {
                    rows.push(racer);
                }
                let clash = rows.iter().any(|existing| {
                    existing["session_id"] == row["session_id"]
                        && (existing["user_id"] == row["user_id"]
                            || existing["color"] == row["color"])
                });
                if clash {
                    return (StatusCode::CONFLICT, Json(json!({ "code": "23505" })))
                        .into_response();
                }
            }
            rows.push(row.clone());
        }
        rest.finish_write().await;
        (StatusCode::CREATED, Json(vec![row])).into_response()
    }

    async fn update(
        State(rest): State<Arc<FakeRest>>,
        Path(table): Path<String>,
        Query(filters): Query<HashMap<String, String>>,
        Json(patch): Json<Value>,
    ) -> Json<Vec<Value>> {
        let updated = {
            let mut tables = rest.tables.lock().unwrap();
            let rows = tables.entry(table).or_default();
            let mut updated = Vec::new();
            for row in rows.iter_mut().filter(|row| row_matches(row, &filters)) {
                if let (Some(target), Some(fields)) = (row.as_object_mut(), patch.as_object()) {
                    for (key, value) in fields {
                        target.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
            updated
        };
        rest.finish_write().await;
        Json(updated)
    }

    async fn remove(
        State(rest): State<Arc<FakeRest>>,
        Path(table): Path<String>,
        Query(filters): Query<HashMap<String, String>>,
    ) -> Json<Vec<Value>> {
        let removed = {
            let mut tables = rest.tables.lock().unwrap();
            let rows = tables.entry(table).or_default();
            let (removed, kept): (Vec<Value>, Vec<Value>) = rows.drain(..).partition(|row| row_matches(row, &filters));
            *rows = kept;
            removed
        };
        rest.finish_write().await;
        Json(removed)
    }

    async fn serve() -> (Arc<FakeRest>, PostgrestSessionStore) {
        let rest = Arc::new(FakeRest::default());
        let app = Router::new()
            .route(
                "/rest/v1/{table}",
                get(select).post(insert).patch(update).delete(remove),
            )
            .with_state(rest.clone());
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let mut config =
            PostgrestConfig::new(format!("http://{addr}"), "service-key").with_timeout(CLIENT_TIMEOUT);
        config.retry = RetryPolicy {
            attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(20),
        };
        let store = PostgrestSessionStore::connect(config).await.unwrap();
        (rest, store)
    }

    fn session() -> SessionEntity {
        let now = SystemTime::now();
        SessionEntity {
            id: Uuid::new_v4(),
            session_code: "QWE234".into(),
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
                current_state: cells("blank"),
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

    fn cells(text: &str) -> Vec<BoardCellEntity> {
        (0..9)
            .map(|index| BoardCellEntity {
                cell_id: format!("cell-{index}"),
                text: format!("{text} {index}"),
                colors: Vec::new(),
                completed_by: Vec::new(),
                blocked: false,
                is_marked: false,
            })
            .collect()
    }

    fn player(session_id: Uuid, user_id: &str, color: &str) -> PlayerEntity {
        PlayerEntity {
            session_id,
            user_id: user_id.into(),
            display_name: user_id.into(),
            color: color.into(),
            joined_at: SystemTime::now(),
            is_host: false,
        }
    }

    fn queued(session_id: Uuid, user_id: &str) -> QueueEntryEntity {
        QueueEntryEntity {
            id: Uuid::new_v4(),
            session_id,
            user_id: user_id.into(),
            player_name: user_id.into(),
            color: "green".into(),
            status: QueueStatus::Pending,
            requested_at: SystemTime::now(),
            position: 0,
            priority: 0,
        }
    }

    #[tokio::test]
    async fn board_write_is_guarded_by_version() {
        let (_rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        match store.update_game_state(id, 0, cells("first")).await.unwrap() {
            StateWrite::Applied(state) => {
                assert_eq!(state.version, 1);
                assert_eq!(state.current_state[0].text, "first 0");
            }
            other => panic!("unexpected write: {other:?}"),
        }
        assert_eq!(
            store.update_game_state(id, 0, cells("stale")).await.unwrap(),
            StateWrite::Conflict { current_version: 1 }
        );
        assert_eq!(
            store
                .update_game_state(Uuid::new_v4(), 0, cells("ghost"))
                .await
                .unwrap(),
            StateWrite::NotFound
        );
    }

    #[tokio::test]
    async fn late_board_answer_still_reports_the_write() {
        let (rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();
        let before = rest.writes();

        rest.stall_next_write.store(true, Ordering::SeqCst);
        match store.update_game_state(id, 0, cells("mine")).await.unwrap() {
            StateWrite::Applied(state) => assert_eq!(state.version, 1),
            other => panic!("own write reported as {other:?}"),
        }
        assert_eq!(rest.writes() - before, 1);
    }

    #[tokio::test]
    async fn status_write_is_guarded_by_phase() {
        let (_rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let update = |expected, next| StatusUpdate {
            session_id: id,
            expected,
            next,
            winner_id: None,
            started_at: None,
            ended_at: None,
            at: SystemTime::now(),
        };
        assert_eq!(
            store
                .update_status(update(SessionPhase::Active, SessionPhase::Paused))
                .await
                .unwrap(),
            StatusWrite::Conflict {
                current: SessionPhase::Waiting
            }
        );
        match store
            .update_status(update(SessionPhase::Waiting, SessionPhase::Active))
            .await
            .unwrap()
        {
            StatusWrite::Applied(session) => assert_eq!(session.status, SessionPhase::Active),
            other => panic!("unexpected write: {other:?}"),
        }
    }

    #[tokio::test]
    async fn unique_violation_reports_which_seat_was_lost() {
        let (rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        let racer = serde_json::to_value(PlayerRow::from(player(id, "bob", "red"))).unwrap();
        *rest.racing_player.lock().unwrap() = Some(racer);
        assert_eq!(
            store.insert_player(player(id, "alice", "red"), 4).await.unwrap(),
            PlayerInsert::ColorTaken
        );
        assert_eq!(
            store.insert_player(player(id, "bob", "blue"), 4).await.unwrap(),
            PlayerInsert::UserExists
        );
    }

    #[tokio::test]
    async fn late_join_answer_is_not_a_duplicate() {
        let (rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        rest.stall_next_write.store(true, Ordering::SeqCst);
        assert_eq!(
            store.insert_player(player(id, "alice", "red"), 4).await.unwrap(),
            PlayerInsert::Inserted
        );
        assert_eq!(rest.rows(PLAYERS_TABLE).len(), 1);
    }

    #[tokio::test]
    async fn queue_inserts_follow_fifo_and_capacity() {
        let (rest, store) = serve().await;
        let session = session();
        let id = session.id;
        store.insert_session(session).await.unwrap();

        rest.stall_next_write.store(true, Ordering::SeqCst);
        match store.insert_queue_entry(queued(id, "a"), 2).await.unwrap() {
            QueueInsert::Inserted(entry) => assert_eq!(entry.position, 1),
            other => panic!("unexpected insert: {other:?}"),
        }
        assert_eq!(rest.rows(QUEUE_TABLE).len(), 1);

        assert_eq!(
            store.insert_queue_entry(queued(id, "a"), 2).await.unwrap(),
            QueueInsert::AlreadyQueued
        );
        match store.insert_queue_entry(queued(id, "b"), 2).await.unwrap() {
            QueueInsert::Inserted(entry) => assert_eq!(entry.position, 2),
            other => panic!("unexpected insert: {other:?}"),
        }
        assert_eq!(
            store.insert_queue_entry(queued(id, "c"), 2).await.unwrap(),
            QueueInsert::Full
        );
    }
}
