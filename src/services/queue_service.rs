use std::{collections::HashSet, time::SystemTime};

use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::{PlayerInsert, QueueInsert, SessionStore},
    dto::{
        queue::{JoinQueueRequest, ProcessQueueResponse, QueueEntryDto},
        session::SessionPlayerDto,
    },
    error::ServiceError,
    services::{
        session_service::{load_players, load_session, pick_color},
        sse_events,
    },
    state::{
        SharedState,
        game::{Session, SessionPlayer},
        queue::{
            QueueEntry, QueueError, QueueStatus, pending_in_order, plan_sweep, renumber,
            reposition, validate_position,
        },
    },
};

/// Queue `user_id` for `session_id` explicitly.
pub async fn add_to_queue(
    state: &SharedState,
    session_id: Uuid,
    request: JoinQueueRequest,
) -> Result<QueueEntryDto, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    if !session.status.accepts_players() {
        return Err(ServiceError::InvalidState(format!(
            "session is {} and no longer accepts players",
            session.status.as_str()
        )));
    }
    let players = load_players(store.as_ref(), session_id).await?;
    if players.iter().any(|p| p.user_id == request.user_id) {
        return Err(ServiceError::InvalidState(format!(
            "user `{}` already joined this session",
            request.user_id
        )));
    }

    enqueue(
        state,
        &session,
        &players,
        request.user_id,
        request.player_name,
        request.color,
        request.priority,
    )
    .await
}

/// Store a pending entry at the back of the queue and broadcast the new queue.
pub(crate) async fn enqueue(
    state: &SharedState,
    session: &Session,
    players: &[SessionPlayer],
    user_id: String,
    player_name: String,
    color: Option<String>,
    priority: i32,
) -> Result<QueueEntryDto, ServiceError> {
    let store = state.require_session_store().await?;
    let color = pick_color(state, color, players)?;
    let max_size = state.config().queue.max_size;

    let entry = QueueEntry {
        id: Uuid::new_v4(),
        session_id: session.id,
        user_id,
        player_name,
        color,
        status: QueueStatus::Pending,
        requested_at: SystemTime::now(),
        position: 0,
        priority,
    };

    match store.insert_queue_entry(entry.into(), max_size).await? {
        QueueInsert::Inserted(stored) => {
            let stored = QueueEntry::from(stored);
            info!(
                session_id = %session.id,
                user_id = %stored.user_id,
                position = stored.position,
                "user queued"
            );
            publish_queue(state, store.as_ref(), session.id).await?;
            Ok(stored.into())
        }
        QueueInsert::Full => Err(QueueError::Full { max_size }.into()),
        QueueInsert::AlreadyQueued => Err(ServiceError::InvalidState(
            "user is already waiting in this queue".into(),
        )),
    }
}

/// Entries of a session in position order.
pub async fn list_queue(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Vec<QueueEntryDto>, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(store.as_ref(), session_id).await?;
    let entries = load_queue(store.as_ref(), session_id).await?;
    Ok(entries.into_iter().map(Into::into).collect())
}

/// Move a pending entry to `position`; 0 and 1 both mean the front.
pub async fn update_queue_position(
    state: &SharedState,
    entry_id: Uuid,
    actor: &str,
    position: i64,
) -> Result<QueueEntryDto, ServiceError> {
    let position = validate_position(position)?;
    let store = state.require_session_store().await?;
    let entry = load_entry(store.as_ref(), entry_id).await?;
    authorize_entry(store.as_ref(), &entry, actor).await?;
    if entry.status != QueueStatus::Pending {
        return Err(ServiceError::InvalidState(
            "only pending entries can be moved".into(),
        ));
    }

    let entries = load_queue(store.as_ref(), entry.session_id).await?;
    for changed in reposition(&entries, entry_id, position) {
        store.update_queue_entry(changed.into()).await?;
    }

    let updated = load_entry(store.as_ref(), entry_id).await?;
    debug!(%entry_id, position = updated.position, "queue entry moved");
    publish_queue(state, store.as_ref(), entry.session_id).await?;
    Ok(updated.into())
}

/// Delete an entry and close the gap it leaves.
pub async fn remove_from_queue(
    state: &SharedState,
    entry_id: Uuid,
    actor: &str,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let entry = load_entry(store.as_ref(), entry_id).await?;
    authorize_entry(store.as_ref(), &entry, actor).await?;
    if !store.delete_queue_entry(entry_id).await? {
        return Err(ServiceError::NotFound(format!(
            "queue entry `{entry_id}` not found"
        )));
    }
    info!(%entry_id, session_id = %entry.session_id, "queue entry removed");

    compact(store.as_ref(), entry.session_id).await?;
    publish_queue(state, store.as_ref(), entry.session_id).await
}

/// Seat the user behind a pending entry. Host only.
pub async fn approve_entry(
    state: &SharedState,
    entry_id: Uuid,
    actor: &str,
) -> Result<QueueEntryDto, ServiceError> {
    let store = state.require_session_store().await?;
    let entry = load_pending(store.as_ref(), entry_id).await?;
    let session = load_host_session(store.as_ref(), entry.session_id, actor).await?;
    if !session.status.accepts_players() {
        return Err(ServiceError::InvalidState(format!(
            "session is {} and no longer accepts players",
            session.status.as_str()
        )));
    }

    match admit(state, store.as_ref(), &session, entry).await? {
        Admission::Seated(approved) => {
            compact(store.as_ref(), session.id).await?;
            publish_queue(state, store.as_ref(), session.id).await?;
            Ok(approved.into())
        }
        Admission::Skipped => {
            compact(store.as_ref(), session.id).await?;
            publish_queue(state, store.as_ref(), session.id).await?;
            Err(ServiceError::InvalidState(
                "user already joined this session".into(),
            ))
        }
        Admission::Full => Err(ServiceError::SessionFull),
    }
}

/// Settle a pending entry as rejected. Host only.
pub async fn reject_entry(
    state: &SharedState,
    entry_id: Uuid,
    actor: &str,
) -> Result<QueueEntryDto, ServiceError> {
    let store = state.require_session_store().await?;
    let mut entry = load_pending(store.as_ref(), entry_id).await?;
    load_host_session(store.as_ref(), entry.session_id, actor).await?;

    entry.status = QueueStatus::Rejected;
    store.update_queue_entry(entry.clone().into()).await?;
    info!(%entry_id, session_id = %entry.session_id, user_id = %entry.user_id, "queue entry rejected");

    compact(store.as_ref(), entry.session_id).await?;
    publish_queue(state, store.as_ref(), entry.session_id).await?;
    Ok(entry.into())
}

/// Approve pending entries in order while seats remain. Host only.
pub async fn process_queue(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
) -> Result<ProcessQueueResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_host_session(store.as_ref(), session_id, actor).await?;
    if !session.status.accepts_players() {
        return Err(ServiceError::InvalidState(format!(
            "session is {} and no longer accepts players",
            session.status.as_str()
        )));
    }

    let approved = admit_pending(state, &session).await?;
    let pending = pending_in_order(&load_queue(store.as_ref(), session_id).await?)
        .into_iter()
        .map(Into::into)
        .collect();
    Ok(ProcessQueueResponse { approved, pending })
}

/// Admit pending entries of `session` in position order until it is full.
pub(crate) async fn admit_pending(
    state: &SharedState,
    session: &Session,
) -> Result<Vec<QueueEntryDto>, ServiceError> {
    let store = state.require_session_store().await?;
    let mut approved = Vec::new();
    let mut changed = false;

    for entry in pending_in_order(&load_queue(store.as_ref(), session.id).await?) {
        match admit(state, store.as_ref(), session, entry).await? {
            Admission::Seated(entry) => {
                changed = true;
                approved.push(QueueEntryDto::from(entry));
            }
            Admission::Skipped => changed = true,
            Admission::Full => break,
        }
    }

    if changed {
        compact(store.as_ref(), session.id).await?;
        publish_queue(state, store.as_ref(), session.id).await?;
    }
    Ok(approved)
}

enum Admission {
    /// The user now holds a seat; the entry is approved.
    Seated(QueueEntry),
    /// The user was already seated; the entry was settled as rejected.
    Skipped,
    /// No free seat.
    Full,
}

async fn admit(
    state: &SharedState,
    store: &dyn SessionStore,
    session: &Session,
    mut entry: QueueEntry,
) -> Result<Admission, ServiceError> {
    let players = load_players(store, session.id).await?;
    if players.len() >= session.settings.max_players {
        return Ok(Admission::Full);
    }
    if players.iter().any(|p| p.user_id == entry.user_id) {
        entry.status = QueueStatus::Rejected;
        store.update_queue_entry(entry.into()).await?;
        return Ok(Admission::Skipped);
    }

    let color = if players.iter().any(|p| p.color == entry.color) {
        pick_color(state, None, &players)?
    } else {
        entry.color.clone()
    };
    let player = SessionPlayer {
        user_id: entry.user_id.clone(),
        display_name: entry.player_name.clone(),
        color,
        joined_at: SystemTime::now(),
        is_host: false,
    };

    match store
        .insert_player(
            player.clone().into_entity(session.id),
            session.settings.max_players,
        )
        .await?
    {
        PlayerInsert::Inserted => {}
        PlayerInsert::SessionFull => return Ok(Admission::Full),
        PlayerInsert::UserExists | PlayerInsert::ColorTaken => {
            warn!(
                session_id = %session.id,
                user_id = %entry.user_id,
                "queued user could not be seated"
            );
            return Ok(Admission::Full);
        }
    }

    entry.color = player.color.clone();
    entry.status = QueueStatus::Approved;
    store.update_queue_entry(entry.clone().into()).await?;
    info!(
        session_id = %session.id,
        user_id = %entry.user_id,
        color = %entry.color,
        "queued user admitted"
    );
    sse_events::broadcast_player_joined(state, session.id, SessionPlayerDto::from(player));
    Ok(Admission::Seated(entry))
}

/// Expire stale pending entries and drop old settled ones across all sessions.
/// Returns the number of entries touched.
pub async fn cleanup_queue(state: &SharedState) -> Result<usize, ServiceError> {
    let store = state.require_session_store().await?;
    let entries = store
        .list_queue(None)
        .await?
        .into_iter()
        .map(QueueEntry::from)
        .collect::<Vec<_>>();

    let plan = plan_sweep(
        &entries,
        SystemTime::now(),
        state.config().queue.max_wait,
    );
    if plan.is_empty() {
        return Ok(0);
    }

    let mut touched_sessions = HashSet::new();
    for expired in &plan.expire {
        touched_sessions.insert(expired.session_id);
        store.update_queue_entry(expired.clone().into()).await?;
    }
    for id in &plan.delete {
        if let Some(entry) = entries.iter().find(|entry| entry.id == *id) {
            touched_sessions.insert(entry.session_id);
        }
        store.delete_queue_entry(*id).await?;
    }

    for session_id in touched_sessions {
        compact(store.as_ref(), session_id).await?;
        publish_queue(state, store.as_ref(), session_id).await?;
    }

    let touched = plan.expire.len() + plan.delete.len();
    info!(
        expired = plan.expire.len(),
        deleted = plan.delete.len(),
        "queue cleanup pass"
    );
    Ok(touched)
}

/// Periodically run [`cleanup_queue`]; skipped while storage is unavailable.
pub async fn run_cleanup(state: SharedState) {
    let mut ticker = interval(state.config().queue.cleanup_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match cleanup_queue(&state).await {
            Ok(_) => {}
            Err(ServiceError::Degraded) => debug!("queue cleanup skipped while degraded"),
            Err(err) => warn!(error = %err, "queue cleanup failed"),
        }
    }
}

async fn compact(store: &dyn SessionStore, session_id: Uuid) -> Result<(), ServiceError> {
    let entries = load_queue(store, session_id).await?;
    for changed in renumber(&entries) {
        store.update_queue_entry(changed.into()).await?;
    }
    Ok(())
}

async fn publish_queue(
    state: &SharedState,
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<(), ServiceError> {
    let entries = load_queue(store, session_id)
        .await?
        .into_iter()
        .map(QueueEntryDto::from)
        .collect();
    sse_events::broadcast_queue_updated(state, session_id, entries);
    Ok(())
}

async fn load_queue(
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<Vec<QueueEntry>, ServiceError> {
    Ok(store
        .list_queue(Some(session_id))
        .await?
        .into_iter()
        .map(QueueEntry::from)
        .collect())
}

async fn load_entry(store: &dyn SessionStore, entry_id: Uuid) -> Result<QueueEntry, ServiceError> {
    store
        .find_queue_entry(entry_id)
        .await?
        .map(QueueEntry::from)
        .ok_or_else(|| ServiceError::NotFound(format!("queue entry `{entry_id}` not found")))
}

async fn load_pending(
    store: &dyn SessionStore,
    entry_id: Uuid,
) -> Result<QueueEntry, ServiceError> {
    let entry = load_entry(store, entry_id).await?;
    if entry.status != QueueStatus::Pending {
        return Err(ServiceError::InvalidState(
            "queue entry was already settled".into(),
        ));
    }
    Ok(entry)
}

async fn load_host_session(
    store: &dyn SessionStore,
    session_id: Uuid,
    actor: &str,
) -> Result<Session, ServiceError> {
    let session = load_session(store, session_id).await?;
    if !session.is_host(actor) {
        return Err(ServiceError::Unauthorized(
            "only the host can manage the queue".into(),
        ));
    }
    Ok(session)
}

/// Entries can be moved or withdrawn by the host or by the queued user.
async fn authorize_entry(
    store: &dyn SessionStore,
    entry: &QueueEntry,
    actor: &str,
) -> Result<(), ServiceError> {
    if entry.user_id == actor {
        return Ok(());
    }
    let session = load_session(store, entry.session_id).await?;
    if session.is_host(actor) {
        Ok(())
    } else {
        Err(ServiceError::Unauthorized(
            "only the host or the queued user can change this entry".into(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        services::{
            session_service::get_session,
            sse_events::EVENT_QUEUE_UPDATED,
            test_support::{create_session, join, memory_state, memory_state_with, settings},
        },
    };

    fn request(user: &str) -> JoinQueueRequest {
        JoinQueueRequest {
            user_id: user.to_string(),
            player_name: user.to_uppercase(),
            color: None,
            priority: 0,
        }
    }

    async fn queued(state: &SharedState, session_id: Uuid, users: &[&str]) -> Vec<QueueEntryDto> {
        let mut entries = Vec::new();
        for user in users {
            entries.push(add_to_queue(state, session_id, request(user)).await.unwrap());
        }
        entries
    }

    #[tokio::test]
    async fn positions_are_fifo_and_broadcast() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        let mut events = state.sse().subscribe_session(detail.id);

        let entries = queued(&state, detail.id, &["a", "b", "c"]).await;
        let positions = entries.iter().map(|e| e.position).collect::<Vec<_>>();
        assert_eq!(positions, vec![1, 2, 3]);

        let event = events.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some(EVENT_QUEUE_UPDATED));

        let err = add_to_queue(&state, detail.id, request("a")).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn full_queue_reports_queue_is_full() {
        let mut config = AppConfig::default();
        config.queue.max_size = 2;
        let state = memory_state_with(config);
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        queued(&state, detail.id, &["a", "b"]).await;

        let err = add_to_queue(&state, detail.id, request("c")).await.unwrap_err();
        assert_eq!(err.to_string(), "Queue is full");
        assert!(matches!(err, ServiceError::Queue(QueueError::Full { max_size: 2 })));
    }

    #[tokio::test]
    async fn negative_position_is_rejected() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        let entries = queued(&state, detail.id, &["a"]).await;

        let err = update_queue_position(&state, entries[0].id, "a", -1)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Invalid queue position");
    }

    #[tokio::test]
    async fn moving_and_removing_keep_positions_dense() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        let entries = queued(&state, detail.id, &["a", "b", "c", "d"]).await;

        let moved = update_queue_position(&state, entries[3].id, "host", 1).await.unwrap();
        assert_eq!(moved.position, 1);
        let order = list_queue(&state, detail.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.user_id, e.position))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("d".to_string(), 1),
                ("a".to_string(), 2),
                ("b".to_string(), 3),
                ("c".to_string(), 4)
            ]
        );

        remove_from_queue(&state, entries[0].id, "a").await.unwrap();
        let order = list_queue(&state, detail.id)
            .await
            .unwrap()
            .into_iter()
            .map(|e| (e.user_id, e.position))
            .collect::<Vec<_>>();
        assert_eq!(
            order,
            vec![
                ("d".to_string(), 1),
                ("b".to_string(), 2),
                ("c".to_string(), 3)
            ]
        );

        let err = remove_from_queue(&state, entries[0].id, "host").await.unwrap_err();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[tokio::test]
    async fn approval_is_host_only_and_respects_seats() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 3, true)).await;
        let entries = queued(&state, detail.id, &["a", "b"]).await;

        let err = approve_entry(&state, entries[0].id, "a").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let approved = approve_entry(&state, entries[0].id, "host").await.unwrap();
        assert_eq!(approved.status, QueueStatus::Approved);

        let err = approve_entry(&state, entries[1].id, "host").await;
        assert!(err.is_ok());
        let session = get_session(&state, detail.id).await.unwrap();
        assert_eq!(session.players.len(), 3);

        let extra = queued(&state, detail.id, &["c"]).await;
        let err = approve_entry(&state, extra[0].id, "host").await.unwrap_err();
        assert!(matches!(err, ServiceError::SessionFull));

        let rejected = reject_entry(&state, extra[0].id, "host").await.unwrap();
        assert_eq!(rejected.status, QueueStatus::Rejected);
        let err = reject_entry(&state, extra[0].id, "host").await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn process_queue_fills_free_seats_in_order() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 3, true)).await;
        queued(&state, detail.id, &["a", "b", "c"]).await;

        let result = process_queue(&state, detail.id, "host").await.unwrap();
        let approved = result
            .approved
            .iter()
            .map(|e| e.user_id.as_str())
            .collect::<Vec<_>>();
        assert_eq!(approved, vec!["a", "b"]);
        assert_eq!(result.pending.len(), 1);
        assert_eq!(result.pending[0].user_id, "c");
        assert_eq!(result.pending[0].position, 1);

        let session = get_session(&state, detail.id).await.unwrap();
        let colors = session
            .players
            .iter()
            .map(|p| p.color.as_str())
            .collect::<std::collections::HashSet<_>>();
        assert_eq!(colors.len(), 3);
    }

    #[tokio::test]
    async fn seated_users_cannot_queue() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 3, true)).await;
        join(&state, detail.id, "alice", None).await;
        let err = add_to_queue(&state, detail.id, request("alice"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn cleanup_expires_old_pending_then_deletes_settled() {
        let mut config = AppConfig::default();
        config.queue.max_wait = Duration::ZERO;
        let state = memory_state_with(config);
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        let entries = queued(&state, detail.id, &["a", "b"]).await;
        tokio::time::sleep(Duration::from_millis(5)).await;

        assert_eq!(cleanup_queue(&state).await.unwrap(), 2);
        let remaining = list_queue(&state, detail.id).await.unwrap();
        assert!(remaining.iter().all(|e| e.status == QueueStatus::Expired));

        assert_eq!(cleanup_queue(&state).await.unwrap(), 2);
        assert!(list_queue(&state, detail.id).await.unwrap().is_empty());
        assert!(matches!(
            remove_from_queue(&state, entries[0].id, "host").await,
            Err(ServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn only_host_or_owner_can_change_entries() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 2, true)).await;
        let entries = queued(&state, detail.id, &["a", "b"]).await;

        let err = update_queue_position(&state, entries[1].id, "a", 1)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
        let err = remove_from_queue(&state, entries[1].id, "a").await.unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));

        let moved = update_queue_position(&state, entries[1].id, "b", 1)
            .await
            .unwrap();
        assert_eq!(moved.position, 1);
        remove_from_queue(&state, entries[0].id, "host").await.unwrap();

        let remaining = list_queue(&state, detail.id).await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].user_id, "b");
    }
}
