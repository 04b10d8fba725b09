use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use rand::Rng;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::session_store::{PlayerInsert, SessionStore, StatusUpdate, StatusWrite},
    dto::{
        board::WinResultDto,
        validation::SESSION_CODE_LEN,
        session::{
            CreateSessionRequest, JoinByCodeRequest, JoinOutcomeDto, JoinSessionRequest,
            SessionDetail, SessionPlayerDto, SessionSummary,
        },
    },
    error::ServiceError,
    services::{presence_service, queue_service, sse_events},
    state::{
        SharedState,
        board::{GameState, generate_board},
        game::{Session, SessionPlayer, SessionSettings, used_colors},
        state_machine::{self, SessionEvent, SessionPhase},
    },
};

const CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_CODE_ATTEMPTS: usize = 8;

/// Random join code drawn from an alphabet without look-alike characters.
pub(crate) fn generate_session_code<R: Rng + ?Sized>(rng: &mut R) -> String {
    (0..SESSION_CODE_LEN)
        .map(|_| CODE_ALPHABET[rng.random_range(0..CODE_ALPHABET.len())] as char)
        .collect()
}

/// Open a new session, generate its board and seat the host.
pub async fn create_session(
    state: &SharedState,
    request: CreateSessionRequest,
) -> Result<SessionDetail, ServiceError> {
    let store = state.require_session_store().await?;
    let defaults = &state.config().session;

    let input = request.settings;
    let settings = SessionSettings {
        board_size: input.board_size.unwrap_or(defaults.default_board_size),
        max_players: input.max_players.unwrap_or(defaults.default_max_players),
        win_conditions: input.win_conditions.unwrap_or_default(),
        allow_queue: input.allow_queue,
        card_pool: input
            .card_pool
            .iter()
            .map(|card| card.trim().to_string())
            .filter(|card| !card.is_empty())
            .collect(),
    };
    if !settings.win_conditions.line && !settings.win_conditions.majority {
        return Err(ServiceError::InvalidInput(
            "at least one win condition must be enabled".into(),
        ));
    }

    let cells = generate_board(settings.board_size, &settings.card_pool)?;
    let session_code = allocate_session_code(store.as_ref()).await?;

    let color = match request.color {
        Some(color) => color,
        None => state
            .config()
            .first_unused_color(&[])
            .ok_or_else(|| ServiceError::InvalidState("no player color available".into()))?,
    };

    let now = SystemTime::now();
    let session = Session {
        id: Uuid::new_v4(),
        session_code,
        host_id: request.host_id.clone(),
        status: SessionPhase::Waiting,
        settings,
        game_state: GameState::initial(cells),
        winner_id: None,
        created_at: now,
        updated_at: now,
        started_at: None,
        ended_at: None,
    };
    store.insert_session(session.clone().into()).await?;

    let host = SessionPlayer {
        user_id: request.host_id,
        display_name: request.host_name,
        color,
        joined_at: now,
        is_host: true,
    };
    match store
        .insert_player(
            host.clone().into_entity(session.id),
            session.settings.max_players,
        )
        .await?
    {
        PlayerInsert::Inserted => {}
        other => {
            return Err(ServiceError::InvalidState(format!(
                "failed to seat the host: {other:?}"
            )));
        }
    }

    info!(
        session_id = %session.id,
        code = %session.session_code,
        host_id = %session.host_id,
        board_size = session.settings.board_size,
        "session created"
    );
    sse_events::broadcast_session_created(state, SessionSummary::from(&session));

    Ok(SessionDetail::new(session, vec![host]))
}

async fn allocate_session_code(store: &dyn SessionStore) -> Result<String, ServiceError> {
    for _ in 0..MAX_CODE_ATTEMPTS {
        let code = generate_session_code(&mut rand::rng());
        if store.find_session_by_code(code.clone()).await?.is_none() {
            return Ok(code);
        }
    }
    Err(ServiceError::InvalidState(
        "could not allocate a unique session code".into(),
    ))
}

/// Full view of one session.
pub async fn get_session(state: &SharedState, id: Uuid) -> Result<SessionDetail, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), id).await?;
    let players = load_players(store.as_ref(), id).await?;
    Ok(SessionDetail::new(session, players))
}

/// List sessions, newest first, optionally filtered by phase.
pub async fn list_sessions(
    state: &SharedState,
    status: Option<SessionPhase>,
) -> Result<Vec<SessionSummary>, ServiceError> {
    let store = state.require_session_store().await?;
    let sessions = store.list_sessions(status).await?;
    Ok(sessions
        .into_iter()
        .map(Session::from)
        .map(|session| SessionSummary::from(&session))
        .collect())
}

/// Join a session by id, or queue for it when it is full and queueing is allowed.
pub async fn join_session(
    state: &SharedState,
    session_id: Uuid,
    request: JoinSessionRequest,
) -> Result<JoinOutcomeDto, ServiceError> {
    state.join_limiter().check(&request.user_id)?;
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    seat_player(state, store, session, request).await
}

/// Join a session by its short code.
pub async fn join_by_code(
    state: &SharedState,
    request: JoinByCodeRequest,
) -> Result<JoinOutcomeDto, ServiceError> {
    state.join_limiter().check(&request.user_id)?;
    let store = state.require_session_store().await?;
    let session = store
        .find_session_by_code(request.session_code.clone())
        .await?
        .map(Session::from)
        .ok_or_else(|| {
            ServiceError::NotFound(format!("no session with code `{}`", request.session_code))
        })?;

    let join = JoinSessionRequest {
        user_id: request.user_id,
        display_name: request.display_name,
        color: request.color,
    };
    seat_player(state, store, session, join).await
}

async fn seat_player(
    state: &SharedState,
    store: Arc<dyn SessionStore>,
    session: Session,
    request: JoinSessionRequest,
) -> Result<JoinOutcomeDto, ServiceError> {
    if !session.status.accepts_players() {
        return Err(ServiceError::InvalidState(format!(
            "session is {} and no longer accepts players",
            session.status.as_str()
        )));
    }

    let players = load_players(store.as_ref(), session.id).await?;
    if players.iter().any(|p| p.user_id == request.user_id) {
        return Err(ServiceError::InvalidState(format!(
            "user `{}` already joined this session",
            request.user_id
        )));
    }

    if players.len() >= session.settings.max_players {
        return queue_or_refuse(state, &session, &players, request).await;
    }

    let color = pick_color(state, request.color.clone(), &players)?;
    let player = SessionPlayer {
        user_id: request.user_id.clone(),
        display_name: request.display_name.clone(),
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
        PlayerInsert::Inserted => {
            info!(session_id = %session.id, user_id = %player.user_id, color = %player.color, "player joined");
            let dto = SessionPlayerDto::from(player);
            sse_events::broadcast_player_joined(state, session.id, dto.clone());
            Ok(JoinOutcomeDto::Joined {
                session_id: session.id,
                player: dto,
            })
        }
        PlayerInsert::SessionFull => {
            let players = load_players(store.as_ref(), session.id).await?;
            queue_or_refuse(state, &session, &players, request).await
        }
        PlayerInsert::UserExists => Err(ServiceError::InvalidState(format!(
            "user `{}` already joined this session",
            request.user_id
        ))),
        PlayerInsert::ColorTaken => Err(ServiceError::InvalidState(format!(
            "color `{}` is already taken",
            player.color
        ))),
    }
}

async fn queue_or_refuse(
    state: &SharedState,
    session: &Session,
    players: &[SessionPlayer],
    request: JoinSessionRequest,
) -> Result<JoinOutcomeDto, ServiceError> {
    if !session.settings.allow_queue {
        return Err(ServiceError::SessionFull);
    }
    let entry = queue_service::enqueue(
        state,
        session,
        players,
        request.user_id,
        request.display_name,
        request.color,
        0,
    )
    .await?;
    Ok(JoinOutcomeDto::Queued {
        session_id: session.id,
        entry,
    })
}

/// Requested color if free, otherwise the first palette color nobody holds.
pub(crate) fn pick_color(
    state: &SharedState,
    requested: Option<String>,
    players: &[SessionPlayer],
) -> Result<String, ServiceError> {
    let used = used_colors(players);
    match requested {
        Some(color) if used.contains(&color) => Err(ServiceError::InvalidState(format!(
            "color `{color}` is already taken"
        ))),
        Some(color) => Ok(color),
        None => state
            .config()
            .first_unused_color(&used)
            .ok_or_else(|| ServiceError::InvalidState("no player color available".into())),
    }
}

/// Remove a non-host player, then seat queued users if a seat freed up.
pub async fn leave_session(
    state: &SharedState,
    session_id: Uuid,
    user_id: &str,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    if session.is_host(user_id) && !session.status.is_terminal() {
        return Err(ServiceError::InvalidState(
            "the host cannot leave; cancel the session instead".into(),
        ));
    }

    if !store.delete_player(session_id, user_id.to_string()).await? {
        return Err(ServiceError::NotFound(format!(
            "user `{user_id}` is not seated in session `{session_id}`"
        )));
    }
    info!(%session_id, %user_id, "player left");
    sse_events::broadcast_player_left(state, session_id, user_id);

    if session.settings.allow_queue && session.status.accepts_players() {
        queue_service::admit_pending(state, &session).await?;
    }
    Ok(())
}

/// Apply a host-only lifecycle event.
pub async fn apply_event(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
    event: SessionEvent,
) -> Result<SessionDetail, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    if !session.is_host(actor) {
        return Err(ServiceError::Unauthorized(
            "only the host can change the session status".into(),
        ));
    }

    let updated = transition(state, store.as_ref(), &session, event, None).await?;
    let players = load_players(store.as_ref(), session_id).await?;
    Ok(SessionDetail::new(updated, players))
}

/// Open the board for marking. Host only, from `waiting`.
pub async fn start_session(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
) -> Result<SessionDetail, ServiceError> {
    apply_event(state, session_id, actor, SessionEvent::Start).await
}

/// Freeze marking on an active session. Host only.
pub async fn pause_session(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
) -> Result<SessionDetail, ServiceError> {
    apply_event(state, session_id, actor, SessionEvent::Pause).await
}

/// Reopen marking on a paused session. Host only.
pub async fn resume_session(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
) -> Result<SessionDetail, ServiceError> {
    apply_event(state, session_id, actor, SessionEvent::Resume).await
}

/// Abandon a session that has not finished yet. Host only.
pub async fn cancel_session(
    state: &SharedState,
    session_id: Uuid,
    actor: &str,
) -> Result<SessionDetail, ServiceError> {
    apply_event(state, session_id, actor, SessionEvent::Cancel).await
}

/// Move a decided game to `completed`. Returns `None` when another writer
/// already moved the session on.
pub(crate) async fn complete_session(
    state: &SharedState,
    store: &dyn SessionStore,
    session: &Session,
    result: WinResultDto,
) -> Result<Option<Session>, ServiceError> {
    match transition(
        state,
        store,
        session,
        SessionEvent::Complete,
        result.winner_id.clone(),
    )
    .await
    {
        Ok(completed) => {
            sse_events::broadcast_session_completed(state, session.id, result);
            Ok(Some(completed))
        }
        Err(ServiceError::InvalidState(message)) => {
            warn!(session_id = %session.id, %message, "session already left the active phase");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

async fn transition(
    state: &SharedState,
    store: &dyn SessionStore,
    session: &Session,
    event: SessionEvent,
    winner_id: Option<String>,
) -> Result<Session, ServiceError> {
    let plan = state_machine::plan(session.status, event)?;
    let now = SystemTime::now();
    let update = StatusUpdate {
        session_id: session.id,
        expected: plan.from,
        next: plan.to,
        winner_id,
        started_at: (plan.to == SessionPhase::Active && session.started_at.is_none())
            .then_some(now),
        ended_at: plan.to.is_terminal().then_some(now),
        at: now,
    };

    match store.update_status(update).await? {
        StatusWrite::Applied(entity) => {
            let updated = Session::from(entity);
            info!(
                session_id = %session.id,
                from = plan.from.as_str(),
                to = plan.to.as_str(),
                "session status changed"
            );
            sse_events::broadcast_status_changed(state, session.id, plan.from, plan.to);
            if plan.to.is_terminal() {
                presence_service::release_session(state, session.id);
            }
            Ok(updated)
        }
        StatusWrite::Conflict { current } => Err(ServiceError::InvalidState(format!(
            "session status changed concurrently (now {})",
            current.as_str()
        ))),
        StatusWrite::NotFound => Err(ServiceError::NotFound(format!(
            "session `{}` not found",
            session.id
        ))),
    }
}

/// Periodically forget users whose join attempts all left the rate-limit window.
pub async fn run_join_limiter_pruner(state: SharedState) {
    let period = state
        .config()
        .join_rate_limit
        .window
        .max(Duration::from_millis(10));
    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        let dropped = state.join_limiter().prune();
        if dropped > 0 {
            debug!(dropped, "join rate limiter pruned");
        }
    }
}

pub(crate) async fn load_session(store: &dyn SessionStore, id: Uuid) -> Result<Session, ServiceError> {
    store
        .find_session(id)
        .await?
        .map(Session::from)
        .ok_or_else(|| ServiceError::NotFound(format!("session `{id}` not found")))
}

pub(crate) async fn load_players(
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<Vec<SessionPlayer>, ServiceError> {
    let mut players = store
        .list_players(session_id)
        .await?
        .into_iter()
        .map(SessionPlayer::from)
        .collect::<Vec<_>>();
    players.sort_by_key(|p| p.joined_at);
    Ok(players)
}
