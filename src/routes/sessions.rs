use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{delete, get, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        common::{ActorRequest, ListSessionsQuery},
        session::{
            CreateSessionRequest, JoinByCodeRequest, JoinOutcomeDto, JoinSessionRequest,
            SessionDetail, SessionSummary,
        },
    },
    error::{AppError, ErrorBody},
    routes::ValidatedJson,
    services::session_service,
    state::SharedState,
};

/// Session lifecycle, joins and departures.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions", get(list_sessions).post(create_session))
        .route("/sessions/join", post(join_by_code))
        .route("/sessions/{id}", get(get_session))
        .route("/sessions/{id}/players", post(join_session))
        .route("/sessions/{id}/players/{user_id}", delete(leave_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/pause", post(pause_session))
        .route("/sessions/{id}/resume", post(resume_session))
        .route("/sessions/{id}/cancel", post(cancel_session))
}

/// Create a session, generate its board and seat the host.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = CreateSessionRequest,
    responses(
        (status = 201, description = "Session created", body = SessionDetail),
        (status = 400, description = "Invalid settings", body = ErrorBody)
    )
)]
pub async fn create_session(
    State(state): State<SharedState>,
    ValidatedJson(payload): ValidatedJson<CreateSessionRequest>,
) -> Result<(StatusCode, Json<SessionDetail>), AppError> {
    let detail = session_service::create_session(&state, payload).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

/// List sessions, newest first.
#[utoipa::path(
    get,
    path = "/sessions",
    tag = "sessions",
    params(ListSessionsQuery),
    responses((status = 200, description = "Sessions", body = [SessionSummary]))
)]
pub async fn list_sessions(
    State(state): State<SharedState>,
    Query(query): Query<ListSessionsQuery>,
) -> Result<Json<Vec<SessionSummary>>, AppError> {
    Ok(Json(
        session_service::list_sessions(&state, query.status).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Session", body = SessionDetail),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(session_service::get_session(&state, id).await?))
}

/// Join by the six-character session code.
#[utoipa::path(
    post,
    path = "/sessions/join",
    tag = "sessions",
    request_body = JoinByCodeRequest,
    responses(
        (status = 200, description = "Seated or queued", body = JoinOutcomeDto),
        (status = 409, description = "Session full or closed", body = ErrorBody),
        (status = 429, description = "Too many attempts or queue full", body = ErrorBody)
    )
)]
pub async fn join_by_code(
    State(state): State<SharedState>,
    ValidatedJson(payload): ValidatedJson<JoinByCodeRequest>,
) -> Result<Json<JoinOutcomeDto>, AppError> {
    Ok(Json(session_service::join_by_code(&state, payload).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/players",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = JoinSessionRequest,
    responses(
        (status = 200, description = "Seated or queued", body = JoinOutcomeDto),
        (status = 409, description = "Session full or closed", body = ErrorBody),
        (status = 429, description = "Too many attempts or queue full", body = ErrorBody)
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<JoinSessionRequest>,
) -> Result<Json<JoinOutcomeDto>, AppError> {
    Ok(Json(session_service::join_session(&state, id, payload).await?))
}

#[utoipa::path(
    delete,
    path = "/sessions/{id}/players/{user_id}",
    tag = "sessions",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("user_id" = String, Path, description = "Player leaving the session")
    ),
    responses(
        (status = 204, description = "Player left"),
        (status = 409, description = "The host must cancel instead", body = ErrorBody)
    )
)]
pub async fn leave_session(
    State(state): State<SharedState>,
    Path((id, user_id)): Path<(Uuid, String)>,
) -> Result<StatusCode, AppError> {
    session_service::leave_session(&state, id, &user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Session started", body = SessionDetail),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(
        session_service::start_session(&state, id, &payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/pause",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Session paused", body = SessionDetail),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn pause_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(
        session_service::pause_session(&state, id, &payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/resume",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Session resumed", body = SessionDetail),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn resume_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(
        session_service::resume_session(&state, id, &payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/cancel",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Session cancelled", body = SessionDetail),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Invalid transition", body = ErrorBody)
    )
)]
pub async fn cancel_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<SessionDetail>, AppError> {
    Ok(Json(
        session_service::cancel_session(&state, id, &payload.user_id).await?,
    ))
}
