use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, patch, post},
};
use uuid::Uuid;

use crate::{
    dto::{
        common::ActorRequest,
        queue::{JoinQueueRequest, ProcessQueueResponse, QueueEntryDto, UpdateQueuePositionRequest},
    },
    error::{AppError, ErrorBody},
    routes::ValidatedJson,
    services::queue_service,
    state::SharedState,
};

/// Join-queue endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{id}/queue", get(list_queue).post(add_to_queue))
        .route("/sessions/{id}/queue/process", post(process_queue))
        .route(
            "/queue/{entry_id}",
            patch(update_queue_position).delete(remove_from_queue),
        )
        .route("/queue/{entry_id}/approve", post(approve_entry))
        .route("/queue/{entry_id}/reject", post(reject_entry))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/queue",
    tag = "queue",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Queue in position order", body = [QueueEntryDto]))
)]
pub async fn list_queue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<QueueEntryDto>>, AppError> {
    Ok(Json(queue_service::list_queue(&state, id).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/queue",
    tag = "queue",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = JoinQueueRequest,
    responses(
        (status = 201, description = "Entry queued", body = QueueEntryDto),
        (status = 409, description = "Already queued or seated", body = ErrorBody),
        (status = 429, description = "Queue is full", body = ErrorBody)
    )
)]
pub async fn add_to_queue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<JoinQueueRequest>,
) -> Result<(StatusCode, Json<QueueEntryDto>), AppError> {
    let entry = queue_service::add_to_queue(&state, id, payload).await?;
    Ok((StatusCode::CREATED, Json(entry)))
}

/// Move a pending entry; 0 and 1 both mean the front of the queue.
#[utoipa::path(
    patch,
    path = "/queue/{entry_id}",
    tag = "queue",
    params(("entry_id" = Uuid, Path, description = "Queue entry identifier")),
    request_body = UpdateQueuePositionRequest,
    responses(
        (status = 200, description = "Entry moved", body = QueueEntryDto),
        (status = 400, description = "Invalid queue position", body = ErrorBody),
        (status = 403, description = "Caller is neither the host nor the queued user", body = ErrorBody)
    )
)]
pub async fn update_queue_position(
    State(state): State<SharedState>,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateQueuePositionRequest>,
) -> Result<Json<QueueEntryDto>, AppError> {
    Ok(Json(
        queue_service::update_queue_position(&state, entry_id, &payload.user_id, payload.position)
            .await?,
    ))
}

#[utoipa::path(
    delete,
    path = "/queue/{entry_id}",
    tag = "queue",
    params(("entry_id" = Uuid, Path, description = "Queue entry identifier")),
    request_body = ActorRequest,
    responses(
        (status = 204, description = "Entry removed"),
        (status = 403, description = "Caller is neither the host nor the queued user", body = ErrorBody)
    )
)]
pub async fn remove_from_queue(
    State(state): State<SharedState>,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<StatusCode, AppError> {
    queue_service::remove_from_queue(&state, entry_id, &payload.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Seat the queued user. Host only.
#[utoipa::path(
    post,
    path = "/queue/{entry_id}/approve",
    tag = "queue",
    params(("entry_id" = Uuid, Path, description = "Queue entry identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Entry approved", body = QueueEntryDto),
        (status = 403, description = "Caller is not the host", body = ErrorBody),
        (status = 409, description = "Session full or entry settled", body = ErrorBody)
    )
)]
pub async fn approve_entry(
    State(state): State<SharedState>,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<QueueEntryDto>, AppError> {
    Ok(Json(
        queue_service::approve_entry(&state, entry_id, &payload.user_id).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/queue/{entry_id}/reject",
    tag = "queue",
    params(("entry_id" = Uuid, Path, description = "Queue entry identifier")),
    request_body = ActorRequest,
    responses(
        (status = 200, description = "Entry rejected", body = QueueEntryDto),
        (status = 403, description = "Caller is not the host", body = ErrorBody)
    )
)]
pub async fn reject_entry(
    State(state): State<SharedState>,
    Path(entry_id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<QueueEntryDto>, AppError> {
    Ok(Json(
        queue_service::reject_entry(&state, entry_id, &payload.user_id).await?,
    ))
}

/// Approve pending entries in order while seats remain. Host only.
#[utoipa::path(
    post,
    path = "/sessions/{id}/queue/process",
    tag = "queue",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = ActorRequest,
    responses((status = 200, description = "Queue processed", body = ProcessQueueResponse))
)]
pub async fn process_queue(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<ActorRequest>,
) -> Result<Json<ProcessQueueResponse>, AppError> {
    Ok(Json(
        queue_service::process_queue(&state, id, &payload.user_id).await?,
    ))
}
