use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    response::IntoResponse,
    routing::get,
};
use uuid::Uuid;

use crate::{
    dto::presence::PresenceSnapshot,
    error::{AppError, ErrorBody},
    services::{presence_service, websocket_service},
    state::SharedState,
};

/// Presence snapshot and the presence WebSocket.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sessions/{id}/presence", get(presence_snapshot))
        .route("/sessions/{id}/presence/ws", get(presence_ws))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/presence",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Connected users in join order", body = PresenceSnapshot),
        (status = 404, description = "Unknown session", body = ErrorBody)
    )
)]
pub async fn presence_snapshot(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PresenceSnapshot>, AppError> {
    Ok(Json(presence_service::snapshot(&state, id).await?))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/presence/ws",
    tag = "presence",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 101, description = "Switching protocols to WebSocket"))
)]
/// Upgrade the HTTP connection into a presence WebSocket for one session.
pub async fn presence_ws(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, AppError> {
    presence_service::ensure_session(&state, id).await?;
    let shared_state = state.clone();
    Ok(ws.on_upgrade(move |socket| websocket_service::handle_socket(shared_state, id, socket)))
}
