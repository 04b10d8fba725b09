use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use uuid::Uuid;

use crate::{
    dto::board::{
        BoardStateResponse, BoardUpdateResponse, GenerateBoardRequest, GeneratedBoardResponse,
        MarkCellRequest, UpdateBoardStateRequest, WinResultDto,
    },
    error::{AppError, ErrorBody},
    routes::ValidatedJson,
    services::board_service,
    state::SharedState,
};

/// Board reads, versioned writes and the stateless board preview.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/boards/generate", post(generate_board))
        .route(
            "/sessions/{id}/board-state",
            get(get_board_state).patch(update_board_state),
        )
        .route("/sessions/{id}/cells/{index}/mark", post(mark_cell))
        .route("/sessions/{id}/winner", get(get_winner))
}

/// Draw a board without creating a session.
#[utoipa::path(
    post,
    path = "/boards/generate",
    tag = "board",
    request_body = GenerateBoardRequest,
    responses(
        (status = 200, description = "Generated board", body = GeneratedBoardResponse),
        (status = 400, description = "Unsupported size or card pool too small", body = ErrorBody)
    )
)]
pub async fn generate_board(
    ValidatedJson(payload): ValidatedJson<GenerateBoardRequest>,
) -> Result<Json<GeneratedBoardResponse>, AppError> {
    Ok(Json(board_service::preview_board(payload)?))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/board-state",
    tag = "board",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Board and version", body = BoardStateResponse))
)]
pub async fn get_board_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<BoardStateResponse>, AppError> {
    Ok(Json(board_service::get_board_state(&state, id).await?))
}

/// Apply partial cell updates when `expected_version` is still current.
#[utoipa::path(
    patch,
    path = "/sessions/{id}/board-state",
    tag = "board",
    params(("id" = Uuid, Path, description = "Session identifier")),
    request_body = UpdateBoardStateRequest,
    responses(
        (status = 200, description = "Board updated", body = BoardUpdateResponse),
        (status = 409, description = "Version conflict; body carries current_version", body = ErrorBody)
    )
)]
pub async fn update_board_state(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    ValidatedJson(payload): ValidatedJson<UpdateBoardStateRequest>,
) -> Result<Json<BoardUpdateResponse>, AppError> {
    Ok(Json(
        board_service::update_board_state(&state, id, payload).await?,
    ))
}

/// Toggle the caller's mark on a cell.
#[utoipa::path(
    post,
    path = "/sessions/{id}/cells/{index}/mark",
    tag = "board",
    params(
        ("id" = Uuid, Path, description = "Session identifier"),
        ("index" = usize, Path, description = "Row-major cell index")
    ),
    request_body = MarkCellRequest,
    responses(
        (status = 200, description = "Cell toggled", body = BoardUpdateResponse),
        (status = 409, description = "Version conflict or blocked cell", body = ErrorBody)
    )
)]
pub async fn mark_cell(
    State(state): State<SharedState>,
    Path((id, index)): Path<(Uuid, usize)>,
    ValidatedJson(payload): ValidatedJson<MarkCellRequest>,
) -> Result<Json<BoardUpdateResponse>, AppError> {
    Ok(Json(
        board_service::mark_cell(&state, id, index, payload).await?,
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/winner",
    tag = "board",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses((status = 200, description = "Win evaluation of the stored board", body = WinResultDto))
)]
pub async fn get_winner(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<WinResultDto>, AppError> {
    Ok(Json(board_service::get_winner(&state, id).await?))
}
