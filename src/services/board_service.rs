use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    dao::session_store::{SessionStore, StateWrite},
    dto::{
        board::{
            BoardStateResponse, BoardUpdateResponse, GenerateBoardRequest, GeneratedBoardResponse,
            MarkCellRequest, UpdateBoardStateRequest, WinResultDto,
        },
        sse::BoardUpdatedEvent,
    },
    error::ServiceError,
    services::{
        session_service::{self, load_players, load_session},
        sse_events,
    },
    state::{
        SharedState,
        board::{BoardCell, CellUpdate, GameState, apply_updates, generate_board, toggle_mark},
        game::{Session, SessionPlayer},
        state_machine::SessionPhase,
        win::{WinOutcome, check_winning_condition},
    },
};

/// Draw a board without creating a session.
pub fn preview_board(request: GenerateBoardRequest) -> Result<GeneratedBoardResponse, ServiceError> {
    let cells = generate_board(request.board_size, &request.card_pool)?;
    Ok(GeneratedBoardResponse {
        board_size: request.board_size,
        cells: cells.into_iter().map(Into::into).collect(),
    })
}

/// Current board and version of a session.
pub async fn get_board_state(
    state: &SharedState,
    session_id: Uuid,
) -> Result<BoardStateResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    Ok(BoardStateResponse::new(
        session.id,
        session.settings.board_size,
        session.game_state,
    ))
}

/// Evaluate the stored board against the session's win rules.
pub async fn get_winner(state: &SharedState, session_id: Uuid) -> Result<WinResultDto, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;
    let players = load_players(store.as_ref(), session_id).await?;
    let outcome = evaluate(&session, &session.game_state.cells, &players)?;
    Ok(WinResultDto::from_outcome(&outcome, &players))
}

/// Apply a batch of partial cell updates if `expected_version` is still current.
pub async fn update_board_state(
    state: &SharedState,
    session_id: Uuid,
    request: UpdateBoardStateRequest,
) -> Result<BoardUpdateResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let (session, players) =
        load_for_write(store.as_ref(), session_id, &request.user_id, request.expected_version)
            .await?;

    let updates = request
        .updates
        .into_iter()
        .map(CellUpdate::from)
        .collect::<Vec<_>>();
    let mut cells = session.game_state.cells.clone();
    apply_updates(&mut cells, &updates)?;

    commit(
        state,
        store.as_ref(),
        &session,
        &players,
        &request.user_id,
        cells,
        None,
    )
    .await
}

/// Toggle the caller's mark on one cell using their color.
pub async fn mark_cell(
    state: &SharedState,
    session_id: Uuid,
    index: usize,
    request: MarkCellRequest,
) -> Result<BoardUpdateResponse, ServiceError> {
    let store = state.require_session_store().await?;
    let (session, players) =
        load_for_write(store.as_ref(), session_id, &request.user_id, request.expected_version)
            .await?;

    let color = players
        .iter()
        .find(|p| p.user_id == request.user_id)
        .map(|p| p.color.clone())
        .ok_or_else(|| ServiceError::Unauthorized("only seated players can mark cells".into()))?;

    let mut cells = session.game_state.cells.clone();
    let (update, marked) = toggle_mark(&cells, index, &request.user_id, &color)?;
    apply_updates(&mut cells, &[update])?;

    commit(
        state,
        store.as_ref(),
        &session,
        &players,
        &request.user_id,
        cells,
        Some(marked),
    )
    .await
}

async fn load_for_write(
    store: &dyn SessionStore,
    session_id: Uuid,
    user_id: &str,
    expected_version: u64,
) -> Result<(Session, Vec<SessionPlayer>), ServiceError> {
    let session = load_session(store, session_id).await?;
    if session.status != SessionPhase::Active {
        return Err(ServiceError::InvalidState(format!(
            "board is frozen while the session is {}",
            session.status.as_str()
        )));
    }
    if session.game_state.version != expected_version {
        return Err(ServiceError::VersionConflict {
            current_version: session.game_state.version,
        });
    }

    let players = load_players(store, session_id).await?;
    if !players.iter().any(|p| p.user_id == user_id) {
        return Err(ServiceError::Unauthorized(
            "only seated players can change the board".into(),
        ));
    }
    Ok((session, players))
}

async fn commit(
    state: &SharedState,
    store: &dyn SessionStore,
    session: &Session,
    players: &[SessionPlayer],
    updated_by: &str,
    cells: Vec<BoardCell>,
    marked: Option<bool>,
) -> Result<BoardUpdateResponse, ServiceError> {
    let outcome = evaluate(session, &cells, players)?;
    let expected_version = session.game_state.version;

    let written = match store
        .update_game_state(
            session.id,
            expected_version,
            cells.into_iter().map(Into::into).collect(),
        )
        .await?
    {
        StateWrite::Applied(entity) => GameState::from(entity),
        StateWrite::Conflict { current_version } => {
            debug!(
                session_id = %session.id,
                expected_version,
                current_version,
                "board write lost the race"
            );
            return Err(ServiceError::VersionConflict { current_version });
        }
        StateWrite::NotFound => {
            return Err(ServiceError::NotFound(format!(
                "session `{}` not found",
                session.id
            )));
        }
    };

    let result = WinResultDto::from_outcome(&outcome, players);
    info!(
        session_id = %session.id,
        user_id = %updated_by,
        version = written.version,
        decided = outcome.is_decided(),
        "board updated"
    );

    let board = BoardStateResponse::new(session.id, session.settings.board_size, written);
    sse_events::broadcast_board_updated(
        state,
        BoardUpdatedEvent {
            session_id: session.id,
            version: board.version,
            last_update: board.last_update.clone(),
            updated_by: updated_by.to_string(),
            current_state: board.current_state.clone(),
            result: result.clone(),
        },
    );

    if outcome.is_decided() {
        session_service::complete_session(state, store, session, result.clone()).await?;
    }

    Ok(BoardUpdateResponse {
        board,
        result,
        marked,
    })
}

fn evaluate(
    session: &Session,
    cells: &[BoardCell],
    players: &[SessionPlayer],
) -> Result<WinOutcome, ServiceError> {
    let colors = players.iter().map(|p| p.color.clone()).collect::<Vec<_>>();
    Ok(check_winning_condition(
        cells,
        session.settings.board_size,
        session.settings.win_conditions,
        &colors,
    )?)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::*;
    use crate::{
        dto::board::CellUpdateInput,
        services::{
            session_service::{get_session, start_session},
            sse_events::{EVENT_BOARD_UPDATED, EVENT_SESSION_COMPLETED},
            test_support::{create_session, join, memory_state, settings},
        },
    };

    fn mark(user: &str, expected_version: u64) -> MarkCellRequest {
        MarkCellRequest {
            user_id: user.to_string(),
            expected_version,
        }
    }

    async fn active_session(state: &SharedState, size: usize) -> Uuid {
        let detail = create_session(state, "host", Some("blue"), settings(size, 4, false)).await;
        join(state, detail.id, "alice", Some("red")).await;
        start_session(state, detail.id, "host").await.unwrap();
        detail.id
    }

    #[test]
    fn preview_draws_a_full_board() {
        for size in 3..=6 {
            let board = preview_board(GenerateBoardRequest {
                board_size: size,
                card_pool: Vec::new(),
            })
            .unwrap();
            assert_eq!(board.cells.len(), size * size);
            let ids = board.cells.iter().map(|c| &c.cell_id).collect::<HashSet<_>>();
            assert_eq!(ids.len(), size * size);
        }
    }

    #[tokio::test]
    async fn blue_top_row_wins_a_three_by_three_board() {
        let state = memory_state();
        let session_id = active_session(&state, 3).await;
        let mut events = state.sse().subscribe_session(session_id);

        for (version, index) in [0, 1, 2].into_iter().enumerate() {
            let response = mark_cell(&state, session_id, index, mark("host", version as u64))
                .await
                .unwrap();
            assert_eq!(response.marked, Some(true));
            assert_eq!(response.board.version, version as u64 + 1);
        }

        let winner = get_winner(&state, session_id).await.unwrap();
        assert!(winner.has_winner);
        assert_eq!(winner.winner, Some(0));
        assert_eq!(winner.winning_color.as_deref(), Some("blue"));
        assert_eq!(winner.winner_id.as_deref(), Some("host"));
        assert_eq!(winner.winning_line, Some(vec![0, 1, 2]));

        let session = get_session(&state, session_id).await.unwrap();
        assert_eq!(session.status, SessionPhase::Completed);
        assert_eq!(session.winner_id.as_deref(), Some("host"));

        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert_eq!(
            names.iter().filter(|n| *n == EVENT_BOARD_UPDATED).count(),
            3
        );
        assert!(names.iter().any(|n| n == EVENT_SESSION_COMPLETED));

        let err = mark_cell(&state, session_id, 3, mark("alice", 3))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn stale_version_is_rejected_with_current_version() {
        let state = memory_state();
        let session_id = active_session(&state, 4).await;
        mark_cell(&state, session_id, 5, mark("alice", 0)).await.unwrap();

        let err = mark_cell(&state, session_id, 6, mark("host", 0))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::VersionConflict { current_version: 1 }
        ));
        let board = get_board_state(&state, session_id).await.unwrap();
        assert!(!board.current_state[6].is_marked);
    }

    #[tokio::test]
    async fn toggling_twice_unmarks_the_cell() {
        let state = memory_state();
        let session_id = active_session(&state, 3).await;
        mark_cell(&state, session_id, 4, mark("alice", 0)).await.unwrap();
        let response = mark_cell(&state, session_id, 4, mark("alice", 1)).await.unwrap();
        assert_eq!(response.marked, Some(false));
        let cell = &response.board.current_state[4];
        assert!(!cell.is_marked);
        assert!(cell.colors.is_empty());
        assert!(cell.completed_by.is_empty());
    }

    #[tokio::test]
    async fn writes_require_an_active_session_and_a_seat() {
        let state = memory_state();
        let detail = create_session(&state, "host", None, settings(3, 4, false)).await;
        let err = mark_cell(&state, detail.id, 0, mark("host", 0)).await.unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));

        start_session(&state, detail.id, "host").await.unwrap();
        let err = mark_cell(&state, detail.id, 0, mark("stranger", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }

    #[tokio::test]
    async fn blocked_cells_cannot_be_marked() {
        let state = memory_state();
        let session_id = active_session(&state, 3).await;
        update_board_state(
            &state,
            session_id,
            UpdateBoardStateRequest {
                user_id: "host".into(),
                expected_version: 0,
                updates: vec![CellUpdateInput {
                    index: 8,
                    text: None,
                    colors: None,
                    completed_by: None,
                    blocked: Some(true),
                    is_marked: None,
                }],
            },
        )
        .await
        .unwrap();

        let err = mark_cell(&state, session_id, 8, mark("alice", 1))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidState(_)));
    }

    #[tokio::test]
    async fn out_of_range_index_is_invalid_input() {
        let state = memory_state();
        let session_id = active_session(&state, 3).await;
        let err = mark_cell(&state, session_id, 9, mark("alice", 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidInput(_)));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_writers_converge_on_accepted_writes() {
        const WRITERS: usize = 4;
        const WRITES_EACH: usize = 5;

        let state = memory_state();
        let session_id = active_session(&state, 5).await;

        let mut handles = Vec::new();
        for writer in 0..WRITERS {
            let state = state.clone();
            let user = if writer % 2 == 0 { "host" } else { "alice" };
            handles.push(tokio::spawn(async move {
                let mut accepted = 0;
                let mut version = 0;
                while accepted < WRITES_EACH {
                    let request = UpdateBoardStateRequest {
                        user_id: user.to_string(),
                        expected_version: version,
                        updates: vec![CellUpdateInput {
                            index: writer,
                            text: Some(format!("writer {writer} pass {accepted}")),
                            colors: None,
                            completed_by: None,
                            blocked: None,
                            is_marked: None,
                        }],
                    };
                    match update_board_state(&state, session_id, request).await {
                        Ok(response) => {
                            accepted += 1;
                            version = response.board.version;
                        }
                        Err(ServiceError::VersionConflict { current_version }) => {
                            version = current_version;
                        }
                        Err(err) => panic!("unexpected error: {err}"),
                    }
                }
                accepted
            }));
        }

        let mut total = 0;
        for handle in handles {
            total += handle.await.unwrap();
        }
        let board = get_board_state(&state, session_id).await.unwrap();
        assert_eq!(total, WRITERS * WRITES_EACH);
        assert_eq!(board.version, total as u64);
    }
}
