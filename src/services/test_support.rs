use std::sync::Arc;

use uuid::Uuid;

use crate::{
    config::AppConfig,
    dao::session_store::memory::MemorySessionStore,
    dto::session::{
        CreateSessionRequest, JoinOutcomeDto, JoinSessionRequest, SessionDetail,
        SessionSettingsInput,
    },
    services::session_service,
    state::{AppState, SharedState},
};

pub fn memory_state() -> SharedState {
    AppState::with_store(AppConfig::default(), Arc::new(MemorySessionStore::new()))
}

pub fn memory_state_with(config: AppConfig) -> SharedState {
    AppState::with_store(config, Arc::new(MemorySessionStore::new()))
}

pub fn settings(board_size: usize, max_players: usize, allow_queue: bool) -> SessionSettingsInput {
    SessionSettingsInput {
        board_size: Some(board_size),
        max_players: Some(max_players),
        allow_queue,
        ..SessionSettingsInput::default()
    }
}

pub async fn create_session(
    state: &SharedState,
    host: &str,
    color: Option<&str>,
    settings: SessionSettingsInput,
) -> SessionDetail {
    session_service::create_session(
        state,
        CreateSessionRequest {
            host_id: host.to_string(),
            host_name: host.to_uppercase(),
            color: color.map(str::to_string),
            settings,
        },
    )
    .await
    .unwrap()
}

pub async fn join(
    state: &SharedState,
    session_id: Uuid,
    user: &str,
    color: Option<&str>,
) -> JoinOutcomeDto {
    session_service::join_session(
        state,
        session_id,
        JoinSessionRequest {
            user_id: user.to_string(),
            display_name: user.to_uppercase(),
            color: color.map(str::to_string),
        },
    )
    .await
    .unwrap()
}
