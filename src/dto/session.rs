use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        board::BoardStateResponse,
        format_system_time,
        queue::QueueEntryDto,
        validation::{validate_color, validate_not_blank, validate_session_code},
    },
    state::{
        game::{Session, SessionPlayer, SessionSettings},
        state_machine::SessionPhase,
        win::WinConditions,
    },
};

/// Optional settings supplied when creating a session; omitted values use the
/// configured defaults.
#[derive(Debug, Default, Deserialize, ToSchema, Validate)]
pub struct SessionSettingsInput {
    #[validate(range(min = 3, max = 6))]
    pub board_size: Option<usize>,
    #[validate(range(min = 2, max = 12))]
    pub max_players: Option<usize>,
    pub win_conditions: Option<WinConditions>,
    #[serde(default)]
    pub allow_queue: bool,
    #[serde(default)]
    pub card_pool: Vec<String>,
}

/// Payload used to open a new session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateSessionRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub host_id: String,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub host_name: String,
    /// If omitted, the first unused palette color is picked.
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    #[serde(default)]
    #[validate(nested)]
    pub settings: SessionSettingsInput,
}

/// Join a session by id.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinSessionRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub display_name: String,
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
}

/// Join a session by its short code.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinByCodeRequest {
    #[validate(custom(function = "validate_session_code"))]
    pub session_code: String,
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub display_name: String,
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
}

/// Settings as reported back to clients.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSettingsDto {
    pub board_size: usize,
    pub max_players: usize,
    pub win_conditions: WinConditions,
    pub allow_queue: bool,
    pub card_pool: Vec<String>,
}

impl From<SessionSettings> for SessionSettingsDto {
    fn from(settings: SessionSettings) -> Self {
        Self {
            board_size: settings.board_size,
            max_players: settings.max_players,
            win_conditions: settings.win_conditions,
            allow_queue: settings.allow_queue,
            card_pool: settings.card_pool,
        }
    }
}

/// A seated player.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionPlayerDto {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
    pub joined_at: String,
    pub is_host: bool,
}

impl From<SessionPlayer> for SessionPlayerDto {
    fn from(player: SessionPlayer) -> Self {
        Self {
            user_id: player.user_id,
            display_name: player.display_name,
            color: player.color,
            joined_at: format_system_time(player.joined_at),
            is_host: player.is_host,
        }
    }
}

/// Lightweight listing entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSummary {
    pub id: Uuid,
    pub session_code: String,
    pub host_id: String,
    pub status: SessionPhase,
    pub board_size: usize,
    pub max_players: usize,
    pub created_at: String,
}

impl From<&Session> for SessionSummary {
    fn from(session: &Session) -> Self {
        Self {
            id: session.id,
            session_code: session.session_code.clone(),
            host_id: session.host_id.clone(),
            status: session.status,
            board_size: session.settings.board_size,
            max_players: session.settings.max_players,
            created_at: format_system_time(session.created_at),
        }
    }
}

/// Full view of a session.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionDetail {
    pub id: Uuid,
    pub session_code: String,
    pub host_id: String,
    pub status: SessionPhase,
    pub settings: SessionSettingsDto,
    pub players: Vec<SessionPlayerDto>,
    pub board: BoardStateResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ended_at: Option<String>,
}

impl SessionDetail {
    pub fn new(session: Session, players: Vec<SessionPlayer>) -> Self {
        Self {
            id: session.id,
            session_code: session.session_code,
            host_id: session.host_id,
            status: session.status,
            board: BoardStateResponse::new(
                session.id,
                session.settings.board_size,
                session.game_state,
            ),
            settings: session.settings.into(),
            players: players.into_iter().map(Into::into).collect(),
            winner_id: session.winner_id,
            created_at: format_system_time(session.created_at),
            updated_at: format_system_time(session.updated_at),
            started_at: session.started_at.map(format_system_time),
            ended_at: session.ended_at.map(format_system_time),
        }
    }
}

/// Result of a join attempt: seated right away or placed in the queue.
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum JoinOutcomeDto {
    Joined {
        session_id: Uuid,
        player: SessionPlayerDto,
    },
    Queued {
        session_id: Uuid,
        entry: QueueEntryDto,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_defaults_settings() {
        let request: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "host_id": "host",
            "host_name": "Host"
        }))
        .unwrap();
        assert!(request.validate().is_ok());
        assert!(request.settings.board_size.is_none());
        assert!(!request.settings.allow_queue);
    }

    #[test]
    fn create_request_checks_nested_ranges() {
        let request: CreateSessionRequest = serde_json::from_value(serde_json::json!({
            "host_id": "host",
            "host_name": "Host",
            "settings": { "board_size": 8, "max_players": 1 }
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        assert!(errors.errors().contains_key("settings"));
        assert!(request.settings.validate().is_err());
    }

    #[test]
    fn join_by_code_checks_code_and_color() {
        let request: JoinByCodeRequest = serde_json::from_value(serde_json::json!({
            "session_code": "abc123",
            "user_id": "u1",
            "display_name": "U1",
            "color": "Red"
        }))
        .unwrap();
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("session_code"));
        assert!(fields.contains_key("color"));
    }
}
