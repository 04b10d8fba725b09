use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        format_system_time,
        validation::{validate_color, validate_not_blank},
    },
    state::{
        board::{BoardCell, CellUpdate, GameState},
        game::SessionPlayer,
        win::{WinOutcome, WinRule},
    },
};

/// Wire form of a board cell.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BoardCellDto {
    pub cell_id: String,
    pub text: String,
    pub colors: Vec<String>,
    pub completed_by: Vec<String>,
    pub blocked: bool,
    pub is_marked: bool,
}

impl From<BoardCell> for BoardCellDto {
    fn from(cell: BoardCell) -> Self {
        Self {
            cell_id: cell.cell_id,
            text: cell.text,
            colors: cell.colors,
            completed_by: cell.completed_by,
            blocked: cell.blocked,
            is_marked: cell.is_marked,
        }
    }
}

/// Current board of a session with its concurrency version.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardStateResponse {
    pub session_id: Uuid,
    pub board_size: usize,
    pub current_state: Vec<BoardCellDto>,
    /// Send this back as `expected_version` on the next write.
    pub version: u64,
    /// RFC 3339 timestamp of the last accepted write.
    pub last_update: String,
}

impl BoardStateResponse {
    pub fn new(session_id: Uuid, board_size: usize, state: GameState) -> Self {
        Self {
            session_id,
            board_size,
            current_state: state.cells.into_iter().map(Into::into).collect(),
            version: state.version,
            last_update: format_system_time(state.last_update),
        }
    }
}

/// Partial update of one cell; omitted fields are left unchanged.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CellUpdateInput {
    pub index: usize,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub colors: Option<Vec<String>>,
    #[serde(default)]
    pub completed_by: Option<Vec<String>>,
    #[serde(default)]
    pub blocked: Option<bool>,
    #[serde(default)]
    pub is_marked: Option<bool>,
}

impl Validate for CellUpdateInput {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Some(ref text) = self.text {
            if let Err(e) = validate_not_blank(text) {
                errors.add("text", e);
            }
        }

        if let Some(ref colors) = self.colors {
            if let Some(e) = colors.iter().find_map(|c| validate_color(c).err()) {
                errors.add("colors", e);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

impl From<CellUpdateInput> for CellUpdate {
    fn from(input: CellUpdateInput) -> Self {
        Self {
            index: input.index,
            text: input.text,
            colors: input.colors,
            completed_by: input.completed_by,
            blocked: input.blocked,
            is_marked: input.is_marked,
        }
    }
}

/// Conditional board write.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateBoardStateRequest {
    /// Player submitting the change; must be seated in the session.
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    /// Version the client last read.
    pub expected_version: u64,
    #[validate(length(min = 1), nested)]
    pub updates: Vec<CellUpdateInput>,
}

/// Toggle the caller's mark on a cell.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct MarkCellRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    pub expected_version: u64,
}

/// Outcome of evaluating the win rules against a board.
#[derive(Debug, Clone, Serialize, ToSchema, PartialEq, Eq)]
pub struct WinResultDto {
    pub has_winner: bool,
    /// Winning player index in join order, `-1` for a tie, absent while undecided.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_color: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winner_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule: Option<WinRule>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub winning_line: Option<Vec<usize>>,
}

impl WinResultDto {
    /// Describe `outcome`, resolving the winner index against `players`.
    pub fn from_outcome(outcome: &WinOutcome, players: &[SessionPlayer]) -> Self {
        let winner = outcome.winner_index();
        match outcome {
            WinOutcome::Winner {
                player,
                color,
                rule,
                line,
            } => Self {
                has_winner: true,
                winner,
                winning_color: Some(color.clone()),
                winner_id: players.get(*player).map(|p| p.user_id.clone()),
                rule: Some(*rule),
                winning_line: line.clone(),
            },
            WinOutcome::Tie | WinOutcome::Pending => Self {
                has_winner: false,
                winner,
                winning_color: None,
                winner_id: None,
                rule: None,
                winning_line: None,
            },
        }
    }
}

/// Board after an accepted write, with the evaluation that followed it.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct BoardUpdateResponse {
    pub board: BoardStateResponse,
    pub result: WinResultDto,
    /// For mark requests: whether the caller now marks the cell.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub marked: Option<bool>,
}

/// Board preview request.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct GenerateBoardRequest {
    #[validate(range(min = 3, max = 6))]
    pub board_size: usize,
    #[serde(default)]
    pub card_pool: Vec<String>,
}

/// Generated board, not attached to any session.
#[derive(Debug, Serialize, ToSchema)]
pub struct GeneratedBoardResponse {
    pub board_size: usize,
    pub cells: Vec<BoardCellDto>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn player(user_id: &str, color: &str) -> SessionPlayer {
        SessionPlayer {
            user_id: user_id.into(),
            display_name: user_id.into(),
            color: color.into(),
            joined_at: SystemTime::now(),
            is_host: false,
        }
    }

    #[test]
    fn tie_reports_minus_one_without_winner() {
        let dto = WinResultDto::from_outcome(&WinOutcome::Tie, &[]);
        assert!(!dto.has_winner);
        assert_eq!(dto.winner, Some(-1));
        let json = serde_json::to_value(&dto).unwrap();
        assert_eq!(json, serde_json::json!({ "has_winner": false, "winner": -1 }));
    }

    #[test]
    fn winner_is_resolved_to_user_id() {
        let players = [player("alice", "red"), player("bob", "blue")];
        let outcome = WinOutcome::Winner {
            player: 1,
            color: "blue".into(),
            rule: WinRule::Line,
            line: Some(vec![0, 1, 2]),
        };
        let dto = WinResultDto::from_outcome(&outcome, &players);
        assert_eq!(dto.winner, Some(1));
        assert_eq!(dto.winner_id.as_deref(), Some("bob"));
        assert_eq!(dto.winning_line, Some(vec![0, 1, 2]));
    }

    #[test]
    fn update_request_rejects_bad_colors_and_empty_batches() {
        let request: UpdateBoardStateRequest = serde_json::from_value(serde_json::json!({
            "user_id": "alice",
            "expected_version": 0,
            "updates": [{ "index": 0, "colors": ["Not A Color"] }]
        }))
        .unwrap();
        assert!(request.validate().is_err());

        let empty: UpdateBoardStateRequest = serde_json::from_value(serde_json::json!({
            "user_id": "alice",
            "expected_version": 0,
            "updates": []
        }))
        .unwrap();
        assert!(empty.validate().is_err());

        let valid: UpdateBoardStateRequest = serde_json::from_value(serde_json::json!({
            "user_id": "alice",
            "expected_version": 3,
            "updates": [{ "index": 4, "text": "Free space", "colors": ["blue"] }]
        }))
        .unwrap();
        assert!(valid.validate().is_ok());
    }

    #[test]
    fn preview_rejects_unsupported_sizes() {
        for (size, ok) in [(2, false), (3, true), (6, true), (7, false)] {
            let request = GenerateBoardRequest {
                board_size: size,
                card_pool: Vec::new(),
            };
            assert_eq!(request.validate().is_ok(), ok, "size {size}");
        }
    }
}
