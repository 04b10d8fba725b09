use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a bingo session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Lobby is open; players join and the board is visible but frozen.
    Waiting,
    /// Players are marking cells.
    Active,
    /// The host paused marking.
    Paused,
    /// A winner (or a tie) was recorded.
    Completed,
    /// The host abandoned the session.
    Cancelled,
}

impl SessionPhase {
    /// Whether the session is over and can no longer change.
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionPhase::Completed | SessionPhase::Cancelled)
    }

    /// Whether new players can still be admitted.
    pub fn accepts_players(self) -> bool {
        matches!(self, SessionPhase::Waiting | SessionPhase::Active)
    }

    /// Wire name, identical to the serde representation.
    pub fn as_str(self) -> &'static str {
        match self {
            SessionPhase::Waiting => "waiting",
            SessionPhase::Active => "active",
            SessionPhase::Paused => "paused",
            SessionPhase::Completed => "completed",
            SessionPhase::Cancelled => "cancelled",
        }
    }
}

/// Events that can be applied to a session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    /// Host starts the game from the lobby.
    Start,
    /// Host pauses an active game.
    Pause,
    /// Host resumes a paused game.
    Resume,
    /// The board evaluator decided the game.
    Complete,
    /// Host abandons the session.
    Cancel,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while {from:?}")]
pub struct InvalidTransition {
    /// The phase the session was in when the invalid event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// A validated transition, ready to be written with a compare on `from`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    /// Phase the stored session must still be in.
    pub from: SessionPhase,
    /// Phase written on success.
    pub to: SessionPhase,
    /// Event that triggered this transition.
    pub event: SessionEvent,
}

/// Validate `event` against `from` and return the planned transition.
pub fn plan(from: SessionPhase, event: SessionEvent) -> Result<Transition, InvalidTransition> {
    let to = match (from, event) {
        (SessionPhase::Waiting, SessionEvent::Start) => SessionPhase::Active,
        (SessionPhase::Active, SessionEvent::Pause) => SessionPhase::Paused,
        (SessionPhase::Paused, SessionEvent::Resume) => SessionPhase::Active,
        (SessionPhase::Active, SessionEvent::Complete) => SessionPhase::Completed,
        (SessionPhase::Waiting | SessionPhase::Active | SessionPhase::Paused, SessionEvent::Cancel) => {
            SessionPhase::Cancelled
        }
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(Transition { from, to, event })
}
