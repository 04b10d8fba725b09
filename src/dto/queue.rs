use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::{
        format_system_time,
        validation::{validate_color, validate_not_blank},
    },
    state::queue::{QueueEntry, QueueStatus},
};

/// Ask for a seat in a session.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct JoinQueueRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    #[validate(length(min = 1, max = 40), custom(function = "validate_not_blank"))]
    pub player_name: String,
    /// If omitted, a free palette color is reserved.
    #[validate(custom(function = "validate_color"))]
    pub color: Option<String>,
    #[serde(default)]
    pub priority: i32,
}

/// Move an entry within the pending queue. Any value up to the queue length is
/// accepted; `0` and `1` both mean the front.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateQueuePositionRequest {
    /// The host or the queued user.
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
    pub position: i64,
}

/// Wire form of a queue entry.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueueEntryDto {
    pub id: Uuid,
    pub session_id: Uuid,
    pub user_id: String,
    pub player_name: String,
    pub color: String,
    pub status: QueueStatus,
    pub requested_at: String,
    pub position: u32,
    pub priority: i32,
}

impl From<QueueEntry> for QueueEntryDto {
    fn from(entry: QueueEntry) -> Self {
        Self {
            id: entry.id,
            session_id: entry.session_id,
            user_id: entry.user_id,
            player_name: entry.player_name,
            color: entry.color,
            status: entry.status,
            requested_at: format_system_time(entry.requested_at),
            position: entry.position,
            priority: entry.priority,
        }
    }
}

/// Entries seated by a queue pass and the ones still waiting.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProcessQueueResponse {
    pub approved: Vec<QueueEntryDto>,
    pub pending: Vec<QueueEntryDto>,
}
