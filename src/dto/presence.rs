use serde::Serialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::format_system_time,
    state::presence::{PresenceState, PresenceStatus},
};

/// Presence of one connected user.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceStateDto {
    pub user_id: String,
    pub online_at: String,
    pub last_seen_at: String,
    pub status: PresenceStatus,
}

impl From<PresenceState> for PresenceStateDto {
    fn from(state: PresenceState) -> Self {
        Self {
            user_id: state.user_id,
            online_at: format_system_time(state.online_at),
            last_seen_at: format_system_time(state.last_seen_at),
            status: state.status,
        }
    }
}

/// Everyone currently present in a session, in join order.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PresenceSnapshot {
    pub session_id: Uuid,
    pub presences: Vec<PresenceStateDto>,
}

impl PresenceSnapshot {
    pub fn new(session_id: Uuid, states: Vec<PresenceState>) -> Self {
        Self {
            session_id,
            presences: states.into_iter().map(Into::into).collect(),
        }
    }
}
