use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::state::presence::PresenceStatus;

#[derive(Debug, Deserialize, Serialize, ToSchema)]
/// Messages accepted from presence WebSocket clients.
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PresenceInboundMessage {
    /// Must be the first frame of a connection.
    Track {
        user_id: String,
        #[serde(default)]
        status: PresenceStatus,
    },
    Status {
        status: PresenceStatus,
    },
    Heartbeat,
    #[serde(other)]
    Unknown,
}

impl PresenceInboundMessage {
    pub fn track_request(&self) -> Option<(&str, PresenceStatus)> {
        match self {
            Self::Track { user_id, status } => Some((user_id.as_str(), *status)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
/// Acknowledgement sent once a connection is tracked.
pub struct PresenceAck {
    pub user_id: String,
    pub status: PresenceStatus,
}

#[derive(Debug, Serialize, ToSchema)]
/// Session events relayed to WebSocket clients, mirroring the SSE stream.
pub struct WsEnvelope {
    pub event: String,
    #[schema(value_type = Object)]
    pub data: serde_json::Value,
}
