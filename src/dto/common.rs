use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{dto::validation::validate_not_blank, state::state_machine::SessionPhase};

/// Identifies the caller of a host-only or player action.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct ActorRequest {
    #[validate(length(min = 1, max = 64), custom(function = "validate_not_blank"))]
    pub user_id: String,
}

/// Filter for `GET /sessions`.
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ListSessionsQuery {
    /// Only return sessions in this phase.
    pub status: Option<SessionPhase>,
}
