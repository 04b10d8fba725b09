use axum::{
    Json, Router,
    extract::{FromRequest, Request},
};
use axum_valid::{Valid, ValidRejection};
use serde::de::DeserializeOwned;
use validator::Validate;

use crate::{
    error::{AppError, ErrorCode},
    state::SharedState,
};

pub mod board;
pub mod docs;
pub mod health;
pub mod presence;
pub mod queue;
pub mod sessions;
pub mod sse;

/// Compose all route trees, wiring in shared state and documentation routes.
pub fn router(state: SharedState) -> Router<()> {
    let api_router = health::router()
        .merge(sse::router())
        .merge(sessions::router())
        .merge(board::router())
        .merge(queue::router())
        .merge(presence::router());

    let docs_router = docs::router(state.clone());

    api_router.merge(docs_router).with_state(state)
}

/// JSON body checked with `validator` before reaching the handler.
///
/// Malformed bodies and failed validation both render as `INVALID_INPUT`.
pub struct ValidatedJson<T>(pub T);

impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Validate,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Valid::<Json<T>>::from_request(req, state).await {
            Ok(Valid(Json(value))) => Ok(Self(value)),
            Err(ValidRejection::Valid(errors)) => Err(AppError::from(errors)),
            Err(ValidRejection::Inner(rejection)) => Err(AppError::BadRequest {
                code: ErrorCode::InvalidInput,
                message: rejection.body_text(),
            }),
        }
    }
}
