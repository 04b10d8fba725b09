use std::time::Duration;

use axum::{
    Json,
    http::{HeaderValue, StatusCode, header::RETRY_AFTER},
    response::IntoResponse,
};
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use validator::ValidationErrors;

use crate::{
    dao::storage::StorageError,
    state::{
        board::BoardError, queue::QueueError, rate_limit::RateLimited,
        state_machine::InvalidTransition,
    },
};

/// Errors that can occur in service layer operations.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Storage backend is unavailable.
    #[error("storage unavailable")]
    Unavailable(#[source] StorageError),
    /// Application is running in degraded mode without storage.
    #[error("storage unavailable (degraded mode)")]
    Degraded,
    /// Caller is neither the host nor the owner of the resource.
    #[error("{0}")]
    Unauthorized(String),
    /// Invalid input provided by the client.
    #[error("{0}")]
    InvalidInput(String),
    /// Operation cannot be performed in the current state.
    #[error("{0}")]
    InvalidState(String),
    /// Requested resource was not found.
    #[error("{0}")]
    NotFound(String),
    /// Board write raced with another writer.
    #[error("board state changed; current version is {current_version}")]
    VersionConflict {
        /// Version currently stored for the board.
        current_version: u64,
    },
    /// Every seat is taken and queueing is disabled.
    #[error("Session is full")]
    SessionFull,
    /// Join-queue rule violation.
    #[error(transparent)]
    Queue(#[from] QueueError),
    /// Too many join attempts in the current window.
    #[error(transparent)]
    RateLimited(#[from] RateLimited),
}

impl From<StorageError> for ServiceError {
    fn from(err: StorageError) -> Self {
        ServiceError::Unavailable(err)
    }
}

impl From<BoardError> for ServiceError {
    fn from(err: BoardError) -> Self {
        match err {
            BoardError::Blocked(_) => ServiceError::InvalidState(err.to_string()),
            other => ServiceError::InvalidInput(other.to_string()),
        }
    }
}

impl From<InvalidTransition> for ServiceError {
    fn from(err: InvalidTransition) -> Self {
        ServiceError::InvalidState(err.to_string())
    }
}

/// Stable machine-readable error codes returned in every error body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Request body or parameters failed validation.
    InvalidInput,
    /// Negative queue position.
    InvalidPosition,
    /// Caller is not allowed to act on the resource.
    Unauthorized,
    /// Unknown session or queue entry.
    NotFound,
    /// Operation not allowed in the current session phase or entry status.
    InvalidState,
    /// Board write based on a stale version; the body carries `current_version`.
    VersionConflict,
    /// Every seat is taken.
    SessionFull,
    /// Pending queue is at capacity.
    QueueFull,
    /// Join attempts exceeded the rate limit; see `Retry-After`.
    TooManyAttempts,
    /// No session store is reachable.
    StorageUnavailable,
    /// Unexpected failure, including unreadable stored rows.
    Internal,
}

impl From<ValidationErrors> for AppError {
    fn from(err: ValidationErrors) -> Self {
        AppError::BadRequest {
            code: ErrorCode::InvalidInput,
            message: format!("validation failed: {}", err),
        }
    }
}

/// Application-level errors that are converted to HTTP responses.
#[derive(Debug, Error)]
pub enum AppError {
    /// Bad request with invalid input.
    #[error("bad request: {message}")]
    BadRequest { code: ErrorCode, message: String },
    /// Caller lacks the right to act on the resource.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// Requested resource not found.
    #[error("not found: {0}")]
    NotFound(String),
    /// Conflict with current state.
    #[error("conflict: {message}")]
    Conflict {
        code: ErrorCode,
        message: String,
        /// Board version the caller should reload, for version conflicts.
        current_version: Option<u64>,
    },
    /// Capacity or rate limit reached.
    #[error("too many requests: {message}")]
    TooManyRequests {
        code: ErrorCode,
        message: String,
        retry_after: Option<Duration>,
    },
    /// Service unavailable or degraded.
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<ServiceError> for AppError {
    fn from(err: ServiceError) -> Self {
        match err {
            ServiceError::Unavailable(source) if !source.is_outage() => {
                AppError::Internal(source.to_string())
            }
            ServiceError::Unavailable(source) => AppError::ServiceUnavailable(source.to_string()),
            ServiceError::Degraded => AppError::ServiceUnavailable("degraded mode".into()),
            ServiceError::Unauthorized(message) => AppError::Forbidden(message),
            ServiceError::InvalidInput(message) => AppError::BadRequest {
                code: ErrorCode::InvalidInput,
                message,
            },
            ServiceError::InvalidState(message) => AppError::Conflict {
                code: ErrorCode::InvalidState,
                message,
                current_version: None,
            },
            ServiceError::NotFound(message) => AppError::NotFound(message),
            ServiceError::VersionConflict { current_version } => AppError::Conflict {
                code: ErrorCode::VersionConflict,
                message: version_conflict_message(current_version),
                current_version: Some(current_version),
            },
            ServiceError::SessionFull => AppError::Conflict {
                code: ErrorCode::SessionFull,
                message: "Session is full".into(),
                current_version: None,
            },
            ServiceError::Queue(err @ QueueError::Full { .. }) => AppError::TooManyRequests {
                code: ErrorCode::QueueFull,
                message: err.to_string(),
                retry_after: None,
            },
            ServiceError::Queue(err @ QueueError::InvalidPosition(_)) => AppError::BadRequest {
                code: ErrorCode::InvalidPosition,
                message: err.to_string(),
            },
            ServiceError::RateLimited(limited) => AppError::TooManyRequests {
                code: ErrorCode::TooManyAttempts,
                message: "Too many join attempts, try again later".into(),
                retry_after: Some(limited.retry_after),
            },
        }
    }
}

fn version_conflict_message(current_version: u64) -> String {
    format!("Board state was modified by another player (current version {current_version})")
}

/// JSON body attached to every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code.
    pub code: ErrorCode,
    /// Human readable description.
    pub message: String,
    /// Version currently stored, on version conflicts.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_version: Option<u64>,
}

impl AppError {
    fn parts(&self) -> (StatusCode, ErrorCode, String, Option<u64>) {
        match self {
            AppError::BadRequest { code, message } => {
                (StatusCode::BAD_REQUEST, *code, message.clone(), None)
            }
            AppError::Forbidden(message) => {
                (StatusCode::FORBIDDEN, ErrorCode::Unauthorized, message.clone(), None)
            }
            AppError::NotFound(message) => {
                (StatusCode::NOT_FOUND, ErrorCode::NotFound, message.clone(), None)
            }
            AppError::Conflict {
                code,
                message,
                current_version,
            } => (StatusCode::CONFLICT, *code, message.clone(), *current_version),
            AppError::TooManyRequests { code, message, .. } => {
                (StatusCode::TOO_MANY_REQUESTS, *code, message.clone(), None)
            }
            AppError::ServiceUnavailable(message) => (
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorCode::StorageUnavailable,
                message.clone(),
                None,
            ),
            AppError::Internal(message) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorCode::Internal,
                message.clone(),
                None,
            ),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        let (status, code, message, current_version) = self.parts();
        let payload = Json(ErrorBody {
            code,
            message,
            current_version,
        });

        let mut response = (status, payload).into_response();
        if let AppError::TooManyRequests {
            retry_after: Some(delay),
            ..
        } = self
        {
            let secs = delay.as_secs().max(1);
            if let Ok(value) = HeaderValue::from_str(&secs.to_string()) {
                response.headers_mut().insert(RETRY_AFTER, value);
            }
        }
        response
    }
}
