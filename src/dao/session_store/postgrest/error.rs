//! Error types shared by the PostgREST storage implementation.

use reqwest::StatusCode;
use thiserror::Error;

/// Convenient result alias returning [`PostgrestError`] failures.
pub type PostgrestResult<T> = Result<T, PostgrestError>;

/// Failures that can occur while talking to the PostgREST endpoint.
#[derive(Debug, Error)]
pub enum PostgrestError {
    /// Required environment variable is missing.
    #[error("missing Supabase environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    /// Building the HTTP client failed.
    #[error("failed to build PostgREST client")]
    ClientBuilder {
        #[source]
        source: reqwest::Error,
    },
    /// The request could not be sent, even after retrying.
    #[error("failed to send PostgREST request to `{table}`")]
    RequestSend {
        table: String,
        #[source]
        source: reqwest::Error,
    },
    /// The endpoint answered with an unexpected status code.
    #[error("unexpected PostgREST response status {status} for `{table}`: {body}")]
    RequestStatus {
        table: String,
        status: StatusCode,
        body: String,
    },
    /// Response payload could not be read as JSON rows.
    #[error("failed to decode PostgREST response for `{table}`")]
    DeserializeRow {
        table: String,
        #[source]
        source: reqwest::Error,
    },
}

impl PostgrestError {
    /// Whether the failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            PostgrestError::RequestSend { source, .. } => {
                source.is_connect() || source.is_timeout() || source.is_request()
            }
            PostgrestError::RequestStatus { status, .. } => {
                status.is_server_error() || *status == StatusCode::TOO_MANY_REQUESTS
            }
            _ => false,
        }
    }

    /// Whether the request certainly never reached the endpoint.
    pub fn is_unsent(&self) -> bool {
        matches!(self, PostgrestError::RequestSend { source, .. } if source.is_connect())
    }

    /// Whether a write may have been committed even though no usable answer came back.
    pub fn may_have_committed(&self) -> bool {
        match self {
            PostgrestError::RequestSend { source, .. } => !source.is_connect(),
            PostgrestError::RequestStatus { status, .. } => status.is_server_error(),
            PostgrestError::DeserializeRow { source, .. } => source.is_timeout() || source.is_body(),
            _ => false,
        }
    }

    /// Whether the endpoint rejected a row because of a unique constraint.
    pub fn is_unique_violation(&self) -> bool {
        matches!(
            self,
            PostgrestError::RequestStatus { status, .. } if *status == StatusCode::CONFLICT
        )
    }
}
