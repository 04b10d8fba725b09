//! Backend-neutral storage failures shared by every session store.

use std::error::Error;
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

type BoxedSource = Box<dyn Error + Send + Sync>;

/// Failure of a session store, whatever database sits behind it.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend could not be reached or did not answer in time.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: BoxedSource,
    },
    /// The backend answered with rows the session model cannot read.
    #[error("storage returned unreadable rows: {message}")]
    Corrupted {
        message: String,
        #[source]
        source: BoxedSource,
    },
}

impl StorageError {
    /// Wrap a failure to reach the backend.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Wrap a row that could not be decoded.
    pub fn corrupted(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Corrupted {
            message,
            source: Box::new(source),
        }
    }

    /// Whether the store may recover on its own. Unreadable rows stay unreadable.
    pub fn is_outage(&self) -> bool {
        matches!(self, StorageError::Unavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailability_counts_as_an_outage() {
        let down = StorageError::unavailable("connect refused".into(), std::io::Error::other("down"));
        assert!(down.is_outage());
        assert_eq!(down.to_string(), "storage unavailable: connect refused");
        assert!(down.source().is_some());

        let bad = StorageError::corrupted(
            "bingo_sessions".into(),
            serde_json::from_str::<u64>("\"x\"").unwrap_err(),
        );
        assert!(!bad.is_outage());
        assert!(bad.to_string().contains("unreadable rows"));
    }
}
