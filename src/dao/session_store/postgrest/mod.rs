mod config;
mod error;
mod models;
mod store;

pub use config::{PostgrestConfig, RetryPolicy};
pub use error::PostgrestError;
pub use store::PostgrestSessionStore;

use crate::dao::storage::StorageError;

impl From<PostgrestError> for StorageError {
    fn from(err: PostgrestError) -> Self {
        // A body cut short by a timeout is an outage, not a bad row.
        let unreadable = matches!(
            &err,
            PostgrestError::DeserializeRow { source, .. } if !(source.is_timeout() || source.is_body())
        );
        if unreadable {
            StorageError::corrupted(err.to_string(), err)
        } else {
            StorageError::unavailable(err.to_string(), err)
        }
    }
}
