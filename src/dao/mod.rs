/// Database model definitions.
pub mod models;
/// Session, player and queue persistence behind the [`session_store::SessionStore`] trait.
pub mod session_store;
/// Storage abstraction layer for database operations.
pub mod storage;
