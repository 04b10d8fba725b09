//! Library crate for bingo-battles-back, exposing modules for binaries and integration tests.

/// Application configuration loaded from JSON.
pub mod config;
/// Storage models and session store backends.
pub mod dao;
/// Request and response payloads.
pub mod dto;
/// Service and HTTP error types.
pub mod error;
/// HTTP route trees.
pub mod routes;
/// Business logic behind the routes.
pub mod services;
/// Shared runtime state and pure game rules.
pub mod state;
