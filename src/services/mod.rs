/// Board reads, versioned writes and win evaluation.
pub mod board_service;
/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Presence tracking for connected clients.
pub mod presence_service;
/// Join-queue management.
pub mod queue_service;
/// Session lifecycle, joins and departures.
pub mod session_service;
/// Server-Sent Events message generation.
pub mod sse_events;
/// Server-Sent Events streaming service.
pub mod sse_service;
/// Storage connection supervisor with degraded-mode handling.
pub mod storage_supervisor;
/// Presence WebSocket handling.
pub mod websocket_service;

#[cfg(test)]
pub(crate) mod test_support;
