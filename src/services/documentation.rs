use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for the Bingo Battles backend.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sse::lobby_stream,
        crate::routes::sse::session_stream,
        crate::routes::sessions::create_session,
        crate::routes::sessions::list_sessions,
        crate::routes::sessions::get_session,
        crate::routes::sessions::join_by_code,
        crate::routes::sessions::join_session,
        crate::routes::sessions::leave_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::pause_session,
        crate::routes::sessions::resume_session,
        crate::routes::sessions::cancel_session,
        crate::routes::board::generate_board,
        crate::routes::board::get_board_state,
        crate::routes::board::update_board_state,
        crate::routes::board::mark_cell,
        crate::routes::board::get_winner,
        crate::routes::queue::list_queue,
        crate::routes::queue::add_to_queue,
        crate::routes::queue::update_queue_position,
        crate::routes::queue::remove_from_queue,
        crate::routes::queue::approve_entry,
        crate::routes::queue::reject_entry,
        crate::routes::queue::process_queue,
        crate::routes::presence::presence_snapshot,
        crate::routes::presence::presence_ws,
    ),
    components(
        schemas(
            crate::error::ErrorBody,
            crate::error::ErrorCode,
            crate::dto::health::HealthResponse,
            crate::dto::session::SessionDetail,
            crate::dto::session::SessionSummary,
            crate::dto::session::JoinOutcomeDto,
            crate::dto::board::BoardStateResponse,
            crate::dto::board::BoardUpdateResponse,
            crate::dto::board::WinResultDto,
            crate::dto::queue::QueueEntryDto,
            crate::dto::presence::PresenceSnapshot,
            crate::dto::ws::PresenceInboundMessage,
            crate::dto::ws::PresenceAck,
            crate::dto::ws::WsEnvelope,
            crate::dto::sse::Handshake,
            crate::dto::sse::SystemStatus,
            crate::dto::sse::BoardUpdatedEvent,
            crate::dto::sse::SessionCompletedEvent,
            crate::dto::sse::SessionStatusEvent,
            crate::dto::sse::PlayerJoinedEvent,
            crate::dto::sse::PlayerLeftEvent,
            crate::dto::sse::QueueUpdatedEvent,
            crate::dto::sse::PresenceChangeEvent,
            crate::dto::sse::PresenceSyncEvent,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Session lifecycle and membership"),
        (name = "board", description = "Board state, marking and win evaluation"),
        (name = "queue", description = "Join queue management"),
        (name = "presence", description = "Presence snapshot and WebSocket"),
        (name = "sse", description = "Server-sent events streams"),
    )
)]
pub struct ApiDoc;
