use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::dto::sse::ServerEvent;

/// SSE-specific sub-state carved out from [`AppState`](super::AppState).
pub struct SseState {
    lobby: SseHub,
    sessions: DashMap<Uuid, SseHub>,
    session_capacity: usize,
}

impl SseState {
    /// Build the SSE sub-tree with per-stream channel capacities.
    pub fn new(lobby_capacity: usize, session_capacity: usize) -> Self {
        Self {
            lobby: SseHub::new(lobby_capacity),
            sessions: DashMap::new(),
            session_capacity,
        }
    }

    /// Hub carrying session-list events (creation, status changes).
    pub fn lobby(&self) -> &SseHub {
        &self.lobby
    }

    /// Subscribe to the realtime channel of one session, creating it on demand.
    pub fn subscribe_session(&self, session_id: Uuid) -> broadcast::Receiver<ServerEvent> {
        self.sessions
            .entry(session_id)
            .or_insert_with(|| SseHub::new(self.session_capacity))
            .subscribe()
    }

    /// Send an event to the subscribers of one session, if any.
    pub fn broadcast_session(&self, session_id: Uuid, event: ServerEvent) {
        if let Some(hub) = self.sessions.get(&session_id) {
            hub.broadcast(event);
        }
    }

    /// Drop the channel of a finished session once nobody listens anymore.
    pub fn release_session(&self, session_id: Uuid) {
        self.sessions
            .remove_if(&session_id, |_, hub| hub.receiver_count() == 0);
    }
}

/// Simple broadcast hub wrapper used by the SSE services.
pub struct SseHub {
    sender: broadcast::Sender<ServerEvent>,
}

impl SseHub {
    /// Construct a new hub backed by a Tokio broadcast channel with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent events.
    pub fn subscribe(&self) -> broadcast::Receiver<ServerEvent> {
        self.sender.subscribe()
    }

    /// Send an event to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, event: ServerEvent) {
        let _ = self.sender.send(event);
    }

    /// Number of live subscribers.
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}
