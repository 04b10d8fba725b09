pub mod board;
pub mod game;
pub mod presence;
pub mod queue;
pub mod rate_limit;
mod sse;
pub mod state_machine;
pub mod win;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{config::AppConfig, dao::session_store::SessionStore, error::ServiceError};

pub use self::sse::{SseHub, SseState};
use self::{presence::PresenceTracker, rate_limit::JoinRateLimiter};

pub type SharedState = Arc<AppState>;

const LOBBY_SSE_CAPACITY: usize = 64;
const SESSION_SSE_CAPACITY: usize = 128;

/// Central application state: configuration, storage handle and realtime registries.
pub struct AppState {
    config: AppConfig,
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    sse: SseState,
    presence: PresenceTracker,
    join_limiter: JoinRateLimiter,
    degraded: watch::Sender<bool>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig) -> SharedState {
        Arc::new(Self::build(config, None))
    }

    /// Construct a state with a storage backend already installed.
    pub fn with_store(config: AppConfig, store: Arc<dyn SessionStore>) -> SharedState {
        Arc::new(Self::build(config, Some(store)))
    }

    fn build(config: AppConfig, store: Option<Arc<dyn SessionStore>>) -> Self {
        let (degraded_tx, _rx) = watch::channel(store.is_none());
        let join_limiter = JoinRateLimiter::new(
            config.join_rate_limit.max_attempts,
            config.join_rate_limit.window,
        );
        Self {
            config,
            session_store: RwLock::new(store),
            sse: SseState::new(LOBBY_SSE_CAPACITY, SESSION_SSE_CAPACITY),
            presence: PresenceTracker::new(),
            join_limiter,
            degraded: degraded_tx,
        }
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Obtain the current session store or fail when running degraded.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned().ok_or(ServiceError::Degraded)
    }

    /// Install a session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false).await;
    }

    /// Current degraded flag.
    pub async fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub async fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Broadcast hubs for the lobby and per-session streams.
    pub fn sse(&self) -> &SseState {
        &self.sse
    }

    /// Presence registry of connected clients.
    pub fn presence(&self) -> &PresenceTracker {
        &self.presence
    }

    /// Sliding-window limiter applied to join attempts.
    pub fn join_limiter(&self) -> &JoinRateLimiter {
        &self.join_limiter
    }
}
