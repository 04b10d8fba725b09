use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report whether storage is reachable, logging connectivity issues.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    let backend = match state.require_session_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, backend = store.backend_name(), "storage health check failed");
            }
            Some(store.backend_name())
        }
        Err(_) => {
            warn!("storage unavailable (degraded mode)");
            None
        }
    };

    match backend {
        Some(name) if !state.is_degraded().await => HealthResponse::ok(name),
        _ => HealthResponse::degraded(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::AppConfig, dao::session_store::memory::MemorySessionStore, state::AppState,
    };

    #[tokio::test]
    async fn reports_backend_when_storage_is_installed() {
        let state = AppState::with_store(AppConfig::default(), Arc::new(MemorySessionStore::new()));
        let health = health_status(&state).await;
        assert_eq!(health.status, "ok");
        assert_eq!(health.storage.as_deref(), Some("memory"));
    }

    #[tokio::test]
    async fn reports_degraded_without_storage() {
        let state = AppState::new(AppConfig::default());
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert!(health.storage.is_none());
    }
}
