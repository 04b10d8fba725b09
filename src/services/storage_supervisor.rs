//! Keeps a session store installed and tells lobby listeners when storage
//! goes away or comes back.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::{
    dao::{session_store::SessionStore, storage::StorageError},
    services::sse_events,
    state::SharedState,
};

/// Timings of the supervision loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupervisorPolicy {
    /// Wait after the first failed connection.
    pub initial_delay: Duration,
    /// Cap of the doubling wait between connections and reconnects.
    pub max_delay: Duration,
    /// Period of the health probe while a store is installed.
    pub health_interval: Duration,
    /// Reconnects tried on an installed store before connecting from scratch.
    pub reconnect_attempts: u32,
}

impl Default for SupervisorPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
            health_interval: Duration::from_secs(5),
            reconnect_attempts: 3,
        }
    }
}

impl SupervisorPolicy {
    fn next_delay(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_delay)
    }
}

/// Supervise the store produced by `connect` with the default timings.
pub async fn run<F, Fut>(state: SharedState, connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    run_with(state, SupervisorPolicy::default(), connect).await
}

/// Connect, install the store, then probe it until it is lost for good and
/// start over. Sessions answer 503 while no store is installed.
pub async fn run_with<F, Fut>(state: SharedState, policy: SupervisorPolicy, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn SessionStore>, StorageError>> + Send,
{
    let mut delay = policy.initial_delay;

    loop {
        match connect().await {
            Ok(store) => {
                install(&state, store.clone()).await;
                delay = policy.initial_delay;
                watch(&state, store.as_ref(), &policy).await;
                warn!(
                    backend = store.backend_name(),
                    "session store lost; connecting again"
                );
            }
            Err(err) => warn!(error = %err, ?delay, "session store connection failed"),
        }

        sleep(delay).await;
        delay = policy.next_delay(delay);
    }
}

async fn install(state: &SharedState, store: Arc<dyn SessionStore>) {
    let backend = store.backend_name();
    let was_degraded = state.is_degraded().await;
    state.set_session_store(store).await;
    info!(backend, "session store installed");
    if was_degraded {
        sse_events::broadcast_system_status(state, false);
    }
}

/// Probe `store` until reconnecting fails `reconnect_attempts` times in a row.
async fn watch(state: &SharedState, store: &dyn SessionStore, policy: &SupervisorPolicy) {
    let backend = store.backend_name();
    loop {
        sleep(policy.health_interval).await;
        match store.health_check().await {
            Ok(()) => set_degraded(state, backend, false).await,
            Err(err) => {
                warn!(backend, error = %err, "session store health check failed");
                set_degraded(state, backend, true).await;
                if !recover(store, policy).await {
                    return;
                }
                set_degraded(state, backend, false).await;
            }
        }
    }
}

async fn recover(store: &dyn SessionStore, policy: &SupervisorPolicy) -> bool {
    let backend = store.backend_name();
    let mut delay = policy.initial_delay;
    for attempt in 1..=policy.reconnect_attempts {
        match store.try_reconnect().await {
            Ok(()) => {
                info!(backend, attempt, "session store reconnected");
                return true;
            }
            Err(err) => {
                warn!(backend, attempt, error = %err, "session store reconnect failed");
                sleep(delay).await;
                delay = policy.next_delay(delay);
            }
        }
    }
    false
}

/// Flip the degraded flag and publish `system.status` only on an actual change.
async fn set_degraded(state: &SharedState, backend: &str, degraded: bool) {
    if state.is_degraded().await == degraded {
        return;
    }
    state.update_degraded(degraded).await;
    if degraded {
        warn!(backend, "entering degraded mode");
    } else {
        info!(backend, "leaving degraded mode");
    }
    debug!(degraded, "publishing system status");
    sse_events::broadcast_system_status(state, degraded);
}
