//! Bingo Battles binary entrypoint wiring REST, WebSocket, SSE and the session store.

use std::{env, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use bingo_battles_back::{
    config::AppConfig,
    dao::session_store::{SessionStore, memory::MemorySessionStore},
    routes,
    services::{presence_service, queue_service, session_service, storage_supervisor},
    state::{AppState, SharedState},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let app_state = AppState::new(config);

    spawn_storage_supervisor(app_state.clone());
    tokio::spawn(queue_service::run_cleanup(app_state.clone()));
    tokio::spawn(presence_service::run_sweeper(app_state.clone()));
    tokio::spawn(session_service::run_join_limiter_pruner(app_state.clone()));

    // Build the HTTP router once the shared state is ready.
    let app = build_router(app_state);

    let port = env::var("PORT")
        .or_else(|_| env::var("SERVER_PORT"))
        .ok()
        .and_then(|value| value.parse::<u16>().ok())
        .unwrap_or(8080);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(%addr, "starting server");

    let listener = TcpListener::bind(addr).await.context("binding server")?;
    let service = app.into_make_service();
    axum::serve(listener, service)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving axum")?;

    Ok(())
}

/// Pick the storage backend and hand it to the supervisor, which keeps the
/// state in degraded mode until a connection succeeds.
fn spawn_storage_supervisor(state: SharedState) {
    #[cfg(feature = "rest-store")]
    let Some(state) = spawn_rest_supervisor(state) else {
        return;
    };

    info!("using the in-memory session store");
    let store = MemorySessionStore::new();
    tokio::spawn(storage_supervisor::run(state, move || {
        let store = store.clone();
        async move { Ok(Arc::new(store) as Arc<dyn SessionStore>) }
    }));
}

/// Supervise a PostgREST store when `SUPABASE_URL` is set. Hands the state
/// back when the in-memory store should be used instead.
#[cfg(feature = "rest-store")]
fn spawn_rest_supervisor(state: SharedState) -> Option<SharedState> {
    use bingo_battles_back::dao::{
        session_store::postgrest::{PostgrestConfig, PostgrestSessionStore},
        storage::StorageError,
    };

    if env::var("SUPABASE_URL").is_err() {
        return Some(state);
    }

    match PostgrestConfig::from_env() {
        Ok(config) => {
            info!(url = %config.base_url, "using the PostgREST session store");
            tokio::spawn(storage_supervisor::run(state, move || {
                let config = config.clone();
                async move {
                    let store = PostgrestSessionStore::connect(config)
                        .await
                        .map_err(StorageError::from)?;
                    Ok(Arc::new(store) as Arc<dyn SessionStore>)
                }
            }));
            None
        }
        Err(err) => {
            warn!(error = %err, "invalid PostgREST configuration; falling back to memory");
            Some(state)
        }
    }
}

/// Build the top-level router and attach cross-cutting middleware layers.
fn build_router(state: SharedState) -> Router<()> {
    routes::router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=debug".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the server down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(err) => {
                warn!(error = %err, "could not install SIGTERM handler; waiting for Ctrl+C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
