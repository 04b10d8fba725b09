use std::{convert::Infallible, time::Duration};

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::Stream;
use tokio::sync::{
    broadcast::{self, error::RecvError},
    mpsc,
};
use tokio_stream::wrappers::ReceiverStream;
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::sse::{Handshake, ServerEvent},
    error::ServiceError,
    services::presence_service,
    state::SharedState,
};

const HANDSHAKE_EVENT: &str = "handshake";

/// Identifies the target SSE stream so we can perform stream-specific
/// bookkeeping when the connection is torn down.
#[derive(Clone)]
pub enum StreamKind {
    Lobby,
    /// Carries the state so the session channel can be released on teardown.
    Session(SharedState, Uuid),
}

/// Subscribe to the lobby stream (session creations and status changes).
pub async fn subscribe_lobby(
    state: &SharedState,
) -> (broadcast::Receiver<ServerEvent>, Option<ServerEvent>) {
    let receiver = state.sse().lobby().subscribe();
    let handshake = handshake(
        "lobby",
        "subscribed to session list updates",
        state.is_degraded().await,
    );
    (receiver, handshake)
}

/// Subscribe to the realtime stream of one existing session.
pub async fn subscribe_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<(broadcast::Receiver<ServerEvent>, Option<ServerEvent>), ServiceError> {
    presence_service::ensure_session(state, session_id).await?;
    let receiver = state.sse().subscribe_session(session_id);
    let handshake = handshake(
        &format!("session:{session_id}"),
        "subscribed to session events",
        state.is_degraded().await,
    );
    Ok((receiver, handshake))
}

fn handshake(stream: &str, message: &str, degraded: bool) -> Option<ServerEvent> {
    let payload = Handshake {
        stream: stream.to_string(),
        message: message.to_string(),
        degraded,
    };
    match ServerEvent::json(Some(HANDSHAKE_EVENT.to_string()), &payload) {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to serialize handshake");
            None
        }
    }
}

fn to_event(payload: ServerEvent) -> Event {
    let mut event = Event::default().data(payload.data);
    if let Some(name) = payload.event {
        event = event.event(name);
    }
    event
}

/// Convert a broadcast receiver into an SSE response, forwarding events and
/// cleaning up once the client disconnects.
pub fn to_sse_stream(
    mut receiver: broadcast::Receiver<ServerEvent>,
    first: Option<ServerEvent>,
    kind: StreamKind,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    // small bounded channel between forwarder and response
    let (tx, rx) = mpsc::channel::<Result<Event, Infallible>>(8);

    tokio::spawn(async move {
        let greeted = match first {
            Some(handshake) => tx.send(Ok(to_event(handshake))).await.is_ok(),
            None => true,
        };

        while greeted {
            tokio::select! {
                _ = tx.closed() => break,
                recv_result = receiver.recv() => {
                    match recv_result {
                        Ok(payload) => {
                            if tx.send(Ok(to_event(payload))).await.is_err() {
                                break;
                            }
                        }
                        Err(RecvError::Closed) => break,
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "SSE subscriber lagged behind");
                            continue;
                        }
                    }
                }
            }
        }

        match kind {
            StreamKind::Lobby => info!("Lobby SSE stream disconnected"),
            StreamKind::Session(state, session_id) => {
                drop(receiver);
                state.sse().release_session(session_id);
                info!(%session_id, "Session SSE stream disconnected");
            }
        }
    });

    // response stream reads from mpsc; when client disconnects axum drops this stream
    let stream = ReceiverStream::new(rx);
    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("keep-alive"),
    )
}
