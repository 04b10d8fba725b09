use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{
    sync::{broadcast::error::RecvError, mpsc},
    task::JoinHandle,
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dto::{
        sse::ServerEvent,
        ws::{PresenceAck, PresenceInboundMessage, WsEnvelope},
    },
    services::presence_service,
    state::SharedState,
};

const ACK_EVENT: &str = "presence.ack";

/// Handle the full lifecycle of a presence WebSocket for one session.
///
/// The first frame must be a `track` message. Session events are relayed to
/// the client as `{ "event", "data" }` envelopes until either side closes.
pub async fn handle_socket(state: SharedState, session_id: Uuid, socket: WebSocket) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound messages flowing even while we await inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    let identify_timeout = state.config().presence.identify_timeout;
    let initial_message = match tokio::time::timeout(identify_timeout, receiver.next()).await {
        Ok(Some(Ok(Message::Text(text)))) => text,
        Ok(Some(Ok(Message::Close(_)))) => {
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Ok(_))) => {
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(Some(Err(err))) => {
            warn!(%session_id, error = %err, "websocket receive error");
            finalize(writer_task, outbound_tx).await;
            return;
        }
        Ok(None) | Err(_) => {
            warn!(%session_id, "presence track timed out");
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    let (user_id, status) = match serde_json::from_str::<PresenceInboundMessage>(&initial_message)
    {
        Ok(message) => match message.track_request() {
            Some((user_id, status)) if !user_id.trim().is_empty() => (user_id.to_string(), status),
            _ => {
                warn!(%session_id, "first presence message was not a track request");
                let _ = outbound_tx.send(Message::Close(None));
                finalize(writer_task, outbound_tx).await;
                return;
            }
        },
        Err(err) => {
            warn!(%session_id, error = %err, "failed to parse presence message");
            let _ = outbound_tx.send(Message::Close(None));
            finalize(writer_task, outbound_tx).await;
            return;
        }
    };

    // Subscribe before tracking so the client sees its own join.
    let mut events = state.sse().subscribe_session(session_id);
    let conn_id = Uuid::new_v4();
    let presence = presence_service::track(&state, session_id, &user_id, status, conn_id);
    send_json(
        &outbound_tx,
        ACK_EVENT,
        &PresenceAck {
            user_id: user_id.clone(),
            status: presence.status,
        },
    );

    loop {
        tokio::select! {
            inbound = receiver.next() => {
                let Some(inbound) = inbound else { break };
                match inbound {
                    Ok(Message::Text(text)) => {
                        match serde_json::from_str::<PresenceInboundMessage>(&text) {
                            Ok(PresenceInboundMessage::Status { status }) => {
                                presence_service::update_status(&state, session_id, &user_id, conn_id, status);
                            }
                            Ok(PresenceInboundMessage::Heartbeat) => {
                                if !presence_service::heartbeat(&state, session_id, &user_id, conn_id) {
                                    debug!(%session_id, %user_id, "heartbeat for a replaced connection");
                                    break;
                                }
                            }
                            Ok(PresenceInboundMessage::Track { .. }) => {
                                warn!(%session_id, %user_id, "ignoring duplicate track message");
                            }
                            Ok(PresenceInboundMessage::Unknown) => {
                                debug!(%session_id, %user_id, "ignoring unknown presence message");
                            }
                            Err(err) => {
                                warn!(%session_id, %user_id, error = %err, "failed to parse presence message");
                            }
                        }
                    }
                    Ok(Message::Ping(payload)) => {
                        let _ = outbound_tx.send(Message::Pong(payload));
                    }
                    Ok(Message::Close(frame)) => {
                        let _ = outbound_tx.send(Message::Close(frame));
                        break;
                    }
                    Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
                    Err(err) => {
                        warn!(%session_id, %user_id, error = %err, "websocket error");
                        break;
                    }
                }
            }
            event = events.recv() => {
                match event {
                    Ok(event) => {
                        if relay(&outbound_tx, event).is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%session_id, %user_id, skipped, "presence socket lagged behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    }

    drop(events);
    presence_service::untrack(&state, session_id, &user_id, conn_id);
    info!(%session_id, %user_id, "presence socket closed");

    finalize(writer_task, outbound_tx).await;
}

/// Wrap a broadcast event into an envelope frame. Fails once the writer is gone.
fn relay(tx: &mpsc::UnboundedSender<Message>, event: ServerEvent) -> Result<(), ()> {
    let data = serde_json::from_str(&event.data).unwrap_or(serde_json::Value::String(event.data));
    let envelope = WsEnvelope {
        event: event.event.unwrap_or_else(|| "message".to_string()),
        data,
    };
    match serde_json::to_string(&envelope) {
        Ok(payload) => tx.send(Message::Text(payload.into())).map_err(|_| ()),
        Err(err) => {
            warn!(error = %err, "failed to serialize websocket envelope");
            Ok(())
        }
    }
}

fn send_json<T: serde::Serialize>(tx: &mpsc::UnboundedSender<Message>, event: &str, payload: &T) {
    match serde_json::to_value(payload) {
        Ok(data) => {
            let envelope = WsEnvelope {
                event: event.to_string(),
                data,
            };
            if let Ok(text) = serde_json::to_string(&envelope) {
                let _ = tx.send(Message::Text(text.into()));
            }
        }
        Err(err) => warn!(event, error = %err, "failed to serialize websocket payload"),
    }
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
