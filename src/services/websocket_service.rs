use axum::extract::ws::{Message, WebSocket};
use futures::{SinkExt, StreamExt};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    dto::ws::{ClientFrame, ServerFrame},
    error::ServiceError,
    services::battle_service,
    state::{SharedState, broadcast::UserChannel},
};

/// Handle the full lifecycle of one observer WebSocket connection.
///
/// The connection doubles as the user's realtime channel: battle events are
/// pushed through it by the broadcaster, and inbound frames let the user
/// manage subscriptions or submit rep counts on the same socket.
pub async fn handle_socket(state: SharedState, socket: WebSocket, user_id: Uuid) {
    let (mut sender, mut receiver) = socket.split();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Message>();

    // Dedicated writer task keeps outbound events flowing even while we await
    // inbound frames.
    let writer_task = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            if sender.send(message).await.is_err() {
                break;
            }
        }
    });

    state.broadcaster().register(UserChannel {
        user_id,
        tx: outbound_tx.clone(),
    });
    info!(%user_id, "observer connected");

    while let Some(message) = receiver.next().await {
        match message {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(frame) => handle_frame(&state, user_id, frame, &outbound_tx).await,
                Err(err) => {
                    warn!(%user_id, error = %err, "failed to parse observer frame");
                    send_frame(
                        &outbound_tx,
                        &ServerFrame::Error {
                            battle_id: None,
                            message: format!("malformed frame: {err}"),
                        },
                    );
                }
            },
            Ok(Message::Ping(payload)) => {
                let _ = outbound_tx.send(Message::Pong(payload));
            }
            Ok(Message::Close(frame)) => {
                info!(%user_id, "observer closed");
                let _ = outbound_tx.send(Message::Close(frame));
                break;
            }
            Ok(Message::Binary(_)) | Ok(Message::Pong(_)) => {}
            Err(err) => {
                warn!(%user_id, error = %err, "websocket error");
                break;
            }
        }
    }

    state.broadcaster().unregister(user_id);
    info!(%user_id, "observer disconnected");

    finalize(writer_task, outbound_tx).await;
}

async fn handle_frame(
    state: &SharedState,
    user_id: Uuid,
    frame: ClientFrame,
    outbound_tx: &mpsc::UnboundedSender<Message>,
) {
    match frame {
        ClientFrame::Subscribe { battle_id } => {
            match battle_service::authorize_observer(state, user_id, battle_id).await {
                Ok(()) => {
                    state.broadcaster().subscribe(battle_id, user_id);
                    send_frame(outbound_tx, &ServerFrame::Ack { battle_id });
                }
                Err(err) => send_rejection(outbound_tx, battle_id, err),
            }
        }
        ClientFrame::Unsubscribe { battle_id } => {
            state.broadcaster().unsubscribe(battle_id, user_id);
            send_frame(outbound_tx, &ServerFrame::Ack { battle_id });
        }
        ClientFrame::SubmitReps { battle_id, reps } => {
            match battle_service::update_reps(state, user_id, battle_id, reps).await {
                Ok(_) => send_frame(outbound_tx, &ServerFrame::Ack { battle_id }),
                Err(err) => send_rejection(outbound_tx, battle_id, err),
            }
        }
    }
}

fn send_rejection(tx: &mpsc::UnboundedSender<Message>, battle_id: Uuid, err: ServiceError) {
    send_frame(
        tx,
        &ServerFrame::Error {
            battle_id: Some(battle_id),
            message: err.to_string(),
        },
    );
}

/// Serialize a payload and push it onto the connection's writer channel.
///
/// Send failures are ignored here; the reader loop notices the closed socket
/// and tears the connection down.
fn send_frame<T>(tx: &mpsc::UnboundedSender<Message>, value: &T)
where
    T: ?Sized + serde::Serialize + std::fmt::Debug,
{
    let payload = match serde_json::to_string(value) {
        Ok(payload) => payload,
        Err(err) => {
            warn!(error = %err, "failed to serialize frame `{value:?}`");
            return;
        }
    };
    let _ = tx.send(Message::Text(payload.into()));
}

/// Ensure the writer task winds down before we return from the socket handler.
async fn finalize(writer_task: JoinHandle<()>, outbound_tx: mpsc::UnboundedSender<Message>) {
    drop(outbound_tx);
    let _ = writer_task.await;
}
