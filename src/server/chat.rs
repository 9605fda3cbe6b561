//! WebSocket chat channel.
//!
//! Each text frame from the browser is a `ChatMessage`. Messages are handled
//! one at a time per connection; everything the agent loop emits is written
//! back as a JSON text frame.

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::http::HeaderMap;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::identity::caller;
use super::state::AppState;
use crate::core::schemas::ChatMessage;
use crate::core::utils::{new_id, safe_truncate};

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let user = caller(&state, &headers);
    ws.on_upgrade(move |socket| handle_socket(socket, user, state))
}

async fn handle_socket(socket: WebSocket, user: Option<String>, state: AppState) {
    let connection = new_id();
    info!(connection = %connection, user = ?user, "chat.connected");

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ChatMessage>();

    let send_connection = connection.clone();
    let send_task = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(error = %e, "chat.encode_failed");
                    continue;
                }
            };
            if ws_sender.send(Message::Text(frame)).await.is_err() {
                debug!(connection = %send_connection, "chat.send_failed");
                break;
            }
        }
    });

    let agent = state.agent.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(frame)) = ws_receiver.next().await {
            match frame {
                Message::Text(text) => match serde_json::from_str::<ChatMessage>(&text) {
                    Ok(message) => {
                        agent.handle_message(user.as_deref(), message, &tx).await;
                    }
                    Err(e) => {
                        warn!(
                            error = %e,
                            raw = %safe_truncate(&text, 200),
                            "chat.invalid_message"
                        );
                        let _ = tx.send(ChatMessage::error("", format!("invalid message: {e}")));
                    }
                },
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = send_task => {}
        _ = recv_task => {}
    }

    info!(connection = %connection, "chat.disconnected");
}
