//! WebSocket connection handling.

use crate::relay;
use crate::state::AppState;
use anyhow::Result;
use axum::extract::ws::{Message, WebSocket};
use datachat_types::{WsClientMessage, WsServerMessage};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum size for inbound text messages (10KB)
const MAX_INPUT_SIZE: usize = 10 * 1024;

/// Outgoing event channel capacity per connection.
const OUTGOING_CAPACITY: usize = 32;

pub async fn handle_websocket(socket: WebSocket, state: Arc<AppState>) -> Result<()> {
    let (mut ws_tx, mut ws_rx) = socket.split();

    // All events for this connection funnel through one channel into one
    // writer task, which preserves per-turn emission order end to end.
    let (outgoing_tx, mut outgoing_rx) = tokio::sync::mpsc::channel::<WsServerMessage>(OUTGOING_CAPACITY);

    let send_task = tokio::spawn(async move {
        while let Some(msg) = outgoing_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    warn!(target: "datachat::ws", "Failed to serialize WebSocket message: {}", e);
                    continue;
                }
            };
            if let Err(e) = ws_tx.send(Message::Text(json.into())).await {
                debug!(
                    target: "datachat::ws",
                    "WebSocket send failed (client likely disconnected): {}",
                    e
                );
                break;
            }
        }
    });

    let state_clone = state.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            if let Message::Text(text) = msg {
                if text.len() > MAX_INPUT_SIZE {
                    warn!(
                        target: "datachat::ws",
                        "Inbound message too large ({} bytes), max {} bytes",
                        text.len(),
                        MAX_INPUT_SIZE
                    );
                    continue;
                }
                match serde_json::from_str::<WsClientMessage>(&text) {
                    Ok(WsClientMessage::SendMessage { session_id, text }) => {
                        // One logical turn per message; sequential within
                        // the connection.
                        relay::run_turn(&state_clone, &outgoing_tx, session_id, &text).await;
                    }
                    Err(e) => {
                        debug!(target: "datachat::ws", "Ignoring unparseable client message: {}", e);
                    }
                }
            }
        }
    });

    // Do not abort the receive side when the writer dies: an in-flight turn
    // must be allowed to unwind so partial assistant text gets persisted.
    // The receive loop ends on its own once the socket reports disconnect.
    let _ = tokio::join!(send_task, recv_task);

    Ok(())
}
