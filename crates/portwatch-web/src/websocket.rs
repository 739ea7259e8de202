//! WebSocket support
//!
//! `/ws/snapshot` streams the orchestrator's broadcast channel of
//! connection snapshots straight through to the client as JSON frames.

use crate::auth::AuthToken;
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};

pub async fn snapshot_stream(
    ws: WebSocketUpgrade,
    _auth: AuthToken,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_snapshot_socket(socket, state))
}

async fn handle_snapshot_socket(mut socket: WebSocket, state: AppState) {
    let mut rx = state.orchestrator.subscribe();
    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                let json = match serde_json::to_string(&snapshot) {
                    Ok(j) => j,
                    Err(e) => {
                        tracing::warn!("failed to serialize snapshot: {e}");
                        continue;
                    }
                };
                if socket.send(Message::Text(json)).await.is_err() {
                    break;
                }
            }
            Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!("snapshot subscriber lagged, skipped {skipped} frames");
                continue;
            }
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        }
    }
    tracing::debug!("snapshot websocket closed");
}
