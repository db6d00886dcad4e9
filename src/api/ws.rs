//! WebSocket endpoint: one reader task per live driver socket, with the
//! connection registry fanning messages back out.

use super::AppState;
use crate::auth::Identity;
use crate::connections::route_client_message;
use crate::models::ServerMessage;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
    Extension,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::debug;

pub async fn upgrade(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    Path(driver_id): Path<String>,
    ws: WebSocketUpgrade,
) -> Response {
    if !identity.can_act_for(&driver_id) {
        return (StatusCode::FORBIDDEN, "cannot open another driver's socket").into_response();
    }
    ws.on_upgrade(move |socket| handle_socket(socket, state, driver_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, driver_id: String) {
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();

    state.connections.connect(&driver_id, tx.clone());
    let _ = tx.send(ServerMessage::Connected {
        driver_id: driver_id.clone(),
        message: "Connected to fleet control".to_string(),
    });

    // Writer: registry messages -> socket frames.
    let writer = tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            let frame = match serde_json::to_string(&message) {
                Ok(json) => Message::Text(json),
                Err(_) => continue,
            };
            if sink.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Reader: route inbound frames until the client goes away. Handlers only
    // touch the store; heavy computation never runs here.
    while let Some(Ok(message)) = stream.next().await {
        match message {
            Message::Text(text) => {
                if let Some(reply) = route_client_message(&state.db, &driver_id, &text) {
                    state.connections.send(&driver_id, reply);
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }

    debug!("socket reader finished for driver {driver_id}");
    state.connections.disconnect_socket(&driver_id, &tx);
    drop(tx);
    let _ = writer.await;
}
