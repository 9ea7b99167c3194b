//! `/ws/chat` — live client connections.
//!
//! Each socket is split: a writer forwards frames from the connection's
//! broadcaster queue, a reader turns incoming text into outbound signals.
//! Whichever side ends first ends the session. When the broadcaster drops a
//! slow or dead client its queue closes, which ends the writer.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::{SinkExt, StreamExt};

use lanlink_core::SystemNotice;
use lanlink_services::OutboundSignal;

use crate::ApiState;

pub async fn handle_ws(ws: WebSocketUpgrade, State(state): State<ApiState>) -> Response {
    ws.on_upgrade(move |socket| client_session(socket, state))
}

async fn client_session(socket: WebSocket, state: ApiState) {
    let greeting = SystemNotice::now(format!("connected to {}", state.node_id));
    let (id, mut frames) = state.clients.connect(state.queue_depth, Some(greeting));
    tracing::info!(connection = id, "client connected");

    let (mut ws_tx, mut ws_rx) = socket.split();

    let writer = async {
        while let Some(frame) = frames.recv().await {
            if ws_tx.send(Message::Text(frame.to_string().into())).await.is_err() {
                break;
            }
        }
    };

    let reader = async {
        while let Some(msg) = ws_rx.next().await {
            match msg {
                Ok(Message::Text(text)) => {
                    let signal = OutboundSignal::ClientText(text.as_str().to_owned());
                    if state.outbound.send(signal).is_err() {
                        tracing::warn!(connection = id, "sender gone, dropping client text");
                    }
                }
                Ok(Message::Close(_)) => break,
                Ok(_) => {}
                Err(e) => {
                    tracing::debug!(connection = id, error = %e, "client read failed");
                    break;
                }
            }
        }
    };

    tokio::select! {
        _ = writer => {}
        _ = reader => {}
    }

    state.clients.disconnect(id);
    tracing::info!(connection = id, "client disconnected");
}
