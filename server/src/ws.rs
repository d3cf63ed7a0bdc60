//! Websocket event stream.
//!
//! Each connection owns one bus subscription. The first frame is the
//! synthetic hello (`{type:"hello", ts}`); after that the connection
//! streams every kernel event in publish order. Delivery is best-effort:
//! if this client's queue overflows, events are dropped for it alone.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;

use foreman_core::store::Store;

use crate::http::AppState;

pub async fn ws_handler<S: Store>(
    State(state): State<Arc<AppState<S>>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| stream_events(socket, state))
}

async fn stream_events<S: Store>(mut socket: WebSocket, state: Arc<AppState<S>>) {
    let mut subscription = state.coord.subscribe();
    tracing::debug!(subscriber = subscription.id, "websocket attached");

    loop {
        tokio::select! {
            event = subscription.rx.recv() => {
                let Some(event) = event else { break };
                let payload = match serde_json::to_string(&event) {
                    Ok(text) => text,
                    Err(err) => {
                        tracing::error!(%err, "failed to serialize event");
                        continue;
                    }
                };
                if socket.send(Message::Text(payload)).await.is_err() {
                    break;
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Clients have nothing to say; pings are answered by axum.
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    state.coord.unsubscribe(subscription.id);
    tracing::debug!(subscriber = subscription.id, "websocket detached");
}
