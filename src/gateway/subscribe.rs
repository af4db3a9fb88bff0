//! `SubscribeToChanges` over a WebSocket: one JSON text frame per notice.

use super::AppState;
use crate::auth::Identity;
use crate::sync::{serve_subscription, ChangeNotice, EventWriter, SinkError};
use async_trait::async_trait;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use axum::Extension;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};

/// GET /rpc/SubscribeToChanges: WebSocket upgrade. Identity is fixed for
/// the lifetime of the socket.
pub async fn subscribe(
    State(state): State<AppState>,
    Extension(identity): Extension<Identity>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| serve_socket(state, identity, socket))
}

struct SocketWriter(SplitSink<WebSocket, Message>);

#[async_trait]
impl EventWriter for SocketWriter {
    async fn write(&mut self, notice: &ChangeNotice) -> Result<(), SinkError> {
        let text = serde_json::to_string(notice).map_err(|_| SinkError::Closed)?;
        self.0
            .send(Message::Text(text.into()))
            .await
            .map_err(|_| SinkError::Closed)
    }
}

async fn serve_socket(state: AppState, identity: Identity, socket: WebSocket) {
    let (sender, mut receiver) = socket.split();

    // Inbound frames are ignored; the stream ending means the client left.
    let closed = async move {
        while let Some(Ok(msg)) = receiver.next().await {
            if matches!(msg, Message::Close(_)) {
                break;
            }
        }
    };

    serve_subscription(
        &state.notifier,
        &identity.user_id,
        &identity.session_id,
        SocketWriter(sender),
        closed,
        state.shutdown.clone(),
    )
    .await;
}
