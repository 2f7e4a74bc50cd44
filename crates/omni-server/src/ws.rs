use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::Mutex;

use omni_types::Envelope;
use omni_wire::EventSink;

use crate::state::AppState;

/// `GET /ws` upgrade target on the message-channel port. Each connection
/// gets its own server-generated session id passed through to
/// [`omni_wire::WireHandler::handle`]; on disconnect the session's
/// cancellation state is torn down.
pub async fn ws_upgrade(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_stream(socket, state))
}

/// [`EventSink`] that serializes envelopes directly onto the socket's
/// sink half. Wrapped in a `Mutex` since `axum`'s `WebSocket` only splits
/// into a single-owner sink/stream pair and `WireHandler::handle` borrows
/// the sink for the whole request.
struct SocketSink {
    sink: Mutex<futures::stream::SplitSink<WebSocket, WsMessage>>,
}

#[async_trait::async_trait]
impl EventSink for SocketSink {
    async fn send(&self, envelope: Envelope) {
        let Ok(payload) = serde_json::to_string(&envelope) else { return };
        let _ = self.sink.lock().await.send(WsMessage::Text(payload.into())).await;
    }
}

async fn ws_stream(socket: WebSocket, state: AppState) {
    let session_id = uuid::Uuid::new_v4().to_string();
    let (sink, mut stream) = socket.split();
    let sink = SocketSink { sink: Mutex::new(sink) };

    while let Some(Ok(message)) = stream.next().await {
        let WsMessage::Text(text) = message else { continue };
        match serde_json::from_str::<Envelope>(&text) {
            Ok(envelope) => state.wire.handle(&session_id, envelope, &sink).await,
            Err(_) => {
                sink.send(Envelope::error(None, "malformed envelope", Some("bad_request"))).await;
            }
        }
    }

    state.wire.disconnect(&session_id);
}
