//! WebSocket handler for chat connections.
//!
//! The origin gate runs as a route layer before this handler, so by the
//! time `chat_ws_handler` runs the connection is past `Connecting`. It is
//! `Open` (registered) for exactly as long as the socket task holds its
//! [`OpenConnection`] guard, and `Closed` once the guard drops.

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::events::{self, ChatEvent};
use super::registry::{Connection, ConnectionId, ConnectionRegistry};
use crate::AppState;

/// Chat WebSocket upgrade.
pub async fn chat_ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_chat_socket(socket, state))
}

/// Registry membership tied to the socket task's lifetime.
struct OpenConnection {
    registry: Arc<ConnectionRegistry>,
    connection: Connection,
}

impl OpenConnection {
    fn open(registry: Arc<ConnectionRegistry>, connection: Connection) -> Self {
        registry.register(connection.clone());
        Self {
            registry,
            connection,
        }
    }

    fn id(&self) -> ConnectionId {
        self.connection.id
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.registry.unregister(&self.connection);
    }
}

async fn handle_chat_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut ws_sender, ws_receiver) = socket.split();

    // Create an mpsc channel so the relay can push frames from any task
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

    // Forward channel → WebSocket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let closing = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || closing {
                break;
            }
        }
    });

    let open = OpenConnection::open(
        state.registry.clone(),
        Connection::new(Uuid::new_v4(), tx),
    );
    let id = open.id();
    tracing::info!(%id, "Chat WebSocket connected");

    let mut inbound = std::pin::pin!(events::inbound(ws_receiver));
    while let Some(event) = inbound.next().await {
        match event {
            ChatEvent::Message(message) => {
                tracing::debug!(%id, name = %message.name, "Chat message received");
                state.relay.relay(&message, Some(id));
            }
        }
    }

    // Cleanup
    drop(open);
    send_task.abort();
    tracing::info!(%id, "Chat WebSocket disconnected");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures_util::{SinkExt, StreamExt};
    use serde_json::{json, Value};
    use tokio::time::timeout;
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;
    use tokio_tungstenite::tungstenite::http::HeaderValue;
    use tokio_tungstenite::tungstenite::Message as WsMessage;
    use tower::ServiceExt;

    use crate::testing::{self, ORIGIN};

    const TIMEOUT: Duration = Duration::from_secs(5);

    type WsStream = tokio_tungstenite::WebSocketStream<
        tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
    >;

    async fn connect(
        url: &str,
        origin: &str,
    ) -> Result<WsStream, tokio_tungstenite::tungstenite::Error> {
        let mut request = url.into_client_request()?;
        request
            .headers_mut()
            .insert("origin", HeaderValue::from_str(origin).unwrap());
        let (stream, _) = tokio_tungstenite::connect_async(request).await?;
        Ok(stream)
    }

    async fn wait_for_open(state: &crate::AppState, count: usize) {
        timeout(TIMEOUT, async {
            while state.registry.len() != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .expect("registry never reached expected size");
    }

    async fn next_event(ws: &mut WsStream) -> Value {
        loop {
            let frame = timeout(TIMEOUT, ws.next())
                .await
                .expect("timed out waiting for frame")
                .expect("stream ended")
                .expect("transport error");
            if let WsMessage::Text(text) = frame {
                return serde_json::from_str(text.as_str()).unwrap();
            }
        }
    }

    fn chat(name: &str, message: &str) -> WsMessage {
        WsMessage::text(
            json!({"event": "message", "data": {"name": name, "message": message}}).to_string(),
        )
    }

    #[tokio::test]
    async fn message_is_echoed_to_sender_and_peers() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let mut a = connect(&url, ORIGIN).await.unwrap();
        let mut b = connect(&url, ORIGIN).await.unwrap();
        wait_for_open(&state, 2).await;

        a.send(chat("A", "hi")).await.unwrap();

        let expected = json!({"event": "message", "data": {"name": "A", "message": "hi"}});
        assert_eq!(next_event(&mut a).await, expected);
        assert_eq!(next_event(&mut b).await, expected);
    }

    #[tokio::test]
    async fn messages_from_one_sender_arrive_in_order() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let mut a = connect(&url, ORIGIN).await.unwrap();
        let mut b = connect(&url, ORIGIN).await.unwrap();
        wait_for_open(&state, 2).await;

        for body in ["one", "two", "three"] {
            a.send(chat("A", body)).await.unwrap();
        }

        for body in ["one", "two", "three"] {
            assert_eq!(next_event(&mut b).await["data"]["message"], body);
        }
    }

    #[tokio::test]
    async fn closed_connection_leaves_registry() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let mut a = connect(&url, ORIGIN).await.unwrap();
        let mut b = connect(&url, ORIGIN).await.unwrap();
        wait_for_open(&state, 2).await;

        b.close(None).await.unwrap();
        wait_for_open(&state, 1).await;

        a.send(chat("A", "still here")).await.unwrap();
        assert_eq!(next_event(&mut a).await["data"]["message"], "still here");
    }

    #[tokio::test]
    async fn ping_is_answered_with_pong() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let mut a = connect(&url, ORIGIN).await.unwrap();
        wait_for_open(&state, 1).await;

        a.send(WsMessage::Ping(b"hi".to_vec().into())).await.unwrap();

        loop {
            let frame = timeout(TIMEOUT, a.next())
                .await
                .expect("timed out waiting for pong")
                .expect("stream ended")
                .expect("transport error");
            if let WsMessage::Pong(payload) = frame {
                assert_eq!(&payload[..], b"hi");
                break;
            }
        }
        assert_eq!(state.registry.len(), 1);
    }

    #[tokio::test]
    async fn plain_get_without_upgrade_is_normalized() {
        let app = crate::build_router(testing::state());

        let response = app
            .oneshot(
                axum::extract::Request::builder()
                    .uri("/ws/chat")
                    .header("origin", ORIGIN)
                    .body(axum::body::Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert!(response.status().is_client_error());
        assert_eq!(response.headers()["access-control-allow-origin"], ORIGIN);
        let bytes = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert!(body["errors"].is_object());
    }

    #[tokio::test]
    async fn disallowed_origin_is_rejected_before_registration() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let result = connect(&url, "https://evil.example.com").await;
        assert!(result.is_err());
        assert!(state.registry.is_empty());
    }

    #[tokio::test]
    async fn registry_teardown_closes_clients() {
        let (addr, state) = testing::serve().await;
        let url = format!("ws://{addr}/ws/chat");

        let mut a = connect(&url, ORIGIN).await.unwrap();
        wait_for_open(&state, 1).await;

        assert_eq!(state.registry.close_all(), 1);

        let frame = timeout(TIMEOUT, a.next()).await.expect("timed out");
        assert!(matches!(frame, Some(Ok(WsMessage::Close(_))) | None));
    }
}
