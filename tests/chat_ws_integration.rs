//! The `/api/chat` WebSocket against a real listener and a mock inference
//! server.
//!
//! Run with:
//!   cargo test --test chat_ws_integration

mod support;

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use sandchat::core::schemas::{ChatMessage, MessageType};
use sandchat::server::state::AppState;
use sandchat::server::{build_state, router};
use sandchat::tape::store::Role;
use support::builders::test_config;
use support::sse::token_stream;
use tempfile::TempDir;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const FRAME_TIMEOUT: Duration = Duration::from_secs(5);

async fn serve(state: AppState) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router::build(state);
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn connect(addr: SocketAddr, user: &str) -> Client {
    let mut request = format!("ws://{addr}/api/chat").into_client_request().unwrap();
    request
        .headers_mut()
        .insert("X-Forwarded-User", HeaderValue::from_str(user).unwrap());
    let (ws, _) = tokio_tungstenite::connect_async(request).await.unwrap();
    ws
}

async fn next_message(ws: &mut Client) -> ChatMessage {
    loop {
        let frame = tokio::time::timeout(FRAME_TIMEOUT, ws.next())
            .await
            .expect("frame in time")
            .expect("socket open")
            .unwrap();
        match frame {
            Message::Text(text) => return serde_json::from_str(&text).unwrap(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

#[tokio::test]
async fn invalid_frame_then_streamed_answer() {
    let mut server = mockito::Server::new_async().await;
    let mock = server
        .mock("POST", "/generate_stream")
        .with_status(200)
        .with_header("content-type", "text/event-stream")
        .with_body(token_stream(&["Hello", " there"]))
        .expect(1)
        .create_async()
        .await;

    let dir = TempDir::new().unwrap();
    let state = build_state(test_config(&server.url(), dir.path())).unwrap();
    let conv = state.conversations().create(Some("alice"), None).await.unwrap();
    let addr = serve(state.clone()).await;
    let mut ws = connect(addr, "alice").await;

    ws.send(Message::Text("not json".to_string())).await.unwrap();
    let error = next_message(&mut ws).await;
    assert_eq!(error.kind, MessageType::Error);
    assert!(
        error
            .content
            .as_text()
            .is_some_and(|t| t.starts_with("invalid message:"))
    );

    let message = ChatMessage::new(&conv.id, "alice", "hi", MessageType::Text);
    ws.send(Message::Text(serde_json::to_string(&message).unwrap()))
        .await
        .unwrap();

    let mut events = Vec::new();
    loop {
        let event = next_message(&mut ws).await;
        let done = event.kind == MessageType::StreamEnd;
        events.push(event);
        if done {
            break;
        }
    }
    let kinds: Vec<MessageType> = events.iter().map(|e| e.kind).collect();
    assert_eq!(
        kinds,
        vec![
            MessageType::StreamStart,
            MessageType::StreamText,
            MessageType::StreamText,
            MessageType::StreamEnd,
        ]
    );
    let text: String = events
        .iter()
        .filter(|e| e.kind == MessageType::StreamText)
        .filter_map(|e| e.content.as_text())
        .collect();
    assert_eq!(text, "Hello there");
    assert!(events.iter().all(|e| e.conversation == conv.id));
    mock.assert_async().await;

    // stream/end goes out before the reply is appended to the tape.
    let history = tokio::time::timeout(FRAME_TIMEOUT, async {
        loop {
            let history = state.history().session(Some("alice"), &conv.id).unwrap();
            if history.messages().len() >= 2 {
                return history;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
    .expect("reply recorded");
    let stored = history.messages();
    assert_eq!(stored.len(), 2);
    assert_eq!(stored[1].role, Role::Ai);
    assert_eq!(stored[1].text(), Some("Hello there"));
}

#[tokio::test]
async fn close_frame_ends_the_session() {
    let server = mockito::Server::new_async().await;
    let dir = TempDir::new().unwrap();
    let state = build_state(test_config(&server.url(), dir.path())).unwrap();
    let addr = serve(state).await;
    let mut ws = connect(addr, "alice").await;

    ws.send(Message::Close(None)).await.unwrap();

    let drained = tokio::time::timeout(FRAME_TIMEOUT, async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(_)) => continue,
                Ok(other) => panic!("unexpected frame after close: {other:?}"),
                Err(_) => break,
            }
        }
    })
    .await;
    assert!(drained.is_ok(), "server kept the session open after close");
}
