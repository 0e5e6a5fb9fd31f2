// Shared bootstrap and WebSocket helpers for the integration tests.
#![allow(dead_code)]

use futures::{SinkExt, StreamExt};
use std::{
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

// Several ticks at the default 600 ms interval.
const RECV_TIMEOUT: Duration = Duration::from_secs(5);

static SERVER_URL: OnceLock<String> = OnceLock::new();
static SERVER_READY: OnceLock<()> = OnceLock::new();

// Start the server once per test binary and return its base URL.
pub fn ensure_server() -> &'static str {
    SERVER_READY.get_or_init(|| {
        let published_url = Arc::new(OnceLock::<String>::new());
        let published_url_thread = Arc::clone(&published_url);
        // A dedicated thread and runtime so the server outlives each `#[tokio::test]` runtime.
        std::thread::spawn(move || {
            let runtime = tokio::runtime::Runtime::new().expect("test runtime");
            runtime.block_on(async move {
                let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
                    .await
                    .expect("bind ephemeral test port");
                let addr = listener.local_addr().expect("get local addr");
                let _ = published_url_thread.set(format!("http://{addr}"));
                action_server::run(listener).await.expect("server failed");
            });
        });
        wait_for_server_url_and_readiness(published_url);
    });

    SERVER_URL
        .get()
        .expect("server url should be initialized")
        .as_str()
}

fn wait_for_server_url_and_readiness(published_url: Arc<OnceLock<String>>) {
    let base_url = loop {
        if let Some(url) = published_url.get() {
            break url.clone();
        }
        std::thread::sleep(Duration::from_millis(10));
    };

    let _ = SERVER_URL.set(base_url.clone());

    let addr = base_url
        .strip_prefix("http://")
        .expect("base url should use http://");

    for _ in 0..100 {
        if std::net::TcpStream::connect(addr).is_ok() {
            return;
        }
        std::thread::sleep(Duration::from_millis(20));
    }

    panic!("server did not become ready in time");
}

pub async fn connect() -> WsStream {
    let base_url = ensure_server();
    let ws_url = format!("ws://{}/ws", base_url.trim_start_matches("http://"));
    let (ws, _response) = connect_async(ws_url).await.expect("websocket connect");
    ws
}

pub async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::text(value.to_string()))
        .await
        .expect("send text frame");
}

// Connect, send Join and consume the Identity reply.
pub async fn join(player_id: u64) -> WsStream {
    let mut ws = connect().await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "Join", "data": { "player_id": player_id } }),
    )
    .await;

    let identity = next_server_message(&mut ws).await;
    assert_eq!(identity["type"], "Identity");
    assert_eq!(identity["data"]["player_id"], player_id.to_string());
    ws
}

// Next text frame parsed as JSON, skipping keepalives.
pub async fn next_server_message(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("server message before timeout")
            .expect("stream still open")
            .expect("valid frame");
        match frame {
            Message::Text(text) => {
                return serde_json::from_str(text.as_str()).expect("server sends JSON");
            }
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

// Reads until a Close frame arrives and returns its code.
pub async fn next_close_code(ws: &mut WsStream) -> Option<u16> {
    loop {
        let frame = tokio::time::timeout(RECV_TIMEOUT, ws.next())
            .await
            .expect("close before timeout");
        match frame {
            Some(Ok(Message::Close(close))) => return close.map(|frame| u16::from(frame.code)),
            Some(Ok(_)) => continue,
            Some(Err(_)) | None => return None,
        }
    }
}
