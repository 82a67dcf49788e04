// Integration tests for the rusty-relay hub
// Drives a real TCP listener with tokio-tungstenite clients and validates
// connection lifecycle, echo, broadcast fan-out and timeout teardown.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use rusty_relay::{CloseCode, Hub, HubConfig};

type Client = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

// Bind a listener and feed every inbound stream to the hub
async fn serve(hub: Hub) -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let _ = hub.accept(stream).await;
        }
    });

    addr
}

async fn client(addr: SocketAddr) -> Client {
    let (socket, _response) = connect_async(format!("ws://{}/", addr)).await.unwrap();
    socket
}

// Poll until the hub sees the expected number of registered connections
async fn wait_for_count(hub: &Hub, expected: usize) {
    for _ in 0..200 {
        if hub.connection_count() == expected {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "hub never reached {} connections (currently {})",
        expected,
        hub.connection_count()
    );
}

// Read frames until a data frame arrives, skipping pings and pongs
async fn next_payload(client: &mut Client) -> Vec<u8> {
    loop {
        let frame = timeout(Duration::from_secs(5), client.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended unexpectedly")
            .expect("read error");

        match frame {
            WsMessage::Text(text) => return text.into_bytes(),
            WsMessage::Binary(bytes) => return bytes,
            _ => {}
        }
    }
}

#[tokio::test]
async fn test_echo_round_trip() {
    init_logging();

    let hub = Hub::default();
    hub.on_message(|conn, msg| {
        let _ = conn.send(msg.into_bytes());
    })
    .unwrap();

    let addr = serve(hub.clone()).await;
    let mut client = client(addr).await;

    client
        .send(WsMessage::Text("ping".to_string()))
        .await
        .unwrap();

    assert_eq!(next_payload(&mut client).await, b"ping");
}

#[tokio::test]
async fn test_hub_to_hub_echo_and_close() {
    init_logging();

    let server = Hub::default();
    server
        .on_message(|conn, msg| {
            let _ = conn.send(msg.into_bytes());
        })
        .unwrap();
    let addr = serve(server.clone()).await;

    let client_hub = Hub::default();
    let (msg_tx, mut msg_rx) = tokio::sync::mpsc::unbounded_channel();
    client_hub
        .on_message(move |_, msg| {
            let _ = msg_tx.send(msg);
        })
        .unwrap();
    let (close_tx, mut close_rx) = tokio::sync::mpsc::unbounded_channel();
    client_hub
        .on_close(move |_, code| {
            let _ = close_tx.send(code);
        })
        .unwrap();

    let conn = client_hub.connect(&format!("ws://{}/", addr)).await.unwrap();
    conn.send_text("ping").unwrap();

    let echoed = timeout(Duration::from_secs(5), msg_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(echoed.as_bytes(), b"ping");

    conn.close();
    let code = timeout(Duration::from_secs(5), close_rx.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(code, CloseCode::Normal);
    assert_eq!(client_hub.connection_count(), 0);
}

#[tokio::test]
async fn test_broadcast_reaches_all_but_departed_clients() {
    init_logging();

    let hub = Hub::default();
    let addr = serve(hub.clone()).await;

    let mut staying = Vec::new();
    for _ in 0..3 {
        staying.push(client(addr).await);
    }
    let mut departed = client(addr).await;
    wait_for_count(&hub, 4).await;

    departed.send(WsMessage::Close(None)).await.unwrap();
    wait_for_count(&hub, 3).await;

    hub.broadcast(b"hello".to_vec());

    for client in &mut staying {
        assert_eq!(next_payload(client).await, b"hello");
    }
    assert_eq!(hub.connection_count(), 3);

    // The departed client observes only the tail of the close handshake
    loop {
        match timeout(Duration::from_millis(500), departed.next()).await {
            Ok(Some(Ok(frame))) => {
                assert!(
                    !matches!(&frame, WsMessage::Binary(bytes) if bytes == b"hello"),
                    "departed client received a broadcast"
                );
            }
            _ => break,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct ChatLine {
    nickname: String,
    content: String,
}

#[tokio::test]
async fn test_broadcast_json_round_trip() {
    init_logging();

    let hub = Hub::default();
    let addr = serve(hub.clone()).await;
    let mut client = client(addr).await;
    wait_for_count(&hub, 1).await;

    let sent = ChatLine {
        nickname: "ferris".to_string(),
        content: "hello".to_string(),
    };
    hub.broadcast_json(&sent).unwrap();

    let payload = next_payload(&mut client).await;
    let received: ChatLine = serde_json::from_slice(&payload).unwrap();
    assert_eq!(received, sent);
}

#[tokio::test]
async fn test_silent_peer_is_torn_down_within_read_timeout() {
    init_logging();

    let hub = Hub::new(HubConfig {
        read_timeout: Duration::from_millis(300),
        ..HubConfig::default()
    });
    let addr = serve(hub.clone()).await;

    let _client = client(addr).await;
    wait_for_count(&hub, 1).await;

    // The client never writes; the read deadline alone drives teardown
    let torn_down = async {
        while hub.connection_count() != 0 {
            sleep(Duration::from_millis(20)).await;
        }
    };
    timeout(Duration::from_secs(2), torn_down)
        .await
        .expect("connection outlived its read timeout");
}

#[tokio::test]
async fn test_normalization_of_inbound_frames() {
    init_logging();

    let hub = Hub::default();
    hub.on_message(|conn, msg| {
        let _ = conn.send(msg.into_bytes());
    })
    .unwrap();
    let addr = serve(hub.clone()).await;
    let mut client = client(addr).await;

    client
        .send(WsMessage::Text("  line one\nline two  ".to_string()))
        .await
        .unwrap();

    assert_eq!(next_payload(&mut client).await, b"line one line two");
}
