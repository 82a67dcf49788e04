//! Echo server: every message a client sends comes straight back to it.
//!
//! Run with `cargo run --example echo`, then connect any WebSocket client
//! to ws://127.0.0.1:8080/.

use log::{error, info};
use tokio::net::TcpListener;

use rusty_relay::Hub;

#[tokio::main]
async fn main() {
    env_logger::init();

    let hub = Hub::default();
    hub.on_message(|conn, msg| {
        if let Err(err) = conn.send(msg.into_bytes()) {
            error!("Echo failed: {}", err);
        }
    })
    .expect("first message handler");

    let listener = TcpListener::bind("127.0.0.1:8080")
        .await
        .expect("bind 127.0.0.1:8080");
    info!("Echo server listening on ws://127.0.0.1:8080/");

    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                info!("Inbound connection from {}", addr);
                if let Err(err) = hub.accept(stream).await {
                    error!("Handshake failed: {}", err);
                }
            }
            Err(err) => error!("Accept failed: {}", err),
        }
    }
}
