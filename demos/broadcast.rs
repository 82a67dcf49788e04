//! Broadcast relay: every message from any client is fanned out to all
//! connected clients.

use log::{error, info};
use tokio::net::TcpListener;

use rusty_relay::Hub;

#[tokio::main]
async fn main() {
    env_logger::init();

    let hub = Hub::default();
    let fanout = hub.clone();
    hub.on_message(move |_, msg| {
        info!("Broadcasting: {}", msg);
        fanout.broadcast(msg.into_bytes());
    })
    .expect("first message handler");

    hub.on_close(|conn, code| {
        info!(
            "Connection {} left after {:?} (code {})",
            conn.id(),
            conn.uptime(),
            u16::from(code)
        );
    })
    .expect("first close handler");

    let listener = TcpListener::bind("127.0.0.1:8080")
        .await
        .expect("bind 127.0.0.1:8080");
    info!("Broadcast relay listening on ws://127.0.0.1:8080/");

    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if let Err(err) = hub.accept(stream).await {
                    error!("Handshake failed: {}", err);
                }
            }
            Err(err) => error!("Accept failed: {}", err),
        }
    }
}
