//! Minimal chat room: clients exchange JSON `{nickname, content}` messages;
//! anything well-formed is rebroadcast to everyone.

use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;

use rusty_relay::Hub;

const MAX_CONTENT_LEN: usize = 1000;
const MAX_NICKNAME_LEN: usize = 32;

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    nickname: String,
    content: String,
}

#[tokio::main]
async fn main() {
    env_logger::init();

    let hub = Hub::default();
    let room = hub.clone();
    hub.on_message(move |_, msg| {
        let chat: ChatMessage = match msg.json() {
            Ok(chat) => chat,
            Err(err) => {
                warn!("Dropping malformed message: {}", err);
                return;
            }
        };

        if chat.nickname.trim().is_empty() || chat.content.trim().is_empty() {
            return;
        }
        if chat.content.len() > MAX_CONTENT_LEN || chat.nickname.len() > MAX_NICKNAME_LEN {
            return;
        }

        if let Err(err) = room.broadcast_json(&chat) {
            error!("Broadcast failed: {}", err);
        }
    })
    .expect("first message handler");

    let listener = TcpListener::bind("127.0.0.1:8080")
        .await
        .expect("bind 127.0.0.1:8080");
    info!("Chat room listening on ws://127.0.0.1:8080/");

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
