//! Core functionality for the WebSocket hub

use futures_util::stream::{SplitSink, SplitStream};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

pub mod connection;
pub mod hub;
pub mod message;
pub(crate) mod pumps;
pub(crate) mod registry;

// Re-export main components for convenience
pub use connection::{CloseCode, Connection, Liveness};
pub use hub::{CloseHandler, Hub, MessageHandler};
pub use message::Message;

/// The duplex socket type produced by both `Hub::connect` and `Hub::accept`
pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub(crate) type WsSink = SplitSink<WsStream, WsMessage>;
pub(crate) type WsSource = SplitStream<WsStream>;
pub(crate) use tokio_tungstenite::tungstenite::Message as WsMessage;
