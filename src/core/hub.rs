//! The hub: process-wide connection registry, handshake entry points and
//! broadcast fan-out

use std::sync::{Arc, Mutex, MutexGuard, OnceLock};

use log::{error, info, warn};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::http::StatusCode;
use tokio_tungstenite::tungstenite::protocol::WebSocketConfig;
use tokio_tungstenite::{accept_hdr_async_with_config, connect_async_with_config, MaybeTlsStream};
use url::Url;
use uuid::Uuid;

use crate::config::HubConfig;
use crate::core::connection::{CloseCode, Connection};
use crate::core::message::Message;
use crate::core::pumps::{reader_pump, writer_pump};
use crate::core::registry::Registry;
use crate::core::{WsMessage, WsStream};
use crate::error::{HubError, Result};

pub type MessageHandler = Box<dyn Fn(Arc<Connection>, Message) + Send + Sync>;
pub type CloseHandler = Box<dyn Fn(Arc<Connection>, CloseCode) + Send + Sync>;

/// Process-wide entry point. Cheap to clone; all clones share the same
/// registry and handlers.
#[derive(Clone)]
pub struct Hub {
    inner: Arc<HubInner>,
}

impl Hub {
    /// Create a hub with the given configuration. Zero values are clamped
    /// back to their defaults.
    pub fn new(config: HubConfig) -> Self {
        let config = config.normalized();
        if config.compression {
            warn!("Compression requested but permessage-deflate is not negotiated; continuing uncompressed");
        }

        Self {
            inner: Arc::new(HubInner {
                config,
                registry: Mutex::new(Registry::new()),
                on_message: OnceLock::new(),
                on_close: OnceLock::new(),
            }),
        }
    }

    /// Install the process-wide inbound message handler. Installing a
    /// second handler is a configuration error.
    pub fn on_message<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Arc<Connection>, Message) + Send + Sync + 'static,
    {
        self.inner
            .on_message
            .set(Box::new(handler))
            .map_err(|_| HubError::HandlerAlreadyInstalled("message"))
    }

    /// Install the process-wide close handler, invoked at most once per
    /// connection with its final close code.
    pub fn on_close<F>(&self, handler: F) -> Result<()>
    where
        F: Fn(Arc<Connection>, CloseCode) + Send + Sync + 'static,
    {
        self.inner
            .on_close
            .set(Box::new(handler))
            .map_err(|_| HubError::HandlerAlreadyInstalled("close"))
    }

    /// Open an outbound session to a remote `ws://` or `wss://` endpoint,
    /// register it and start its pumps.
    pub async fn connect(&self, endpoint: &str) -> Result<Arc<Connection>> {
        let url = Url::parse(endpoint)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => {
                return Err(HubError::InvalidUrl(format!(
                    "unsupported scheme '{}'",
                    other
                )))
            }
        }

        let (socket, _response) =
            connect_async_with_config(endpoint, Some(self.inner.ws_config()), false).await?;
        info!("Connected to {}", endpoint);

        self.inner.spawn_connection(socket)
    }

    /// Perform the server-side upgrade on an inbound TCP stream, applying
    /// the configured origin check, then register the connection and start
    /// its pumps.
    pub async fn accept(&self, stream: TcpStream) -> Result<Arc<Connection>> {
        let check_origin = self.inner.config.check_origin.clone();
        let callback = move |request: &Request, response: Response| {
            let Some(predicate) = check_origin else {
                return Ok(response);
            };

            let origin = request
                .headers()
                .get("Origin")
                .and_then(|value| value.to_str().ok());
            if predicate(origin) {
                Ok(response)
            } else {
                warn!("Rejected handshake from disallowed origin {:?}", origin);
                let mut reject = ErrorResponse::new(Some("origin not allowed".to_string()));
                *reject.status_mut() = StatusCode::FORBIDDEN;
                Err(reject)
            }
        };

        let socket = accept_hdr_async_with_config(
            MaybeTlsStream::Plain(stream),
            callback,
            Some(self.inner.ws_config()),
        )
        .await?;

        self.inner.spawn_connection(socket)
    }

    /// Wrap an already-upgraded socket, register it and start its pumps
    pub fn attach(&self, socket: WsStream) -> Result<Arc<Connection>> {
        self.inner.spawn_connection(socket)
    }

    /// Close a connection explicitly. Idempotent.
    pub fn unregister(&self, conn: &Connection) {
        self.inner.unregister(&conn.id(), CloseCode::Normal);
    }

    /// Enqueue a binary message onto every registered connection's queue.
    /// Never blocks; a connection whose queue is full is evicted and misses
    /// the message, all others still receive it.
    pub fn broadcast(&self, bytes: impl Into<Vec<u8>>) {
        self.inner.fan_out(WsMessage::Binary(bytes.into()));
    }

    /// Broadcast a text message; same policy as `broadcast`
    pub fn broadcast_text(&self, text: impl Into<String>) {
        self.inner.fan_out(WsMessage::Text(text.into()));
    }

    /// Serialize `value` as JSON and broadcast it as a text message
    pub fn broadcast_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.inner.fan_out(WsMessage::Text(payload));
        Ok(())
    }

    /// Number of currently registered connections
    pub fn connection_count(&self) -> usize {
        self.inner
            .lock_registry()
            .map(|registry| registry.len())
            .unwrap_or(0)
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new(HubConfig::default())
    }
}

pub(crate) struct HubInner {
    config: HubConfig,
    registry: Mutex<Registry>,
    on_message: OnceLock<MessageHandler>,
    on_close: OnceLock<CloseHandler>,
}

impl HubInner {
    /// Register the connection and start its two pumps. Registration
    /// completes before this returns, so a broadcast issued afterwards is
    /// guaranteed to reach the new connection.
    fn spawn_connection(self: &Arc<Self>, socket: WsStream) -> Result<Arc<Connection>> {
        use futures_util::StreamExt;

        let (outbox_tx, outbox_rx) = mpsc::channel(self.config.outbox_capacity);
        let conn = Arc::new(Connection::new(outbox_tx, &self.config, Arc::downgrade(self)));

        {
            let mut registry = self.lock_registry()?;
            registry.register(conn.clone());
            info!(
                "Connection {} established ({} open)",
                conn.id(),
                registry.len()
            );
        }

        let (sink, source) = socket.split();
        tokio::spawn(writer_pump(conn.clone(), sink, outbox_rx));
        tokio::spawn(reader_pump(self.clone(), conn.clone(), source));

        Ok(conn)
    }

    /// Remove a connection from the registry and finish tearing it down.
    /// Idempotent: unregistering an absent connection is a no-op, and the
    /// close handler fires at most once per connection.
    pub(crate) fn unregister(&self, id: &Uuid, code: CloseCode) {
        let removed = match self.lock_registry() {
            Ok(mut registry) => registry.unregister(id),
            Err(err) => {
                error!("Failed to acquire registry lock for unregistration: {}", err);
                return;
            }
        };

        if let Some(conn) = removed {
            self.teardown(conn, code);
        }
    }

    pub(crate) fn message_handler(&self) -> Option<&MessageHandler> {
        self.on_message.get()
    }

    fn fan_out(&self, frame: WsMessage) {
        let evicted = match self.lock_registry() {
            Ok(mut registry) => registry.fan_out(&frame),
            Err(err) => {
                error!("Failed to acquire registry lock for broadcast: {}", err);
                return;
            }
        };

        for conn in evicted {
            warn!("Connection {} cannot keep up, evicting", conn.id());
            self.teardown(conn, CloseCode::Again);
        }
    }

    // Runs outside the registry lock so handlers may call back into the hub
    fn teardown(&self, conn: Arc<Connection>, code: CloseCode) {
        conn.begin_close(code);
        let code = conn.close_code().unwrap_or(code);
        info!(
            "Connection {} unregistered (code {})",
            conn.id(),
            u16::from(code)
        );

        if let Some(handler) = self.on_close.get() {
            handler(conn, code);
        }
    }

    fn lock_registry(&self) -> Result<MutexGuard<'_, Registry>> {
        self.registry.lock().map_err(HubError::from)
    }

    fn ws_config(&self) -> WebSocketConfig {
        let mut config = WebSocketConfig::default();
        config.write_buffer_size = self.config.write_buffer_size;
        config.max_message_size = Some(self.config.max_frame_size);
        config.max_frame_size = Some(self.config.max_frame_size);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::connection::Liveness;
    use std::sync::atomic::{AtomicUsize, Ordering};

    // Register a connection without pumps so its queue is never drained
    fn register_undrained(hub: &Hub) -> (Arc<Connection>, mpsc::Receiver<WsMessage>) {
        let (tx, rx) = mpsc::channel(hub.inner.config.outbox_capacity);
        let conn = Arc::new(Connection::new(
            tx,
            &hub.inner.config,
            Arc::downgrade(&hub.inner),
        ));
        hub.inner.lock_registry().unwrap().register(conn.clone());
        (conn, rx)
    }

    #[test]
    fn test_second_handler_is_rejected() {
        let hub = Hub::default();
        assert!(hub.on_message(|_, _| {}).is_ok());
        assert!(matches!(
            hub.on_message(|_, _| {}),
            Err(HubError::HandlerAlreadyInstalled("message"))
        ));

        assert!(hub.on_close(|_, _| {}).is_ok());
        assert!(hub.on_close(|_, _| {}).is_err());
    }

    #[test]
    fn test_stalled_consumer_is_evicted_on_direct_send() {
        let hub = Hub::new(HubConfig {
            outbox_capacity: 1,
            ..HubConfig::default()
        });

        let closes = Arc::new(AtomicUsize::new(0));
        let seen = closes.clone();
        hub.on_close(move |_, code| {
            assert_eq!(code, CloseCode::Again);
            seen.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();

        let (conn, _rx) = register_undrained(&hub);
        assert_eq!(hub.connection_count(), 1);

        // Capacity one and nobody draining: the first send is delivered,
        // the second evicts the peer instead of blocking the caller
        assert!(conn.send(b"first".to_vec()).is_ok());
        assert!(matches!(
            conn.send(b"second".to_vec()),
            Err(HubError::OutboxFull)
        ));

        assert_eq!(hub.connection_count(), 0);
        assert_eq!(conn.liveness(), Liveness::Closing);
        assert_eq!(conn.close_code(), Some(CloseCode::Again));
        assert_eq!(closes.load(Ordering::SeqCst), 1);

        // Closing again is a no-op; the close handler does not refire
        conn.close();
        assert_eq!(closes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_broadcast_isolates_slow_consumer() {
        let hub = Hub::new(HubConfig {
            outbox_capacity: 1,
            ..HubConfig::default()
        });

        let (slow, _slow_rx) = register_undrained(&hub);
        let (fast, mut fast_rx) = register_undrained(&hub);
        // Pre-fill the slow queue
        slow.send(b"backlog".to_vec()).unwrap();

        hub.broadcast(b"hello".to_vec());

        assert_eq!(hub.connection_count(), 1);
        assert_eq!(slow.liveness(), Liveness::Closing);
        assert!(fast.is_open());
        assert_eq!(
            fast_rx.try_recv().unwrap(),
            WsMessage::Binary(b"hello".to_vec())
        );
    }

    #[test]
    fn test_broadcast_json_serializes() {
        let hub = Hub::default();
        let (_conn, mut rx) = register_undrained(&hub);

        hub.broadcast_json(&serde_json::json!({"kind": "tick"})).unwrap();

        match rx.try_recv().unwrap() {
            WsMessage::Text(payload) => {
                assert_eq!(payload, r#"{"kind":"tick"}"#);
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }
}
