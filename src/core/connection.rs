//! Per-peer connection state and the application-facing send surface

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{OnceLock, Weak};
use std::time::{Duration, Instant};

use log::warn;
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::mpsc::Sender;
use tokio::sync::Notify;
use uuid::Uuid;

use crate::config::HubConfig;
use crate::core::hub::HubInner;
use crate::error::{HubError, Result};
use crate::core::WsMessage;

/// Close codes defined in RFC 6455, section 11.7, re-exported from the
/// underlying protocol implementation.
pub use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;

/// Connection lifecycle state. Transitions are monotonic: a connection only
/// ever moves forward, and `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(u8)]
pub enum Liveness {
    Open = 0,
    Closing = 1,
    Closed = 2,
}

impl Liveness {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Liveness::Open,
            1 => Liveness::Closing,
            _ => Liveness::Closed,
        }
    }
}

/// Represents one peer session.
///
/// The socket itself is owned by the two pumps (the reader holds the stream
/// half, the writer holds the sink half); this handle only reaches the peer
/// through the bounded outbound queue.
pub struct Connection {
    id: Uuid,
    outbox: Sender<WsMessage>,
    shutdown: Notify,
    liveness: AtomicU8,
    close_code: OnceLock<CloseCode>,
    hub: Weak<HubInner>,
    connected_at: Instant,

    pub(crate) read_timeout: Duration,
    pub(crate) write_timeout: Duration,
    pub(crate) ping_interval: Duration,
}

impl Connection {
    pub(crate) fn new(outbox: Sender<WsMessage>, config: &HubConfig, hub: Weak<HubInner>) -> Self {
        Self {
            id: Uuid::new_v4(),
            outbox,
            shutdown: Notify::new(),
            liveness: AtomicU8::new(Liveness::Open as u8),
            close_code: OnceLock::new(),
            hub,
            connected_at: Instant::now(),
            read_timeout: config.read_timeout,
            write_timeout: config.write_timeout,
            ping_interval: config.ping_interval,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn liveness(&self) -> Liveness {
        Liveness::from_u8(self.liveness.load(Ordering::Acquire))
    }

    pub fn is_open(&self) -> bool {
        self.liveness() == Liveness::Open
    }

    /// The negotiated close code, once the connection has begun closing
    pub fn close_code(&self) -> Option<CloseCode> {
        self.close_code.get().copied()
    }

    /// How long this connection has been established
    pub fn uptime(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Send a binary message to this peer.
    ///
    /// Never blocks: if the outbound queue is full the peer is considered
    /// dead, the connection is queued for unregistration and
    /// `HubError::OutboxFull` is returned.
    pub fn send(&self, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.push(WsMessage::Binary(bytes.into()))
    }

    /// Send a text message to this peer; same queue policy as `send`
    pub fn send_text(&self, text: impl Into<String>) -> Result<()> {
        self.push(WsMessage::Text(text.into()))
    }

    /// Serialize `value` as JSON and send it as a text message
    pub fn send_json<T: Serialize>(&self, value: &T) -> Result<()> {
        let payload = serde_json::to_string(value)?;
        self.push(WsMessage::Text(payload))
    }

    /// Close this connection with a normal-closure code. Idempotent.
    pub fn close(&self) {
        if let Some(hub) = self.hub.upgrade() {
            hub.unregister(&self.id, CloseCode::Normal);
        } else {
            self.begin_close(CloseCode::Normal);
        }
    }

    fn push(&self, frame: WsMessage) -> Result<()> {
        if self.liveness() != Liveness::Open {
            return Err(HubError::ConnectionClosed);
        }

        match self.outbox.try_send(frame) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                warn!(
                    "Outbound queue full for connection {}, evicting slow peer",
                    self.id
                );
                if let Some(hub) = self.hub.upgrade() {
                    hub.unregister(&self.id, CloseCode::Again);
                } else {
                    self.begin_close(CloseCode::Again);
                }
                Err(HubError::OutboxFull)
            }
            Err(TrySendError::Closed(_)) => Err(HubError::ConnectionClosed),
        }
    }

    /// Enqueue without the eviction side effect; the registry decides what
    /// to do with a full queue during fan-out.
    pub(crate) fn enqueue(
        &self,
        frame: WsMessage,
    ) -> std::result::Result<(), TrySendError<WsMessage>> {
        self.outbox.try_send(frame)
    }

    /// Move the connection into `Closing`: record the close code (first
    /// writer wins) and wake the writer pump so it emits a close frame.
    pub(crate) fn begin_close(&self, code: CloseCode) {
        let _ = self.close_code.set(code);
        self.advance(Liveness::Closing);
        self.shutdown.notify_one();
    }

    pub(crate) fn mark_closed(&self) {
        self.advance(Liveness::Closed);
    }

    pub(crate) fn closed_signal(&self) -> &Notify {
        &self.shutdown
    }

    fn advance(&self, to: Liveness) {
        self.liveness.fetch_max(to as u8, Ordering::AcqRel);
    }
}
