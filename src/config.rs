//! Hub configuration module
//! Handles timeout, buffer and handshake parameters for the WebSocket hub

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::constants::{
    DEFAULT_MAX_FRAME_SIZE, DEFAULT_OUTBOX_CAPACITY, DEFAULT_PING_INTERVAL, DEFAULT_READ_TIMEOUT,
    DEFAULT_WRITE_BUFFER_SIZE, DEFAULT_WRITE_TIMEOUT,
};

/// Predicate deciding whether an inbound handshake's `Origin` header is
/// acceptable. Receives `None` when the header is absent.
pub type OriginPredicate = Arc<dyn Fn(Option<&str>) -> bool + Send + Sync>;

/// Hub configuration parameters
#[derive(Clone)]
pub struct HubConfig {
    /// How often keepalive probes are sent to each peer
    pub ping_interval: Duration,
    /// A connection with no inbound traffic for this long is torn down
    pub read_timeout: Duration,
    /// Deadline applied to every socket write
    pub write_timeout: Duration,
    /// Upper bound on a single inbound frame
    pub max_frame_size: usize,
    /// Outbound frames are buffered up to this size before hitting the socket
    pub write_buffer_size: usize,
    /// Per-connection outbound queue depth
    pub outbox_capacity: usize,
    /// Origin check applied during the server handshake; `None` accepts all
    pub check_origin: Option<OriginPredicate>,
    /// Request permessage-deflate. The current transport does not negotiate
    /// it; enabling this logs a warning and proceeds uncompressed.
    pub compression: bool,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            ping_interval: DEFAULT_PING_INTERVAL,
            read_timeout: DEFAULT_READ_TIMEOUT,
            write_timeout: DEFAULT_WRITE_TIMEOUT,
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
            write_buffer_size: DEFAULT_WRITE_BUFFER_SIZE,
            outbox_capacity: DEFAULT_OUTBOX_CAPACITY,
            check_origin: None,
            compression: false,
        }
    }
}

impl HubConfig {
    /// Load configuration from environment variables if available
    pub fn from_env() -> Self {
        let ping_secs = env::var("RUSTY_RELAY_PING_SECS")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(DEFAULT_PING_INTERVAL.as_secs());

        let read_secs = env::var("RUSTY_RELAY_READ_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_READ_TIMEOUT.as_secs());

        let write_secs = env::var("RUSTY_RELAY_WRITE_TIMEOUT_SECS")
            .ok()
            .and_then(|t| t.parse().ok())
            .unwrap_or(DEFAULT_WRITE_TIMEOUT.as_secs());

        let max_frame_size = env::var("RUSTY_RELAY_MAX_FRAME_SIZE")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_MAX_FRAME_SIZE);

        let write_buffer_size = env::var("RUSTY_RELAY_WRITE_BUFFER")
            .ok()
            .and_then(|b| b.parse().ok())
            .unwrap_or(DEFAULT_WRITE_BUFFER_SIZE);

        let outbox_capacity = env::var("RUSTY_RELAY_OUTBOX_CAPACITY")
            .ok()
            .and_then(|c| c.parse().ok())
            .unwrap_or(DEFAULT_OUTBOX_CAPACITY);

        let compression = env::var("RUSTY_RELAY_COMPRESSION")
            .map(|v| v.to_lowercase() == "true" || v == "1")
            .unwrap_or(false);

        Self {
            ping_interval: Duration::from_secs(ping_secs),
            read_timeout: Duration::from_secs(read_secs),
            write_timeout: Duration::from_secs(write_secs),
            max_frame_size,
            write_buffer_size,
            outbox_capacity,
            check_origin: None,
            compression,
        }
    }

    /// Clamp zero or missing values back to their defaults. Applied once at
    /// hub construction so every connection sees positive settings.
    pub(crate) fn normalized(mut self) -> Self {
        if self.ping_interval.is_zero() {
            self.ping_interval = DEFAULT_PING_INTERVAL;
        }
        if self.read_timeout.is_zero() {
            self.read_timeout = DEFAULT_READ_TIMEOUT;
        }
        if self.write_timeout.is_zero() {
            self.write_timeout = DEFAULT_WRITE_TIMEOUT;
        }
        if self.max_frame_size == 0 {
            self.max_frame_size = DEFAULT_MAX_FRAME_SIZE;
        }
        if self.write_buffer_size == 0 {
            self.write_buffer_size = DEFAULT_WRITE_BUFFER_SIZE;
        }
        if self.outbox_capacity == 0 {
            self.outbox_capacity = DEFAULT_OUTBOX_CAPACITY;
        }
        self
    }
}

impl fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HubConfig")
            .field("ping_interval", &self.ping_interval)
            .field("read_timeout", &self.read_timeout)
            .field("write_timeout", &self.write_timeout)
            .field("max_frame_size", &self.max_frame_size)
            .field("write_buffer_size", &self.write_buffer_size)
            .field("outbox_capacity", &self.outbox_capacity)
            .field("check_origin", &self.check_origin.as_ref().map(|_| "<predicate>"))
            .field("compression", &self.compression)
            .finish()
    }
}
