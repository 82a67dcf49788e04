// Fundamental configuration defaults
use std::time::Duration;

pub const DEFAULT_PING_INTERVAL: Duration = Duration::from_secs(10);
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(10);
pub const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on a single inbound frame; larger frames fail the read.
pub const DEFAULT_MAX_FRAME_SIZE: usize = 16 << 20;
/// Outbound frames are buffered up to this size before hitting the socket.
pub const DEFAULT_WRITE_BUFFER_SIZE: usize = 128 * 1024;

/// Per-connection outbound queue depth. A peer that falls this many
/// messages behind is considered dead and evicted on the next enqueue.
pub const DEFAULT_OUTBOX_CAPACITY: usize = 256;

// Keepalive probes must go out ahead of the peer's read deadline
pub const PING_SAFETY_MARGIN: Duration = Duration::from_secs(1);
pub const MIN_PING_PERIOD: Duration = Duration::from_secs(1);
