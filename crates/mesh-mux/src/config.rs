//! Multiplexer and transport configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Which physical transport carries the radio link
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransportConfig {
    /// USB/UART serial connection
    Serial {
        /// Device path, e.g. `/dev/ttyUSB0`
        port: String,
        /// Baud rate
        baud: u32,
    },
    /// Bluetooth Low Energy connection
    Ble {
        /// Device address; scans for any companion radio when `None`
        address: Option<String>,
        /// Pairing PIN
        pin: String,
    },
}

/// Reconnect supervisor tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconnectPolicy {
    /// Delay before the first retry
    pub floor: Duration,
    /// Upper bound for the exponential backoff
    pub ceil: Duration,
    /// Give up after this many consecutive failures; `None` retries forever
    pub max_retries: Option<u32>,
    /// Abandon a single connection attempt after this long
    pub attempt_timeout: Duration,
    /// A connection that survives this long resets the backoff
    pub reset_after: Duration,
    /// Treat this much radio silence as link loss; `None` (the default)
    /// trusts I/O errors and EOF only, since an idle radio is not a dead one
    pub read_grace: Option<Duration>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceil: Duration::from_secs(30),
            max_retries: None,
            attempt_timeout: Duration::from_secs(20),
            reset_after: Duration::from_secs(30),
            read_grace: None,
        }
    }
}

/// Multiplexer channel sizing
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MuxConfig {
    /// Per-session fan-out buffer, in radio chunks; a session that falls
    /// further behind loses its oldest chunks
    pub broadcast_capacity: usize,
    /// Client submissions held while the radio link is down
    pub pending_limit: usize,
    /// Depth of the queue feeding the transport writer task
    pub write_queue: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            broadcast_capacity: 256,
            pending_limit: 64,
            write_queue: 64,
        }
    }
}
