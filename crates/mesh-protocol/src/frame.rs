//! Companion protocol framing
//!
//! Every message on the wire is a start marker, a little-endian u16 payload
//! length, and the payload itself:
//!
//! ```text
//! 3C | len_lo | len_hi | payload[len]
//! ```
//!
//! The first payload byte is the packet-type tag. The same framing is used on
//! the TCP side and the serial side; BLE notifications carry bare payloads
//! and are re-framed at the transport boundary.
//!
//! The codec here is diagnostic only. It observes a copy of the forwarded
//! byte stream and must never stall: a corrupted length field or a byte that
//! is not a frame marker at a frame boundary produces a single
//! [`FrameEvent::Desync`], after which the codec quietly scans forward to the
//! next marker.

use crate::error::ProtocolError;
use crate::tags::tag_label;

/// Frame start marker (`<`)
pub const FRAME_START: u8 = 0x3C;

/// Maximum plausible payload length; anything larger is a corrupted header
pub const MAX_PAYLOAD_LEN: usize = 4096;

/// Frame header length: marker plus u16 payload length
const HEADER_LEN: usize = 3;

/// Direction a frame traveled through the proxy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Direction {
    /// Client to radio (commands)
    ToRadio,
    /// Radio to client (responses and push notifications)
    FromRadio,
}

impl Direction {
    /// Label used by the structured event log
    pub fn label(&self) -> &'static str {
        match self {
            Direction::ToRadio => "TO_RADIO",
            Direction::FromRadio => "FROM_RADIO",
        }
    }

    /// Arrow used by the one-line event log
    pub fn arrow(&self) -> &'static str {
        match self {
            Direction::ToRadio => "->",
            Direction::FromRadio => "<-",
        }
    }
}

/// One logical protocol message decoded from the byte stream
///
/// Ephemeral: produced by [`FrameCodec`], consumed by the event logger, not
/// retained.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Frame {
    /// Direction the frame traveled
    pub direction: Direction,
    /// Packet-type tag (first payload byte)
    pub packet_type: u8,
    /// Raw payload bytes, type byte included
    pub payload: Vec<u8>,
}

impl Frame {
    /// Symbolic name for the packet type, falling back to the raw numeric
    /// form for unknown tags
    pub fn type_name(&self) -> String {
        tag_label(self.direction, self.packet_type)
    }
}

/// Output of [`FrameCodec::next_event`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// A complete frame was extracted
    Frame(Frame),
    /// The parser lost frame alignment and discarded `skipped` byte(s)
    ///
    /// Emitted once per desynchronization; the subsequent scan to the next
    /// marker is silent.
    Desync {
        /// Bytes discarded when the desync was detected
        skipped: usize,
    },
}

/// Streaming frame parser over an append-only byte cursor
///
/// One codec instance per traffic direction. Push raw chunks as they arrive,
/// then drain complete frames with [`next_event`](Self::next_event).
/// Incomplete trailing bytes are retained for the next chunk.
pub struct FrameCodec {
    direction: Direction,
    buffer: Vec<u8>,
    synced: bool,
}

impl FrameCodec {
    /// Create a codec for one traffic direction
    pub fn new(direction: Direction) -> Self {
        Self {
            direction,
            buffer: Vec::with_capacity(256),
            synced: true,
        }
    }

    /// Direction this codec observes
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Append raw bytes from the wire
    pub fn push_bytes(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Bytes currently buffered awaiting a complete frame
    pub fn pending_len(&self) -> usize {
        self.buffer.len()
    }

    /// Extract the next frame or desync notice, if available
    pub fn next_event(&mut self) -> Option<FrameEvent> {
        loop {
            if !self.synced {
                // Quietly scan forward to the next marker; the warning for
                // this desync was already emitted.
                match self.buffer.iter().position(|&b| b == FRAME_START) {
                    Some(pos) => {
                        self.buffer.drain(..pos);
                        self.synced = true;
                    }
                    None => {
                        self.buffer.clear();
                        return None;
                    }
                }
            }

            if self.buffer.is_empty() {
                return None;
            }

            if self.buffer[0] != FRAME_START {
                // Garbage at a frame boundary
                self.buffer.drain(..1);
                self.synced = false;
                return Some(FrameEvent::Desync { skipped: 1 });
            }

            if self.buffer.len() < HEADER_LEN {
                return None;
            }

            let len = u16::from_le_bytes([self.buffer[1], self.buffer[2]]) as usize;
            if len > MAX_PAYLOAD_LEN {
                // Corrupted length field: drop the marker byte and rescan
                self.buffer.drain(..1);
                self.synced = false;
                return Some(FrameEvent::Desync { skipped: 1 });
            }

            if self.buffer.len() < HEADER_LEN + len {
                return None;
            }

            let payload: Vec<u8> = self.buffer[HEADER_LEN..HEADER_LEN + len].to_vec();
            self.buffer.drain(..HEADER_LEN + len);

            if payload.is_empty() {
                // Zero-length frames are legal but carry no type byte
                continue;
            }

            return Some(FrameEvent::Frame(Frame {
                direction: self.direction,
                packet_type: payload[0],
                payload,
            }));
        }
    }
}

/// Frame a payload for transmission
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, ProtocolError> {
    let len = u16::try_from(payload.len())
        .map_err(|_| ProtocolError::PayloadTooLarge(payload.len()))?;

    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.push(FRAME_START);
    out.extend_from_slice(&len.to_le_bytes());
    out.extend_from_slice(payload);
    Ok(out)
}
