//! Error types for the protocol layer

use thiserror::Error;

/// Errors raised while handling companion protocol data
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// Payload does not fit in the 16-bit frame length field
    #[error("payload too large to frame: {0} bytes")]
    PayloadTooLarge(usize),
}
