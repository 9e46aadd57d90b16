//! Error types for the multiplexer

use thiserror::Error;

/// Errors from opening or using a radio transport
#[derive(Debug, Error)]
pub enum TransportError {
    /// Serial port could not be opened or configured
    #[error("serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// Bluetooth stack error
    #[error("bluetooth error: {0}")]
    Ble(#[from] bluer::Error),

    /// No BLE device matching the requested address or service was found
    #[error("no companion radio found matching {0}")]
    DeviceNotFound(String),

    /// Connected device does not expose the expected GATT characteristic
    #[error("missing companion characteristic {0}")]
    CharacteristicNotFound(uuid::Uuid),

    /// I/O failure on an open link
    #[error("transport i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// A BLE payload could not be re-framed
    #[error(transparent)]
    Frame(#[from] mesh_protocol::ProtocolError),

    /// The remote end closed the link
    #[error("transport closed by peer")]
    Closed,
}

/// Errors from the multiplexer and its supervisor
#[derive(Debug, Error)]
pub enum MuxError {
    /// Transport failure
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// Protocol-level failure
    #[error(transparent)]
    Protocol(#[from] mesh_protocol::ProtocolError),

    /// Reconnect supervisor gave up after exhausting its retry budget
    #[error("gave up reconnecting after {attempts} attempts: {last}")]
    RetriesExhausted {
        /// Consecutive failed attempts
        attempts: u32,
        /// The error from the final attempt
        #[source]
        last: TransportError,
    },

    /// The multiplexer actor is no longer running
    #[error("multiplexer actor is gone")]
    ActorGone,
}
