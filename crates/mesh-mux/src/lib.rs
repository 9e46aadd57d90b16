//! MeshCore Proxy Multiplexer Engine
//!
//! This crate lets multiple TCP clients share one MeshCore companion radio
//! attached over serial or BLE. The radio side stays a single connection;
//! the client side is many.
//!
//! # Architecture
//!
//! Everything meets in the multiplexer actor:
//!
//! - Client sessions submit raw bytes; the actor forwards each submission to
//!   the radio as one contiguous write, in arrival order.
//! - Radio bytes fan out to every session through a broadcast channel.
//!   Sessions never see each other's submissions or their own.
//! - A reconnect supervisor owns the radio link and retries with jittered
//!   exponential backoff. Sessions stay connected across outages while the
//!   actor holds their submissions in a bounded queue.
//! - Both byte streams are tapped into frame codecs for the event log.
//!   Observation is diagnostic only and never gates forwarding.
//!
//! Serial and virtual (in-process) links carry framed bytes natively; the
//! BLE transport converts between framed bytes and bare GATT payloads at
//! its boundary.

pub mod actor;
pub mod ble;
pub mod config;
pub mod error;
pub mod logger;
pub mod server;
pub mod session;
pub mod supervisor;
pub mod transport;

pub use actor::{run_mux_actor, MuxCommand};
pub use ble::{connect_ble, COMPANION_RX_CHAR_UUID, COMPANION_SERVICE_UUID, COMPANION_TX_CHAR_UUID};
pub use config::{MuxConfig, ReconnectPolicy, TransportConfig};
pub use error::{MuxError, TransportError};
pub use logger::{EventLogLevel, EventLogger};
pub use server::run_proxy_server;
pub use session::{run_client_session, SessionId, SessionMeta};
pub use supervisor::run_reconnect_supervisor;
pub use transport::{
    run_transport_reader, run_transport_writer, TransportLink, TransportReader, TransportWriter,
};
