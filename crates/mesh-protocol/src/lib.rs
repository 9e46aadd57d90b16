//! MeshCore Companion Protocol Library
//!
//! This crate provides framing and diagnostic decoding for the serial/TCP
//! protocol spoken by MeshCore companion radios:
//!
//! - **Framing**: every message is `0x3C` followed by a little-endian u16
//!   payload length and the payload itself. The first payload byte is the
//!   packet-type tag.
//! - **Tag tables**: fixed tables mapping command tags (client to radio) and
//!   response tags (radio to client) to their symbolic names.
//! - **Payload decoding**: best-effort extraction of human-readable fields
//!   from well-known payloads, for event logging only. Decoding never gates
//!   forwarding; a payload that fails to decode is still a valid frame.
//!
//! # Example
//!
//! ```rust
//! use mesh_protocol::{encode_frame, Direction, FrameCodec, FrameEvent};
//!
//! let mut codec = FrameCodec::new(Direction::ToRadio);
//! codec.push_bytes(&encode_frame(&[0x01, 0x03, b'h', b'i']).unwrap());
//!
//! match codec.next_event() {
//!     Some(FrameEvent::Frame(frame)) => {
//!         assert_eq!(frame.packet_type, 0x01);
//!         assert_eq!(frame.type_name(), "CMD_APPSTART");
//!     }
//!     other => panic!("expected a frame, got {:?}", other),
//! }
//! ```

pub mod decode;
pub mod error;
pub mod frame;
pub mod tags;

pub use decode::{decode_command, decode_response, format_decoded};
pub use error::ProtocolError;
pub use frame::{encode_frame, Direction, Frame, FrameCodec, FrameEvent, MAX_PAYLOAD_LEN};
pub use tags::{command_name, response_name, tag_label};
