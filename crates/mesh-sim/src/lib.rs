//! Simulated MeshCore Companion Radio
//!
//! A minimal companion radio good enough to exercise the proxy end to end:
//! it answers the commands a client sends at startup and can be told to drop
//! its link after a set number of frames to exercise reconnect handling.
//!
//! The simulator speaks the framed protocol over any async byte stream, so
//! it plugs into an in-process duplex link, a PTY, or a TCP socket alike.

pub mod radio;

pub use radio::{run_sim_radio, FailurePlan, SimRadio};
