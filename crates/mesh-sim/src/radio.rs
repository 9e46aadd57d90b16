//! Simulated radio state machine and I/O loop

use mesh_protocol::{encode_frame, Direction, FrameCodec, FrameEvent};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Default radio identity parameters
const SIM_TX_POWER: u8 = 22;
const SIM_MAX_TX_POWER: u8 = 30;
const SIM_FREQ_KHZ: u32 = 910_525;
const SIM_BW_HZ: u32 = 250_000;
const SIM_SF: u8 = 10;
const SIM_CR: u8 = 5;

/// When the simulated link should fail
#[derive(Debug, Clone, Copy, Default)]
pub struct FailurePlan {
    /// Drop the link after handling this many command frames
    pub fail_after_frames: Option<usize>,
}

/// In-memory companion radio
///
/// Answers the handful of commands clients send on startup; everything else
/// gets an ERROR response, like real firmware answering an unsupported
/// command.
pub struct SimRadio {
    name: String,
    public_key: [u8; 32],
    time: u32,
}

impl SimRadio {
    /// Create a radio with the given advertised name
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            public_key: [0xA5; 32],
            time: 1_700_000_000,
        }
    }

    /// Advertised name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Handle one command payload, returning the response payload if any
    pub fn handle_command(&mut self, payload: &[u8]) -> Option<Vec<u8>> {
        let packet_type = *payload.first()?;
        match packet_type {
            // CMD_APPSTART
            0x01 => Some(self.self_info()),
            // CMD_SEND_MSG
            0x02 => {
                let mut resp = vec![0x06, 0x00];
                resp.extend_from_slice(&[0xCA, 0xFE, 0xBA, 0xBE]); // expected ack
                resp.extend_from_slice(&5000u32.to_le_bytes()); // timeout ms
                Some(resp)
            }
            // CMD_GET_TIME
            0x05 => {
                let mut resp = vec![0x09];
                resp.extend_from_slice(&self.time.to_le_bytes());
                Some(resp)
            }
            // CMD_SET_TIME
            0x06 => {
                if payload.len() >= 5 {
                    self.time = u32::from_le_bytes([
                        payload[1], payload[2], payload[3], payload[4],
                    ]);
                }
                Some(vec![0x00])
            }
            // CMD_SET_NAME
            0x08 => {
                self.name = String::from_utf8_lossy(&payload[1..]).to_string();
                Some(vec![0x00])
            }
            // CMD_GET_BATTERY
            0x14 => {
                let mut resp = vec![0x0C];
                resp.extend_from_slice(&3900u16.to_le_bytes());
                Some(resp)
            }
            // CMD_DEVICE_QUERY
            0x16 => Some(self.device_info()),
            // Unsupported command
            _ => Some(vec![0x01, 0x01]),
        }
    }

    /// SELF_INFO response payload
    fn self_info(&self) -> Vec<u8> {
        let mut resp = vec![0x05, 0x01, SIM_TX_POWER, SIM_MAX_TX_POWER];
        resp.extend_from_slice(&self.public_key);
        resp.extend_from_slice(&0i32.to_le_bytes()); // lat
        resp.extend_from_slice(&0i32.to_le_bytes()); // lon
        resp.extend_from_slice(&[0; 4]); // multi_acks, loc policy, telemetry, manual add
        resp.extend_from_slice(&SIM_FREQ_KHZ.to_le_bytes());
        resp.extend_from_slice(&SIM_BW_HZ.to_le_bytes());
        resp.push(SIM_SF);
        resp.push(SIM_CR);
        resp.extend_from_slice(self.name.as_bytes());
        resp
    }

    /// DEVICE_INFO response payload
    fn device_info(&self) -> Vec<u8> {
        let mut resp = vec![0x0D, 3]; // firmware api version
        resp.push(100); // max contacts / 2
        resp.push(8); // max channels
        resp.extend_from_slice(&[0; 4]); // ble pin
        resp.extend_from_slice(&fixed_width(b"sim-build", 12));
        resp.extend_from_slice(&fixed_width(b"SimRadio Board", 40));
        resp.extend_from_slice(&fixed_width(b"v1.0.0-sim", 20));
        resp
    }
}

fn fixed_width(text: &[u8], width: usize) -> Vec<u8> {
    let mut out = vec![0u8; width];
    let n = text.len().min(width);
    out[..n].copy_from_slice(&text[..n]);
    out
}

/// Serve the radio over a byte stream until the stream closes or the
/// failure plan triggers
pub async fn run_sim_radio<T>(mut io: T, mut radio: SimRadio, plan: FailurePlan)
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let mut codec = FrameCodec::new(Direction::ToRadio);
    let mut buf = vec![0u8; 1024];
    let mut handled = 0usize;

    loop {
        let n = match io.read(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(n) => n,
        };
        codec.push_bytes(&buf[..n]);

        while let Some(event) = codec.next_event() {
            let FrameEvent::Frame(frame) = event else {
                continue;
            };
            if let Some(response) = radio.handle_command(&frame.payload) {
                let Ok(wire) = encode_frame(&response) else {
                    continue;
                };
                if io.write_all(&wire).await.is_err() {
                    return;
                }
                if io.flush().await.is_err() {
                    return;
                }
            }

            handled += 1;
            if plan.fail_after_frames == Some(handled) {
                debug!("simulated link failure after {handled} frame(s)");
                return;
            }
        }
    }
}
