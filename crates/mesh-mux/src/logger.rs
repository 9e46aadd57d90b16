//! Frame event logging
//!
//! Renders observed frames as one-line summaries or structured JSON records.
//! Rendering is pure; emission goes through `tracing` under the `events`
//! target so it can be filtered independently of diagnostics.

use mesh_protocol::{decode_command, decode_response, format_decoded, Direction, Frame};
use serde_json::{Map, Value};
use tracing::{info, warn};

/// How much of the observed traffic to log
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventLogLevel {
    /// Log nothing
    Off,
    /// One line per frame: direction, packet type, decoded fields
    Summary,
    /// Summary plus a hex dump of each payload
    Verbose,
}

/// Renders and emits frame events at a configured verbosity
#[derive(Debug, Clone)]
pub struct EventLogger {
    level: EventLogLevel,
    json: bool,
}

impl EventLogger {
    /// Create a logger
    pub fn new(level: EventLogLevel, json: bool) -> Self {
        Self { level, json }
    }

    /// Whether any output would be produced
    pub fn enabled(&self) -> bool {
        self.level != EventLogLevel::Off
    }

    /// Render the log lines for one frame without emitting them
    pub fn render(&self, frame: &Frame) -> Vec<String> {
        if !self.enabled() {
            return Vec::new();
        }

        let decoded = decode_payload(frame);

        if self.json {
            let mut record = Map::new();
            record.insert("direction".into(), frame.direction.label().into());
            record.insert("packet_type".into(), frame.type_name().into());
            record.insert("packet_type_raw".into(), frame.packet_type.into());
            if let Some(decoded) = decoded {
                record.insert("decoded".into(), Value::Object(decoded));
            }
            if self.level == EventLogLevel::Verbose {
                record.insert("payload_hex".into(), hex::encode(&frame.payload).into());
                record.insert("payload_len".into(), frame.payload.len().into());
            }
            return vec![Value::Object(record).to_string()];
        }

        let mut line = format!("{} {}", frame.direction.arrow(), frame.type_name());
        if let Some(decoded) = &decoded {
            let fields = format_decoded(decoded);
            if !fields.is_empty() {
                line.push_str(": ");
                line.push_str(&fields);
            }
        }

        let mut lines = vec![line];
        if self.level == EventLogLevel::Verbose {
            lines.push(format!(
                "   [{} bytes]: {}",
                frame.payload.len(),
                hex::encode(&frame.payload)
            ));
        }
        lines
    }

    /// Emit the log lines for one frame
    pub fn log_frame(&self, frame: &Frame) {
        for line in self.render(frame) {
            info!(target: "events", "{line}");
        }
    }

    /// Emit the single warning for a stream desynchronization
    pub fn log_desync(&self, direction: Direction, skipped: usize) {
        warn!(
            "{} stream lost frame sync, skipped {} byte(s), scanning for next frame",
            direction.label(),
            skipped
        );
    }
}

fn decode_payload(frame: &Frame) -> Option<Map<String, Value>> {
    match frame.direction {
        Direction::ToRadio => decode_command(frame.packet_type, &frame.payload),
        Direction::FromRadio => decode_response(frame.packet_type, &frame.payload),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appstart_frame() -> Frame {
        let mut payload = vec![0x01, 0x03];
        payload.extend_from_slice(b"test_client");
        Frame {
            direction: Direction::ToRadio,
            packet_type: 0x01,
            payload,
        }
    }

    #[test]
    fn off_renders_nothing() {
        let logger = EventLogger::new(EventLogLevel::Off, false);
        assert!(logger.render(&appstart_frame()).is_empty());
    }

    #[test]
    fn summary_is_one_line() {
        let logger = EventLogger::new(EventLogLevel::Summary, false);
        let lines = logger.render(&appstart_frame());
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("-> CMD_APPSTART: "));
        assert!(lines[0].contains("app=test_client"));
    }

    #[test]
    fn verbose_adds_hex_dump() {
        let logger = EventLogger::new(EventLogLevel::Verbose, false);
        let frame = appstart_frame();
        let lines = logger.render(&frame);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains(&format!("[{} bytes]", frame.payload.len())));
        assert!(lines[1].contains(&hex::encode(&frame.payload)));
    }

    #[test]
    fn undecodable_frame_still_renders() {
        let logger = EventLogger::new(EventLogLevel::Summary, false);
        let frame = Frame {
            direction: Direction::FromRadio,
            packet_type: 0xEE,
            payload: vec![0xEE, 1, 2],
        };
        let lines = logger.render(&frame);
        assert_eq!(lines, vec!["<- RESP_UNKNOWN(0xee)".to_string()]);
    }

    #[test]
    fn json_record_shape() {
        let logger = EventLogger::new(EventLogLevel::Summary, true);
        let lines = logger.render(&appstart_frame());
        assert_eq!(lines.len(), 1);

        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["direction"], "TO_RADIO");
        assert_eq!(record["packet_type"], "CMD_APPSTART");
        assert_eq!(record["packet_type_raw"], 1);
        assert_eq!(record["decoded"]["app"], "test_client");
        // Payload details are verbose-only
        assert!(record.get("payload_hex").is_none());
        assert!(record.get("payload_len").is_none());
    }

    #[test]
    fn json_verbose_includes_payload_details() {
        let logger = EventLogger::new(EventLogLevel::Verbose, true);
        let frame = appstart_frame();
        let lines = logger.render(&frame);
        let record: Value = serde_json::from_str(&lines[0]).unwrap();
        assert_eq!(record["payload_hex"], hex::encode(&frame.payload));
        assert_eq!(record["payload_len"], 13);
    }

    #[test]
    fn json_omits_decoded_for_unknown_tags() {
        let logger = EventLogger::new(EventLogLevel::Summary, true);
        let frame = Frame {
            direction: Direction::FromRadio,
            packet_type: 0xEE,
            payload: vec![0xEE, 1, 2],
        };
        let record: Value = serde_json::from_str(&logger.render(&frame)[0]).unwrap();
        assert_eq!(record["packet_type"], "RESP_UNKNOWN(0xee)");
        assert!(record.get("decoded").is_none());
    }
}
