//! Diagnostic payload decoding
//!
//! Best-effort extraction of human-readable fields from well-known command
//! and response payloads, used only by the event log. Field layouts follow
//! the companion firmware: integers are little-endian, names are fixed-width
//! and NUL-padded, public keys are 32 bytes.
//!
//! Any payload that fails to decode yields `None`; the frame itself is still
//! valid and forwarded regardless.

use serde_json::{Map, Value};

/// Cursor over a payload body (the bytes after the packet-type tag)
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn bytes(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.pos.checked_add(n)?;
        if end > self.buf.len() {
            return None;
        }
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Some(out)
    }

    fn skip(&mut self, n: usize) -> Option<()> {
        self.bytes(n).map(|_| ())
    }

    fn rest(&mut self) -> &'a [u8] {
        let out = &self.buf[self.pos..];
        self.pos = self.buf.len();
        out
    }

    fn u8(&mut self) -> Option<u8> {
        self.bytes(1).map(|b| b[0])
    }

    fn i8(&mut self) -> Option<i8> {
        self.bytes(1).map(|b| b[0] as i8)
    }

    fn u16(&mut self) -> Option<u16> {
        self.bytes(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    fn i16(&mut self) -> Option<i16> {
        self.bytes(2).map(|b| i16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&mut self) -> Option<u32> {
        self.bytes(4)
            .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self) -> Option<i32> {
        self.bytes(4)
            .map(|b| i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn hex(&mut self, n: usize) -> Option<String> {
        self.bytes(n).map(hex::encode)
    }

    fn utf8(&mut self, n: usize) -> Option<String> {
        self.bytes(n)
            .map(|b| String::from_utf8_lossy(b).replace('\0', ""))
    }
}

fn preview(s: &str, max: usize) -> String {
    if s.chars().count() > max {
        let head: String = s.chars().take(max).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

fn coord(raw: i32) -> Value {
    if raw == 0 {
        Value::Null
    } else {
        Value::from(f64::from(raw) / 1e6)
    }
}

/// Decode a response payload from the radio into human-readable fields
///
/// `payload` includes the leading packet-type byte. Returns `None` when the
/// tag is unknown or the payload does not match the expected layout.
pub fn decode_response(packet_type: u8, payload: &[u8]) -> Option<Map<String, Value>> {
    if payload.is_empty() {
        return None;
    }
    let mut r = Reader::new(&payload[1..]);
    let mut out = Map::new();

    match packet_type {
        0x00 => {
            // OK
            out.insert("status".into(), "OK".into());
            if payload.len() == 5 {
                out.insert("value".into(), r.u32()?.into());
            }
        }
        0x01 => {
            // ERROR
            out.insert("status".into(), "ERROR".into());
            if payload.len() > 1 {
                out.insert("error_code".into(), r.u8()?.into());
            }
        }
        0x02 => {
            // CONTACT_START
            out.insert("contact_count".into(), r.u32()?.into());
        }
        0x03 | 0x8A => {
            // CONTACT / NEW_ADVERT
            out = decode_contact(&mut r)?;
        }
        0x04 => {
            // CONTACT_END
            out.insert("lastmod".into(), r.u32()?.into());
        }
        0x05 => {
            // SELF_INFO
            out = decode_self_info(&mut r)?;
        }
        0x06 => {
            // MSG_SENT
            out.insert("msg_type".into(), r.u8()?.into());
            out.insert("expected_ack".into(), r.hex(4)?.into());
            out.insert("timeout_ms".into(), r.u32()?.into());
        }
        0x07 => {
            // CONTACT_MSG_RECV
            out = decode_contact_msg(&mut r)?;
        }
        0x08 => {
            // CHANNEL_MSG_RECV
            out = decode_channel_msg(&mut r)?;
        }
        0x09 => {
            // CURRENT_TIME
            out.insert("time".into(), r.u32()?.into());
        }
        0x0A => {
            // NO_MORE_MSGS
            out.insert("messages_available".into(), false.into());
        }
        0x0B => {
            // CONTACT_URI
            let uri = format!("meshcore://{}", hex::encode(r.rest()));
            out.insert("uri".into(), uri.into());
        }
        0x0C => {
            // BATTERY
            out.insert("level_mv".into(), r.u16()?.into());
            if payload.len() > 3 {
                out.insert("used_kb".into(), r.u32()?.into());
                out.insert("total_kb".into(), r.u32()?.into());
            }
        }
        0x0D => {
            // DEVICE_INFO
            out = decode_device_info(&mut r, payload)?;
        }
        0x12 => {
            // CHANNEL_INFO
            out.insert("channel_idx".into(), r.u8()?.into());
            out.insert("name".into(), r.utf8(32)?.into());
        }
        0x15 => {
            // CUSTOM_VARS: comma-separated key:value pairs
            let raw = String::from_utf8_lossy(r.rest()).to_string();
            let mut vars = Map::new();
            for pair in raw.split(',') {
                if let Some((k, v)) = pair.split_once(':') {
                    vars.insert(k.to_string(), v.into());
                }
            }
            out.insert("vars".into(), Value::Object(vars));
        }
        0x18 => {
            // STATS
            out = decode_stats(payload)?;
        }
        0x80 | 0x81 => {
            // ADVERTISEMENT / PATH_UPDATE
            out.insert("public_key".into(), r.hex(32)?.into());
        }
        0x82 => {
            // ACK
            if payload.len() >= 5 {
                out.insert("ack_code".into(), r.hex(4)?.into());
            } else {
                out.insert("ack".into(), true.into());
            }
        }
        0x83 => {
            // MESSAGES_WAITING
            out.insert("messages_waiting".into(), true.into());
        }
        0x85 => {
            // LOGIN_SUCCESS
            out.insert("login".into(), "success".into());
            if payload.len() > 1 {
                let perms = r.u8()?;
                out.insert("is_admin".into(), ((perms & 1) == 1).into());
                out.insert("pubkey_prefix".into(), r.hex(6)?.into());
            }
        }
        0x86 => {
            // LOGIN_FAILED
            out.insert("login".into(), "failed".into());
        }
        0x87 => {
            // STATUS_RESPONSE
            out.insert("status_response".into(), true.into());
            out.insert("data_len".into(), (payload.len() - 1).into());
        }
        0x8B => {
            // TELEMETRY_RESPONSE
            r.skip(1)?;
            out.insert("pubkey_prefix".into(), r.hex(6)?.into());
            out.insert(
                "telemetry_len".into(),
                payload.len().checked_sub(8)?.into(),
            );
        }
        0x8C => {
            // BINARY_RESPONSE
            r.skip(1)?;
            out.insert("tag".into(), r.hex(4)?.into());
            out.insert("data_len".into(), payload.len().checked_sub(6)?.into());
        }
        _ => return None,
    }

    Some(out)
}

/// Decode a command payload going to the radio into human-readable fields
pub fn decode_command(packet_type: u8, payload: &[u8]) -> Option<Map<String, Value>> {
    if payload.is_empty() {
        return None;
    }
    let mut r = Reader::new(&payload[1..]);
    let mut out = Map::new();

    match packet_type {
        0x01 => {
            // APPSTART: version byte then app name
            if payload.len() < 3 {
                return None;
            }
            out.insert("version".into(), r.u8()?.into());
            let app = String::from_utf8_lossy(r.rest()).trim().to_string();
            out.insert("app".into(), app.into());
        }
        0x02 => {
            // SEND_MSG
            let msg_type = r.u8()?;
            out.insert(
                "type".into(),
                if msg_type == 1 { "command" } else { "message" }.into(),
            );
            out.insert("attempt".into(), r.u8()?.into());
            out.insert("timestamp".into(), r.u32()?.into());
            out.insert("to".into(), r.hex(6)?.into());
            let text = String::from_utf8_lossy(r.rest()).to_string();
            out.insert("text".into(), preview(&text, 50).into());
        }
        0x03 => {
            // SEND_CHAN_MSG
            r.skip(1)?; // flags
            out.insert("channel".into(), r.u8()?.into());
            out.insert("timestamp".into(), r.u32()?.into());
            let text = String::from_utf8_lossy(r.rest()).to_string();
            out.insert("text".into(), preview(&text, 50).into());
        }
        0x04 => {
            // GET_CONTACTS
            if payload.len() > 1 {
                out.insert("lastmod".into(), r.u32()?.into());
            }
        }
        0x06 => {
            // SET_TIME
            out.insert("time".into(), r.u32()?.into());
        }
        0x08 => {
            // SET_NAME
            let name = String::from_utf8_lossy(r.rest()).to_string();
            out.insert("name".into(), name.into());
        }
        0x0B => {
            // SET_RADIO
            out.insert("freq_mhz".into(), (f64::from(r.u32()?) / 1000.0).into());
            out.insert("bw_khz".into(), (f64::from(r.u32()?) / 1000.0).into());
            out.insert("sf".into(), r.u8()?.into());
            out.insert("cr".into(), r.u8()?.into());
        }
        0x0C => {
            // SET_TX_POWER
            out.insert("tx_power".into(), r.u32()?.into());
        }
        0x0E => {
            // SET_COORDS
            out.insert("lat".into(), coord(r.i32()?));
            out.insert("lon".into(), coord(r.i32()?));
        }
        0x16 => {
            // DEVICE_QUERY
            out.insert("query".into(), "device_info".into());
        }
        0x1A => {
            // SEND_LOGIN
            let dst = r.hex(32)?;
            out.insert("to".into(), format!("{}...", &dst[..12]).into());
            out.insert("password".into(), "***".into());
        }
        0x1F => {
            // GET_CHANNEL
            out.insert("channel_idx".into(), r.u8()?.into());
        }
        0x20 => {
            // SET_CHANNEL
            out.insert("channel_idx".into(), r.u8()?.into());
            out.insert("name".into(), r.utf8(32)?.into());
        }
        0x25 => {
            // SET_DEVICE_PIN
            out.insert("pin".into(), r.u32()?.into());
        }
        0x27 => {
            // GET_TELEMETRY
            r.skip(3)?;
            if payload.len() > 4 {
                out.insert("target".into(), r.hex(6)?.into());
            } else {
                out.insert("target".into(), "self".into());
            }
        }
        0x34 => {
            // PATH_DISCOVERY
            r.skip(1)?;
            let target = r.hex(32)?;
            out.insert("target".into(), format!("{}...", &target[..12]).into());
        }
        0x38 => {
            // GET_STATS
            let stats_type = r.u8()?;
            out.insert("stats_type".into(), stats_type_name(stats_type).into());
        }
        _ => return None,
    }

    Some(out)
}

fn contact_type_name(t: u8) -> String {
    match t {
        0 => "node".into(),
        1 => "repeater".into(),
        2 => "room".into(),
        other => format!("unknown({other})"),
    }
}

fn stats_type_name(t: u8) -> String {
    match t {
        0 => "core".into(),
        1 => "radio".into(),
        2 => "packets".into(),
        other => format!("unknown({other})"),
    }
}

fn decode_contact(r: &mut Reader<'_>) -> Option<Map<String, Value>> {
    let public_key = r.hex(32)?;
    let contact_type = r.u8()?;
    let _flags = r.u8()?;
    let path_len = r.i8()?;
    r.skip(64)?; // path data
    let name = r.utf8(32)?;
    let last_advert = r.u32()?;
    let lat = r.i32()?;
    let lon = r.i32()?;

    let mut out = Map::new();
    out.insert("name".into(), name.into());
    out.insert("public_key".into(), format!("{}...", &public_key[..12]).into());
    out.insert("type".into(), contact_type_name(contact_type).into());
    out.insert("path_len".into(), path_len.into());
    out.insert("last_advert".into(), last_advert.into());
    out.insert("lat".into(), coord(lat));
    out.insert("lon".into(), coord(lon));
    Some(out)
}

fn decode_self_info(r: &mut Reader<'_>) -> Option<Map<String, Value>> {
    let adv_type = r.u8()?;
    let tx_power = r.u8()?;
    let _max_tx_power = r.u8()?;
    let public_key = r.hex(32)?;
    let lat = r.i32()?;
    let lon = r.i32()?;
    r.skip(4)?; // multi_acks, adv_loc_policy, telemetry_mode, manual_add_contacts
    let freq = f64::from(r.u32()?) / 1000.0;
    let bw = f64::from(r.u32()?) / 1000.0;
    let sf = r.u8()?;
    let cr = r.u8()?;
    let name = String::from_utf8_lossy(r.rest()).to_string();

    let type_name = match adv_type {
        0 => "node".to_string(),
        1 => "client".to_string(),
        2 => "repeater".to_string(),
        3 => "room".to_string(),
        other => format!("unknown({other})"),
    };

    let mut out = Map::new();
    out.insert("name".into(), name.into());
    out.insert("type".into(), type_name.into());
    out.insert("public_key".into(), format!("{}...", &public_key[..12]).into());
    out.insert("tx_power".into(), tx_power.into());
    out.insert("freq_mhz".into(), freq.into());
    out.insert("bw_khz".into(), bw.into());
    out.insert("sf".into(), sf.into());
    out.insert("cr".into(), cr.into());
    out.insert("lat".into(), coord(lat));
    out.insert("lon".into(), coord(lon));
    Some(out)
}

fn decode_device_info(r: &mut Reader<'_>, payload: &[u8]) -> Option<Map<String, Value>> {
    let fw_ver = r.u8()?;
    let mut out = Map::new();
    out.insert("fw_version".into(), fw_ver.into());

    if fw_ver >= 3 && payload.len() > 60 {
        out.insert("max_contacts".into(), (u32::from(r.u8()?) * 2).into());
        out.insert("max_channels".into(), r.u8()?.into());
        r.skip(4)?; // ble_pin
        out.insert("fw_build".into(), r.utf8(12)?.into());
        out.insert("model".into(), r.utf8(40)?.into());
        out.insert("version".into(), r.utf8(20)?.into());
    }

    Some(out)
}

fn decode_contact_msg(r: &mut Reader<'_>) -> Option<Map<String, Value>> {
    let pubkey_prefix = r.hex(6)?;
    let path_len = r.u8()?;
    let txt_type = r.u8()?;
    let timestamp = r.u32()?;

    let mut out = Map::new();
    out.insert("from".into(), pubkey_prefix.into());
    out.insert("path_len".into(), path_len.into());
    out.insert("timestamp".into(), timestamp.into());

    if txt_type == 2 {
        out.insert("signature".into(), r.hex(4)?.into());
    }

    let text = String::from_utf8_lossy(r.rest()).to_string();
    out.insert("text".into(), preview(&text, 100).into());
    let type_name = match txt_type {
        0 => "text".to_string(),
        1 => "command".to_string(),
        2 => "signed".to_string(),
        other => format!("unknown({other})"),
    };
    out.insert("type".into(), type_name.into());
    Some(out)
}

fn decode_channel_msg(r: &mut Reader<'_>) -> Option<Map<String, Value>> {
    let channel_idx = r.u8()?;
    let path_len = r.u8()?;
    let txt_type = r.u8()?;
    let timestamp = r.u32()?;
    let text = String::from_utf8_lossy(r.rest()).to_string();

    let mut out = Map::new();
    out.insert("channel".into(), channel_idx.into());
    out.insert("path_len".into(), path_len.into());
    out.insert("timestamp".into(), timestamp.into());
    out.insert("text".into(), preview(&text, 100).into());
    let type_name = match txt_type {
        0 => "text".to_string(),
        1 => "command".to_string(),
        other => format!("unknown({other})"),
    };
    out.insert("type".into(), type_name.into());
    Some(out)
}

fn decode_stats(payload: &[u8]) -> Option<Map<String, Value>> {
    if payload.len() < 2 {
        return None;
    }
    let stats_type = payload[1];
    let mut r = Reader::new(&payload[2..]);
    let mut out = Map::new();

    match stats_type {
        0 if payload.len() >= 11 => {
            out.insert("stats_type".into(), "core".into());
            out.insert("battery_mv".into(), r.u16()?.into());
            out.insert("uptime_secs".into(), r.u32()?.into());
            out.insert("errors".into(), r.u16()?.into());
            out.insert("queue_len".into(), r.u8()?.into());
        }
        1 if payload.len() >= 14 => {
            out.insert("stats_type".into(), "radio".into());
            out.insert("noise_floor".into(), r.i16()?.into());
            out.insert("last_rssi".into(), r.i8()?.into());
            out.insert("last_snr".into(), (f64::from(r.i8()?) / 4.0).into());
            out.insert("tx_air_secs".into(), r.u32()?.into());
            out.insert("rx_air_secs".into(), r.u32()?.into());
        }
        2 if payload.len() >= 26 => {
            out.insert("stats_type".into(), "packets".into());
            for key in ["recv", "sent", "flood_tx", "direct_tx", "flood_rx", "direct_rx"] {
                out.insert(key.into(), r.u32()?.into());
            }
        }
        other => {
            out.insert("stats_type".into(), format!("unknown({other})").into());
        }
    }

    Some(out)
}

/// Render decoded fields as a concise one-line summary
///
/// Booleans render as a bare key when true and are skipped when false; null
/// values are skipped; floats use two decimals; nested maps render inline.
pub fn format_decoded(decoded: &Map<String, Value>) -> String {
    let mut parts = Vec::new();
    for (key, value) in decoded {
        match value {
            Value::Null | Value::Bool(false) => {}
            Value::Bool(true) => parts.push(key.clone()),
            Value::Number(n) if n.is_f64() => {
                let v = n.as_f64().unwrap_or(0.0);
                parts.push(format!("{key}={v:.2}"));
            }
            Value::Object(inner) => {
                let fields: Vec<String> = inner
                    .iter()
                    .map(|(k, v)| format!("{k}={}", scalar(v)))
                    .collect();
                parts.push(format!("{key}={{{}}}", fields.join(", ")));
            }
            other => parts.push(format!("{key}={}", scalar(other))),
        }
    }
    parts.join(" | ")
}

fn scalar(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
