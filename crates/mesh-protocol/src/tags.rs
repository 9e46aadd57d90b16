//! Packet-type tag tables
//!
//! Fixed tables from the companion firmware, versioned with this crate. The
//! same numeric tag means different things depending on direction: the first
//! byte of a client-to-radio payload is a command code, the first byte of a
//! radio-to-client payload is a response or push-notification code.
//!
//! Unknown tags are never rejected; they are preserved and rendered in their
//! raw numeric form.

use crate::frame::Direction;

/// Symbolic name for a command tag (client to radio)
pub fn command_name(tag: u8) -> Option<&'static str> {
    match tag {
        0x01 => Some("CMD_APPSTART"),
        0x02 => Some("CMD_SEND_MSG"),
        0x03 => Some("CMD_SEND_CHAN_MSG"),
        0x04 => Some("CMD_GET_CONTACTS"),
        0x05 => Some("CMD_GET_TIME"),
        0x06 => Some("CMD_SET_TIME"),
        0x07 => Some("CMD_SEND_ADVERT"),
        0x08 => Some("CMD_SET_NAME"),
        0x09 => Some("CMD_UPDATE_CONTACT"),
        0x0A => Some("CMD_GET_MSG"),
        0x0B => Some("CMD_SET_RADIO"),
        0x0C => Some("CMD_SET_TX_POWER"),
        0x0D => Some("CMD_RESET_PATH"),
        0x0E => Some("CMD_SET_COORDS"),
        0x0F => Some("CMD_REMOVE_CONTACT"),
        0x10 => Some("CMD_SHARE_CONTACT"),
        0x11 => Some("CMD_EXPORT_CONTACT"),
        0x12 => Some("CMD_IMPORT_CONTACT"),
        0x13 => Some("CMD_REBOOT"),
        0x14 => Some("CMD_GET_BATTERY"),
        0x15 => Some("CMD_SET_TUNING"),
        0x16 => Some("CMD_DEVICE_QUERY"),
        0x17 => Some("CMD_EXPORT_PRIVATE_KEY"),
        0x18 => Some("CMD_IMPORT_PRIVATE_KEY"),
        0x1A => Some("CMD_SEND_LOGIN"),
        0x1B => Some("CMD_SEND_STATUS_REQ"),
        0x1D => Some("CMD_SEND_LOGOUT"),
        0x1F => Some("CMD_GET_CHANNEL"),
        0x20 => Some("CMD_SET_CHANNEL"),
        0x21 => Some("CMD_SIGN_START"),
        0x22 => Some("CMD_SIGN_DATA"),
        0x23 => Some("CMD_SIGN_FINISH"),
        0x24 => Some("CMD_SEND_TRACE"),
        0x25 => Some("CMD_SET_DEVICE_PIN"),
        0x26 => Some("CMD_SET_OTHER_PARAMS"),
        0x27 => Some("CMD_GET_TELEMETRY"),
        0x28 => Some("CMD_GET_CUSTOM_VARS"),
        0x29 => Some("CMD_SET_CUSTOM_VAR"),
        0x32 => Some("CMD_BINARY_REQ"),
        0x33 => Some("CMD_FACTORY_RESET"),
        0x34 => Some("CMD_PATH_DISCOVERY"),
        0x36 => Some("CMD_SET_FLOOD_SCOPE"),
        0x37 => Some("CMD_SEND_CONTROL_DATA"),
        0x38 => Some("CMD_GET_STATS"),
        0x39 => Some("CMD_REQUEST_ADVERT"),
        _ => None,
    }
}

/// Symbolic name for a response or push tag (radio to client)
pub fn response_name(tag: u8) -> Option<&'static str> {
    match tag {
        0x00 => Some("OK"),
        0x01 => Some("ERROR"),
        0x02 => Some("CONTACT_START"),
        0x03 => Some("CONTACT"),
        0x04 => Some("CONTACT_END"),
        0x05 => Some("SELF_INFO"),
        0x06 => Some("MSG_SENT"),
        0x07 => Some("CONTACT_MSG_RECV"),
        0x08 => Some("CHANNEL_MSG_RECV"),
        0x09 => Some("CURRENT_TIME"),
        0x0A => Some("NO_MORE_MSGS"),
        0x0B => Some("CONTACT_URI"),
        0x0C => Some("BATTERY"),
        0x0D => Some("DEVICE_INFO"),
        0x0E => Some("PRIVATE_KEY"),
        0x12 => Some("CHANNEL_INFO"),
        0x15 => Some("CUSTOM_VARS"),
        0x18 => Some("STATS"),
        0x80 => Some("ADVERTISEMENT"),
        0x81 => Some("PATH_UPDATE"),
        0x82 => Some("ACK"),
        0x83 => Some("MESSAGES_WAITING"),
        0x84 => Some("RAW_DATA"),
        0x85 => Some("LOGIN_SUCCESS"),
        0x86 => Some("LOGIN_FAILED"),
        0x87 => Some("STATUS_RESPONSE"),
        0x88 => Some("LOG_RX_DATA"),
        0x89 => Some("TRACE_DATA"),
        0x8A => Some("NEW_ADVERT"),
        0x8B => Some("TELEMETRY_RESPONSE"),
        0x8C => Some("BINARY_RESPONSE"),
        _ => None,
    }
}

/// Human-readable label for a tag, falling back to the raw numeric form
pub fn tag_label(direction: Direction, tag: u8) -> String {
    match direction {
        Direction::ToRadio => command_name(tag)
            .map(str::to_string)
            .unwrap_or_else(|| format!("CMD_UNKNOWN(0x{tag:02x})")),
        Direction::FromRadio => response_name(tag)
            .map(str::to_string)
            .unwrap_or_else(|| format!("RESP_UNKNOWN(0x{tag:02x})")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_tags() {
        assert_eq!(command_name(0x01), Some("CMD_APPSTART"));
        assert_eq!(command_name(0x39), Some("CMD_REQUEST_ADVERT"));
        assert_eq!(response_name(0x05), Some("SELF_INFO"));
        assert_eq!(response_name(0x8C), Some("BINARY_RESPONSE"));
    }

    #[test]
    fn same_tag_differs_by_direction() {
        assert_eq!(tag_label(Direction::ToRadio, 0x05), "CMD_GET_TIME");
        assert_eq!(tag_label(Direction::FromRadio, 0x05), "SELF_INFO");
    }

    #[test]
    fn unknown_tags_fall_back_to_raw() {
        assert_eq!(tag_label(Direction::ToRadio, 0x7F), "CMD_UNKNOWN(0x7f)");
        assert_eq!(tag_label(Direction::FromRadio, 0xF0), "RESP_UNKNOWN(0xf0)");
    }
}
