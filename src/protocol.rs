//! Fixed RPC request templates and the response field parser
//!
//! The peripherals speak a Gen2-style RPC over the framed link: one request
//! frame out, one single-line JSON-shaped response back. The parser below is
//! deliberately loose — plain substring search, no escaping, no nesting —
//! matching what the devices actually emit for the handful of keys we read.

use std::fmt;

/// Read-only device identification query (diagnostic).
pub const REQ_DEVICE_INFO: &str = r#"{"id":1,"src":"switchfleet","method":"Shelly.GetDeviceInfo"}"#;

/// Read-only Wi-Fi status query (diagnostic).
pub const REQ_WIFI_STATUS: &str = r#"{"id":2,"src":"switchfleet","method":"Wifi.GetStatus"}"#;

/// Read-only switch telemetry query for sub-switch 0.
pub const REQ_SWITCH_STATUS: &str =
    r#"{"id":3,"src":"switchfleet","method":"Switch.GetStatus","params":{"id":0}}"#;

/// Turn sub-switch 0 on.
pub const REQ_SWITCH_ON: &str =
    r#"{"id":4,"src":"switchfleet","method":"Switch.Set","params":{"id":0,"on":true}}"#;

/// Turn sub-switch 0 off.
pub const REQ_SWITCH_OFF: &str =
    r#"{"id":5,"src":"switchfleet","method":"Switch.Set","params":{"id":0,"on":false}}"#;

/// Observed state of a switch output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SwitchState {
    On = 0,
    Off = 1,
    /// Sentinel: never observed, or deliberately forgotten after a local
    /// command so the next poll is not reported as an external change.
    Unknown = 2,
}

impl SwitchState {
    pub fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SwitchState::On,
            1 => SwitchState::Off,
            _ => SwitchState::Unknown,
        }
    }
}

impl fmt::Display for SwitchState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SwitchState::On => write!(f, "ON"),
            SwitchState::Off => write!(f, "OFF"),
            SwitchState::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Extract the raw text of a named field from a response.
///
/// `key` carries its own quotes and colon (e.g. `"voltage":`). The value is
/// the text strictly between the first `:` at the key and the first `,` after
/// it. Returns an empty string when the key is absent, and also when the
/// field is the last one in the object (no trailing comma) — a known
/// limitation of this parser; none of the keys we read sit last in practice.
pub fn extract_field(key: &str, response: &str) -> String {
    let Some(start) = response.find(key) else {
        return String::new();
    };
    let rest = &response[start..];
    let Some(colon) = rest.find(':') else {
        return String::new();
    };
    let value = &rest[colon + 1..];
    match value.find(',') {
        Some(comma) => value[..comma].to_string(),
        None => String::new(),
    }
}

pub fn voltage(response: &str) -> String {
    extract_field("\"voltage\":", response)
}

pub fn current(response: &str) -> String {
    extract_field("\"current\":", response)
}

pub fn power(response: &str) -> String {
    extract_field("\"apower\":", response)
}

/// Map the boolean-like `output` field. Only a literal `true` counts as ON;
/// anything else, including a missing key, reads as OFF.
pub fn switch_state(response: &str) -> SwitchState {
    if extract_field("\"output\":", response) == "true" {
        SwitchState::On
    } else {
        SwitchState::Off
    }
}
