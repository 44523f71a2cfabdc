//! Typed documents exchanged with the device
//!
//! Decoding is tolerant: every field has a default so a payload missing a
//! field still decodes, and unknown fields are ignored.

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ----------------------------------------------------------------------------
// Device Info
// ----------------------------------------------------------------------------

/// Response payload of `getDeviceInfo`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceInfo {
    pub device_id: String,
    pub firmware_version: String,
    pub hardware_version: String,
    /// Battery charge in percent
    pub battery_level: u8,
    pub capabilities: Vec<String>,
    /// Seconds since boot
    pub uptime: u64,
    pub free_heap: u64,
}

// ----------------------------------------------------------------------------
// Profiles
// ----------------------------------------------------------------------------

/// Entry of the `listProfiles` response
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileSummary {
    pub id: u32,
    pub name: String,
    /// Stored size in bytes
    pub size: u64,
}

/// What a key does when pressed; mirrors the firmware's integer codes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum ActionType {
    #[default]
    None,
    Hotkey,
    Macro,
    Text,
    Media,
    Mouse,
    Layer,
    Profile,
    App,
    Url,
    /// A code introduced by newer firmware
    Unknown(i32),
}

impl From<i32> for ActionType {
    fn from(code: i32) -> Self {
        match code {
            0 => ActionType::None,
            1 => ActionType::Hotkey,
            2 => ActionType::Macro,
            3 => ActionType::Text,
            4 => ActionType::Media,
            5 => ActionType::Mouse,
            6 => ActionType::Layer,
            7 => ActionType::Profile,
            8 => ActionType::App,
            9 => ActionType::Url,
            other => ActionType::Unknown(other),
        }
    }
}

impl From<ActionType> for i32 {
    fn from(action: ActionType) -> Self {
        match action {
            ActionType::None => 0,
            ActionType::Hotkey => 1,
            ActionType::Macro => 2,
            ActionType::Text => 3,
            ActionType::Media => 4,
            ActionType::Mouse => 5,
            ActionType::Layer => 6,
            ActionType::Profile => 7,
            ActionType::App => 8,
            ActionType::Url => 9,
            ActionType::Unknown(code) => code,
        }
    }
}

/// Per-key action; only the fields relevant to `action_type` are meaningful
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct KeyConfig {
    pub index: u32,
    #[serde(rename = "type")]
    pub action_type: ActionType,
    /// Hotkey modifier bits: 0x01 Ctrl, 0x02 Shift, 0x04 Alt, 0x08 Win
    pub modifiers: u8,
    /// HID usage code for hotkeys
    pub key: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Media function code
    pub function: i32,
    /// Mouse action code
    pub action: i32,
    pub value: i32,
    pub profile_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub macro_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncoderConfig {
    pub index: u32,
    pub acceleration: bool,
    pub steps_per_detent: u32,
}

/// Full profile document as returned by `getProfile` and sent by `setProfile`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Profile {
    pub id: u32,
    pub name: String,
    pub version: u32,
    pub keys: Vec<KeyConfig>,
    pub encoders: Vec<EncoderConfig>,
}

impl Default for Profile {
    fn default() -> Self {
        Self {
            id: 0,
            name: "Unnamed".to_string(),
            version: 1,
            keys: Vec::new(),
            encoders: Vec::new(),
        }
    }
}

impl Profile {
    pub fn key(&self, index: u32) -> Option<&KeyConfig> {
        self.keys.iter().find(|key| key.index == index)
    }
}

// ----------------------------------------------------------------------------
// Statistics
// ----------------------------------------------------------------------------

/// Response payload of `getStats`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DeviceStats {
    /// Press count per key index
    pub key_presses: Vec<u64>,
    /// Detent count per encoder index
    pub encoder_turns: Vec<i64>,
    /// Seconds since boot
    pub uptime: u64,
}

impl DeviceStats {
    pub fn total_key_presses(&self) -> u64 {
        self.key_presses.iter().sum()
    }
}

// ----------------------------------------------------------------------------
// Acknowledgements
// ----------------------------------------------------------------------------

/// Outcome of a command whose response carries no data
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandAck {
    pub success: bool,
    pub error: Option<String>,
}

impl CommandAck {
    /// Decode a response payload. An explicit `success` wins; otherwise the
    /// command succeeded unless an `error` is present.
    pub fn from_payload(payload: Option<&Value>) -> Self {
        let error = payload
            .and_then(|p| p.get("error"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let success = payload
            .and_then(|p| p.get("success"))
            .and_then(Value::as_bool)
            .unwrap_or(error.is_none());

        Self { success, error }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_device_info_tolerates_missing_fields() {
        let info: DeviceInfo =
            serde_json::from_value(json!({"deviceId": "abc", "batteryLevel": 87})).unwrap();
        assert_eq!(info.device_id, "abc");
        assert_eq!(info.battery_level, 87);
        assert!(info.firmware_version.is_empty());
        assert!(info.capabilities.is_empty());
    }

    #[test]
    fn test_profile_from_firmware_payload() {
        let payload = json!({
            "id": 2,
            "name": "Editing",
            "version": 1,
            "keys": [
                {"index": 0, "type": 1, "modifiers": 1, "key": 6},
                {"index": 1, "type": 3, "text": "hello"},
                {"index": 2, "type": 42}
            ],
            "encoders": [{"index": 0, "acceleration": true, "stepsPerDetent": 4}]
        });
        let profile: Profile = serde_json::from_value(payload).unwrap();

        assert_eq!(profile.name, "Editing");
        assert_eq!(profile.key(0).unwrap().action_type, ActionType::Hotkey);
        assert_eq!(profile.key(1).unwrap().text.as_deref(), Some("hello"));
        assert_eq!(profile.key(2).unwrap().action_type, ActionType::Unknown(42));
        assert_eq!(profile.encoders[0].steps_per_detent, 4);
    }

    #[test]
    fn test_key_config_serializes_camel_case() {
        let key = KeyConfig {
            index: 3,
            action_type: ActionType::Profile,
            profile_id: 1,
            ..Default::default()
        };
        let value = serde_json::to_value(&key).unwrap();
        assert_eq!(value["type"], json!(7));
        assert_eq!(value["profileId"], json!(1));
        assert!(value.get("text").is_none());
    }

    #[test]
    fn test_command_ack_decoding() {
        assert!(CommandAck::from_payload(Some(&json!({"success": true}))).success);
        assert!(CommandAck::from_payload(Some(&json!({"profileId": 2}))).success);
        assert!(CommandAck::from_payload(None).success);

        let failed = CommandAck::from_payload(Some(&json!({
            "success": false,
            "error": "Profile not found"
        })));
        assert!(!failed.success);
        assert_eq!(failed.error.as_deref(), Some("Profile not found"));

        assert!(!CommandAck::from_payload(Some(&json!({"error": "busy"}))).success);
    }

    #[test]
    fn test_stats_totals() {
        let stats: DeviceStats = serde_json::from_value(json!({
            "keyPresses": [1, 2, 3],
            "encoderTurns": [-4, 5],
            "uptime": 60
        }))
        .unwrap();
        assert_eq!(stats.total_key_presses(), 6);
        assert_eq!(stats.encoder_turns, vec![-4, 5]);
    }
}
