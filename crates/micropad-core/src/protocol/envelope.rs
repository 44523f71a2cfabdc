//! Protocol envelope carried over the command and event characteristics
//!
//! One [`Envelope`] is one logical message. On the wire it is a JSON object:
//!
//! ```text
//! { "v":1, "type":"request|response|event", "id":<int>, "ts":<int>,
//!   "cmd":<string>, "event":<string>, "payload":<document>,
//!   "profileId":<int>, "profile":<document> }
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::ProtocolError;

/// Current protocol version
pub const PROTOCOL_VERSION: u32 = 1;

fn default_version() -> u32 {
    PROTOCOL_VERSION
}

// ----------------------------------------------------------------------------
// Message Type
// ----------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Request,
    Response,
    Event,
}

// ----------------------------------------------------------------------------
// Commands
// ----------------------------------------------------------------------------

/// Commands understood by the device firmware
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Command {
    GetDeviceInfo,
    ListProfiles,
    GetProfile,
    SetProfile,
    SetActiveProfile,
    GetStats,
    FactoryReset,
    Reboot,
    /// Any command name this build does not know about
    Unknown(String),
}

impl Command {
    pub fn as_str(&self) -> &str {
        match self {
            Command::GetDeviceInfo => "getDeviceInfo",
            Command::ListProfiles => "listProfiles",
            Command::GetProfile => "getProfile",
            Command::SetProfile => "setProfile",
            Command::SetActiveProfile => "setActiveProfile",
            Command::GetStats => "getStats",
            Command::FactoryReset => "factoryReset",
            Command::Reboot => "reboot",
            Command::Unknown(name) => name,
        }
    }
}

impl From<String> for Command {
    fn from(name: String) -> Self {
        match name.as_str() {
            "getDeviceInfo" => Command::GetDeviceInfo,
            "listProfiles" => Command::ListProfiles,
            "getProfile" => Command::GetProfile,
            "setProfile" => Command::SetProfile,
            "setActiveProfile" => Command::SetActiveProfile,
            "getStats" => Command::GetStats,
            "factoryReset" => Command::FactoryReset,
            "reboot" => Command::Reboot,
            _ => Command::Unknown(name),
        }
    }
}

impl From<Command> for String {
    fn from(command: Command) -> Self {
        match command {
            Command::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Events
// ----------------------------------------------------------------------------

/// Unsolicited events pushed by the device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EventKind {
    /// The active profile changed; payload carries `profileId`
    ProfileChanged,
    Unknown(String),
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            EventKind::ProfileChanged => "profileChanged",
            EventKind::Unknown(name) => name,
        }
    }
}

impl From<String> for EventKind {
    fn from(name: String) -> Self {
        match name.as_str() {
            "profileChanged" => EventKind::ProfileChanged,
            _ => EventKind::Unknown(name),
        }
    }
}

impl From<EventKind> for String {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::Unknown(name) => name,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ----------------------------------------------------------------------------
// Envelope
// ----------------------------------------------------------------------------

/// One request, response or event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "v", default = "default_version")]
    pub version: u32,

    #[serde(rename = "type")]
    pub message_type: MessageType,

    /// Request id; events from the device carry no id and decode as 0
    #[serde(default)]
    pub id: u32,

    #[serde(rename = "ts", default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<u64>,

    #[serde(rename = "cmd", default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Command>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<EventKind>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,

    #[serde(rename = "profileId", default, skip_serializing_if = "Option::is_none")]
    pub profile_id: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profile: Option<Value>,
}

impl Envelope {
    fn bare(message_type: MessageType, id: u32) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            message_type,
            id,
            timestamp: None,
            command: None,
            event: None,
            payload: None,
            profile_id: None,
            profile: None,
        }
    }

    /// Create a request; the protocol handler assigns the id when it is sent
    pub fn request(command: Command) -> Self {
        Self {
            command: Some(command),
            ..Self::bare(MessageType::Request, 0)
        }
    }

    /// Create a response to the request with the given id
    pub fn response(id: u32, payload: Value) -> Self {
        Self {
            payload: Some(payload),
            ..Self::bare(MessageType::Response, id)
        }
    }

    /// Create an event envelope
    pub fn event(kind: EventKind, payload: Value) -> Self {
        Self {
            event: Some(kind),
            payload: Some(payload),
            ..Self::bare(MessageType::Event, 0)
        }
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_profile_id(mut self, profile_id: u32) -> Self {
        self.profile_id = Some(profile_id);
        self
    }

    pub fn with_profile(mut self, profile: Value) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Look up a top-level field of the payload document
    pub fn payload_field(&self, key: &str) -> Option<&Value> {
        self.payload.as_ref().and_then(|payload| payload.get(key))
    }

    /// Profile id announced by a `profileChanged` event
    pub fn profile_changed(&self) -> Option<u32> {
        if self.event != Some(EventKind::ProfileChanged) {
            return None;
        }
        self.payload_field("profileId")
            .and_then(Value::as_u64)
            .and_then(|id| u32::try_from(id).ok())
    }

    /// Serialize to the JSON wire form
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Parse the JSON wire form
    pub fn from_json(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::MalformedEnvelope(e.to_string()))
    }
}
