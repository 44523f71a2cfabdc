//! Error types for the Micropad session layer
//!
//! Transport failures carry an [`ErrorClass`] so upstream code can tell a
//! condition worth retrying from one that needs the user to act. Protocol
//! errors never reach callers; the inbound pipeline logs and drops them.

use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Classification
// ----------------------------------------------------------------------------

/// How a failed connect attempt should be handled upstream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retry later; backoff is appropriate
    Transient,
    /// Re-pair, re-flash or check the firmware before retrying
    NeedsUserAction,
}

// ----------------------------------------------------------------------------
// Specific Error Types
// ----------------------------------------------------------------------------

/// Failures reported by a transport while opening or using a device session
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("Device {device_id} is unreachable: {reason}")]
    DeviceUnreachable { device_id: String, reason: String },

    #[error("Pairing rejected: {reason}")]
    PairingRejected { reason: String },

    #[error("Device does not expose service {service}")]
    ServiceMissing { service: String },

    #[error("Characteristic not found: {characteristic}")]
    CharacteristicMissing { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),

    #[error("BLE adapter not available: {0}")]
    AdapterUnavailable(String),

    #[error("Transport timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    #[error("Session closed")]
    SessionClosed,
}

impl TransportError {
    /// Classify this failure for retry-or-abandon decisions
    pub fn class(&self) -> ErrorClass {
        match self {
            TransportError::PairingRejected { .. }
            | TransportError::ServiceMissing { .. }
            | TransportError::CharacteristicMissing { .. }
            | TransportError::AdapterUnavailable(_) => ErrorClass::NeedsUserAction,
            TransportError::DeviceUnreachable { .. }
            | TransportError::SubscriptionFailed(_)
            | TransportError::WriteFailed(_)
            | TransportError::Timeout { .. }
            | TransportError::SessionClosed => ErrorClass::Transient,
        }
    }

    /// Create a device unreachable error
    pub fn unreachable<D: Into<String>, R: Into<String>>(device_id: D, reason: R) -> Self {
        TransportError::DeviceUnreachable {
            device_id: device_id.into(),
            reason: reason.into(),
        }
    }

    /// Create a pairing rejected error
    pub fn pairing_rejected<R: Into<String>>(reason: R) -> Self {
        TransportError::PairingRejected {
            reason: reason.into(),
        }
    }
}

/// Outcome of a failed `connect`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConnectError {
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// A newer `connect` or an explicit `disconnect` superseded this attempt
    #[error("Connect attempt was superseded")]
    Cancelled,
}

impl ConnectError {
    pub fn class(&self) -> ErrorClass {
        match self {
            ConnectError::Transport(err) => err.class(),
            ConnectError::Cancelled => ErrorClass::Transient,
        }
    }
}

/// Failure of `ConnectionManager::send`
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    #[error("Not connected")]
    NotConnected,

    #[error(transparent)]
    Transport(#[from] TransportError),
}

/// Failure of a request issued through the protocol handler
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("Not connected")]
    NotConnected,

    #[error("No response to request {id} within {timeout_ms}ms")]
    Timeout { id: u32, timeout_ms: u64 },

    #[error("Transport failure: {0}")]
    Transport(#[from] TransportError),

    #[error("Failed to serialize request: {0}")]
    Serialization(String),

    /// The completion slot was dropped without a response
    #[error("Request {id} was abandoned")]
    Abandoned { id: u32 },
}

impl RequestError {
    /// Whether the caller may reasonably retry the same request
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            RequestError::Timeout { .. } | RequestError::Abandoned { .. }
        ) || matches!(self, RequestError::Transport(err) if err.class() == ErrorClass::Transient)
    }
}

impl From<SendError> for RequestError {
    fn from(err: SendError) -> Self {
        match err {
            SendError::NotConnected => RequestError::NotConnected,
            SendError::Transport(err) => RequestError::Transport(err),
        }
    }
}

/// Inbound framing and parsing failures; logged and dropped, never surfaced
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("Malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("Malformed chunk frame: {0}")]
    MalformedChunk(String),

    #[error("Chunk total mismatch: expected {expected}, got {actual}")]
    ChunkTotalMismatch { expected: u16, actual: u16 },

    #[error("Chunk {index} arrived without a message in progress")]
    UnexpectedChunk { index: u16 },

    #[error("Reassembled message is not valid UTF-8")]
    InvalidUtf8,

    #[error("Message of {size} bytes needs more than {max} chunks")]
    TooManyChunks { size: usize, max: usize },
}

// ----------------------------------------------------------------------------
// Unified Error
// ----------------------------------------------------------------------------

/// Top-level error for the Micropad session layer
#[derive(Debug, Error)]
pub enum MicropadError {
    #[error("Connect failed: {0}")]
    Connect(#[from] ConnectError),

    #[error("Send failed: {0}")]
    Send(#[from] SendError),

    #[error("Request failed: {0}")]
    Request(#[from] RequestError),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },
}

impl MicropadError {
    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        MicropadError::Configuration {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, MicropadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_error_classification() {
        assert_eq!(
            TransportError::pairing_rejected("Rejected").class(),
            ErrorClass::NeedsUserAction
        );
        assert_eq!(
            TransportError::ServiceMissing {
                service: "config".into()
            }
            .class(),
            ErrorClass::NeedsUserAction
        );
        assert_eq!(
            TransportError::unreachable("dev", "out of range").class(),
            ErrorClass::Transient
        );
        assert_eq!(ConnectError::Cancelled.class(), ErrorClass::Transient);
    }

    #[test]
    fn test_request_error_retryable() {
        assert!(RequestError::Timeout { id: 1, timeout_ms: 5000 }.is_retryable());
        assert!(!RequestError::NotConnected.is_retryable());
        assert!(RequestError::Transport(TransportError::WriteFailed("busy".into())).is_retryable());
        assert!(!RequestError::Transport(TransportError::pairing_rejected("no")).is_retryable());
    }

    #[test]
    fn test_send_error_maps_to_request_error() {
        assert_eq!(
            RequestError::from(SendError::NotConnected),
            RequestError::NotConnected
        );
        assert_eq!(
            RequestError::from(SendError::Transport(TransportError::SessionClosed)),
            RequestError::Transport(TransportError::SessionClosed)
        );
    }
}
