//! Error types for the BLE transport

use micropad_core::TransportError;
use thiserror::Error;

// ----------------------------------------------------------------------------
// Error Types
// ----------------------------------------------------------------------------

/// Errors specific to the BLE transport
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BleTransportError {
    #[error("BLE adapter not available: {0}")]
    AdapterNotAvailable(String),

    #[error("Device {device_id} not found")]
    DeviceNotFound { device_id: String },

    #[error("Failed to connect to {device_id}: {reason}")]
    ConnectionFailed { device_id: String, reason: String },

    #[error("Connection to {device_id} timed out after {timeout_ms}ms")]
    ConnectionTimeout { device_id: String, timeout_ms: u64 },

    #[error("Pairing failed: {0}")]
    PairingFailed(String),

    #[error("Failed to discover services: {0}")]
    ServiceDiscoveryFailed(String),

    #[error("Device does not expose the Micropad config service ({service})")]
    ServiceNotFound { service: String },

    #[error("Config {characteristic} characteristic not found")]
    CharacteristicNotFound { characteristic: String },

    #[error("Failed to subscribe to notifications: {0}")]
    SubscriptionFailed(String),

    #[error("Failed to get notifications stream: {0}")]
    NotificationStreamFailed(String),

    #[error("Failed to get BLE events: {0}")]
    EventStreamFailed(String),

    #[error("Failed to write to characteristic: {0}")]
    WriteFailed(String),
}

impl From<BleTransportError> for TransportError {
    fn from(err: BleTransportError) -> Self {
        match err {
            BleTransportError::AdapterNotAvailable(reason) => {
                TransportError::AdapterUnavailable(reason)
            }
            BleTransportError::DeviceNotFound { device_id } => {
                TransportError::unreachable(device_id, "not found; is it powered and in range?")
            }
            BleTransportError::ConnectionFailed { device_id, reason } => {
                TransportError::unreachable(device_id, reason)
            }
            BleTransportError::ConnectionTimeout { timeout_ms, .. } => TransportError::Timeout {
                duration_ms: timeout_ms,
            },
            BleTransportError::PairingFailed(reason) => TransportError::pairing_rejected(reason),
            // GATT discovery failing on a connected link is usually a dropped link
            BleTransportError::ServiceDiscoveryFailed(reason) => {
                TransportError::unreachable("device", reason)
            }
            BleTransportError::ServiceNotFound { service } => {
                TransportError::ServiceMissing { service }
            }
            BleTransportError::CharacteristicNotFound { characteristic } => {
                TransportError::CharacteristicMissing { characteristic }
            }
            BleTransportError::SubscriptionFailed(reason)
            | BleTransportError::NotificationStreamFailed(reason)
            | BleTransportError::EventStreamFailed(reason) => {
                TransportError::SubscriptionFailed(reason)
            }
            BleTransportError::WriteFailed(reason) => TransportError::WriteFailed(reason),
        }
    }
}
