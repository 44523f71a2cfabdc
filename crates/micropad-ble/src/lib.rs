//! Bluetooth Low Energy transport for Micropad devices
//!
//! Implements [`micropad_core::DeviceTransport`] over btleplug. The device
//! exposes one config service with a command characteristic the host writes
//! to and an event characteristic the device notifies on. Pairing is
//! trust-on-first-use and goes through BlueZ on Linux.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod discovery;
pub mod error;
pub mod pairing;
pub mod protocol;
pub mod session;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::BleTransportConfig;
pub use discovery::DiscoveredDevice;
pub use error::BleTransportError;
pub use protocol::{COMMAND_CHARACTERISTIC_UUID, CONFIG_SERVICE_UUID, EVENT_CHARACTERISTIC_UUID};
pub use session::BleSession;
pub use transport::BleTransport;
