//! Transport abstraction consumed by the connection manager
//!
//! A transport opens a [`DeviceSession`] for a device id. The session exposes
//! the individual steps of a connect (pairing, channel resolution,
//! notification subscription) so the connection manager can sequence them,
//! check for cancellation in between and tear down on failure. Inbound data
//! and link loss are pushed into a channel instead of invoking callbacks.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::errors::TransportError;

// ----------------------------------------------------------------------------
// Session Signals
// ----------------------------------------------------------------------------

/// Asynchronous notifications from an open session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionSignal {
    /// Bytes received on the event characteristic
    Data(Vec<u8>),
    /// The link dropped underneath the session
    Disconnected,
}

/// Result of a pairing attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingOutcome {
    Paired,
    AlreadyPaired,
}

// ----------------------------------------------------------------------------
// Transport Traits
// ----------------------------------------------------------------------------

/// Factory for device sessions
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    /// Open a handle to the device; no pairing or GATT work happens yet
    async fn open_session(&self, device_id: &str) -> Result<Box<dyn DeviceSession>, TransportError>;
}

/// One logical link to a device
#[async_trait]
pub trait DeviceSession: Send + Sync {
    /// Human-readable device name, if the transport knows one
    fn device_name(&self) -> Option<String>;

    /// Whether the OS already trusts this device
    async fn is_paired(&self) -> Result<bool, TransportError>;

    /// Trust-on-first-use pairing; no passkey exchange
    async fn pair(&self) -> Result<PairingOutcome, TransportError>;

    /// Resolve the command-write and event-notify handles
    async fn resolve_channels(&self) -> Result<(), TransportError>;

    /// Start delivering notifications and link loss into `sink`
    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<SessionSignal>,
    ) -> Result<(), TransportError>;

    /// Write one buffer to the command channel
    async fn write(&self, data: &[u8]) -> Result<(), TransportError>;

    /// Release every handle held by the session; safe to call more than once
    async fn close(&self);
}
