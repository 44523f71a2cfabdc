//! Micropad Device Session Layer
//!
//! Maintains a session with one Micropad macro keypad over a write-limited
//! transport: the connection state machine with pairing and auto-reconnect,
//! and the protocol handler that correlates requests with responses,
//! reassembles chunked messages and fans out device events.
//!
//! Concrete transports implement [`DeviceTransport`]; the BLE implementation
//! lives in the `micropad-ble` crate.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod config;
pub mod errors;
pub mod models;
pub mod poller;
pub mod protocol;
pub mod session;
pub mod transport;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use config::SessionConfig;
pub use errors::{
    ConnectError, ErrorClass, MicropadError, ProtocolError, RequestError, Result, SendError,
    TransportError,
};
pub use models::{
    ActionType, CommandAck, DeviceInfo, DeviceStats, EncoderConfig, KeyConfig, Profile,
    ProfileSummary,
};
pub use poller::StatsPoller;
pub use protocol::{Command, Envelope, EventKind, MessageType, ProtocolHandler};
pub use session::{ConnectionManager, ConnectionState, ReconnectStatus, SessionEvent};
pub use transport::{DeviceSession, DeviceTransport, PairingOutcome, SessionSignal};
