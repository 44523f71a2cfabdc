//! Connection lifecycle: state machine, reconnect backoff and the raw
//! message channel to the device

pub mod connection;
pub mod state;

pub use connection::{ConnectionManager, SessionEvent};
pub use state::{Backoff, ConnectionState, ReconnectStatus};
