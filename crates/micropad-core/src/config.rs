//! Session layer configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol::chunking::{DEFAULT_CHUNK_PAYLOAD_BUDGET, TRANSPORT_WRITE_LIMIT};

// ----------------------------------------------------------------------------
// Constants
// ----------------------------------------------------------------------------

/// Hard deadline for a request, measured from send time
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// First reconnect delay
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_secs(1);

/// Upper bound on the reconnect delay
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Pause between pairing and GATT handle resolution
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Pacing between consecutive chunk writes
pub const DEFAULT_INTER_CHUNK_DELAY: Duration = Duration::from_millis(10);

// ----------------------------------------------------------------------------
// Configuration
// ----------------------------------------------------------------------------

/// Configuration for the connection manager and protocol handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Deadline for every request
    pub request_timeout: Duration,
    /// Whether to reconnect automatically after an unexpected link loss
    pub auto_reconnect: bool,
    /// Delay before the first reconnect attempt
    pub initial_backoff: Duration,
    /// Cap for the doubling reconnect delay
    pub max_backoff: Duration,
    /// Delay after pairing before resolving service handles
    pub settle_delay: Duration,
    /// Messages longer than this many UTF-8 bytes are chunked
    pub write_limit: usize,
    /// Raw bytes of the serialized envelope carried by each chunk
    pub chunk_payload_budget: usize,
    /// Delay between consecutive chunk writes
    pub inter_chunk_delay: Duration,
    /// Capacity of the broadcast channels carrying session and device events
    pub event_channel_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            auto_reconnect: true,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            max_backoff: DEFAULT_MAX_BACKOFF,
            settle_delay: DEFAULT_SETTLE_DELAY,
            write_limit: TRANSPORT_WRITE_LIMIT,
            chunk_payload_budget: DEFAULT_CHUNK_PAYLOAD_BUDGET,
            inter_chunk_delay: DEFAULT_INTER_CHUNK_DELAY,
            event_channel_capacity: 256,
        }
    }
}

impl SessionConfig {
    /// Create a new configuration with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the request deadline
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Enable or disable auto-reconnect
    pub fn with_auto_reconnect(mut self, enabled: bool) -> Self {
        self.auto_reconnect = enabled;
        self
    }

    /// Set the initial and maximum reconnect delays
    pub fn with_backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.initial_backoff = initial;
        self.max_backoff = max;
        self
    }

    /// Set the post-pairing settle delay
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the transport write limit
    pub fn with_write_limit(mut self, limit: usize) -> Self {
        self.write_limit = limit;
        self
    }

    /// Set the raw payload budget per chunk
    pub fn with_chunk_payload_budget(mut self, budget: usize) -> Self {
        self.chunk_payload_budget = budget;
        self
    }

    /// Set the pacing between chunk writes
    pub fn with_inter_chunk_delay(mut self, delay: Duration) -> Self {
        self.inter_chunk_delay = delay;
        self
    }

    /// Check that the values can drive a session
    pub fn validate(&self) -> crate::Result<()> {
        if self.request_timeout.is_zero() {
            return Err(crate::MicropadError::config_error(
                "request_timeout must be non-zero",
            ));
        }
        if self.initial_backoff.is_zero() || self.initial_backoff > self.max_backoff {
            return Err(crate::MicropadError::config_error(
                "initial_backoff must be non-zero and not exceed max_backoff",
            ));
        }
        if self.write_limit == 0 {
            return Err(crate::MicropadError::config_error("write_limit must be non-zero"));
        }
        if self.chunk_payload_budget == 0 {
            return Err(crate::MicropadError::config_error(
                "chunk_payload_budget must be non-zero",
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::MicropadError::config_error(
                "event_channel_capacity must be non-zero",
            ));
        }
        Ok(())
    }
}
