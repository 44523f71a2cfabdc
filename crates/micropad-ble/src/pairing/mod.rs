//! Cross-platform pairing trait and platform detection
//!
//! btleplug has no bonding API, so pairing goes through the platform stack
//! directly where one is wired up. Elsewhere the OS pairs on demand the first
//! time an encrypted characteristic is touched.

pub mod fallback;
#[cfg(target_os = "linux")]
pub mod linux;

use btleplug::api::BDAddr;
use micropad_core::PairingOutcome;

use crate::error::BleTransportError;

// ----------------------------------------------------------------------------
// Cross-platform Pairing Trait
// ----------------------------------------------------------------------------

/// Trust-on-first-use pairing with a device identified by address
#[async_trait::async_trait]
pub trait DevicePairer: Send + Sync {
    /// Whether the OS already holds a bond for this device
    async fn is_paired(&self, address: BDAddr) -> Result<bool, BleTransportError>;

    /// Pair without passkey or PIN exchange
    async fn pair(&self, address: BDAddr) -> Result<PairingOutcome, BleTransportError>;
}

// ----------------------------------------------------------------------------
// Platform Detection and Factory
// ----------------------------------------------------------------------------

/// Platform-specific pairer enum
pub enum PlatformPairer {
    #[cfg(target_os = "linux")]
    Linux(linux::LinuxPairer),
    #[allow(dead_code)]
    Fallback(fallback::FallbackPairer),
}

impl PlatformPairer {
    /// Create the appropriate pairer for the current platform
    pub fn new() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::Linux(linux::LinuxPairer::new())
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::Fallback(fallback::FallbackPairer)
        }
    }
}

impl Default for PlatformPairer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DevicePairer for PlatformPairer {
    async fn is_paired(&self, address: BDAddr) -> Result<bool, BleTransportError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(pairer) => pairer.is_paired(address).await,
            Self::Fallback(pairer) => pairer.is_paired(address).await,
        }
    }

    async fn pair(&self, address: BDAddr) -> Result<PairingOutcome, BleTransportError> {
        match self {
            #[cfg(target_os = "linux")]
            Self::Linux(pairer) => pairer.pair(address).await,
            Self::Fallback(pairer) => pairer.pair(address).await,
        }
    }
}
