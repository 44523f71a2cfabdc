//! Pairing for platforms without an explicit bonding API

use btleplug::api::BDAddr;
use micropad_core::PairingOutcome;
use tracing::debug;

use crate::error::BleTransportError;

use super::DevicePairer;

// ----------------------------------------------------------------------------
// Fallback Implementation
// ----------------------------------------------------------------------------

/// Leaves bonding to the OS, which pairs when the link first needs encryption
#[derive(Debug, Default, Clone, Copy)]
pub struct FallbackPairer;

#[async_trait::async_trait]
impl DevicePairer for FallbackPairer {
    async fn is_paired(&self, _address: BDAddr) -> Result<bool, BleTransportError> {
        Ok(true)
    }

    async fn pair(&self, address: BDAddr) -> Result<PairingOutcome, BleTransportError> {
        debug!("Leaving pairing with {} to the OS", address);
        Ok(PairingOutcome::AlreadyPaired)
    }
}
