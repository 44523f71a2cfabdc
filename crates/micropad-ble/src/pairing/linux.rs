//! Linux pairing through bluer (BlueZ)

use btleplug::api::BDAddr;
use micropad_core::PairingOutcome;
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::error::BleTransportError;

use super::DevicePairer;

// ----------------------------------------------------------------------------
// Linux Implementation
// ----------------------------------------------------------------------------

pub struct LinuxPairer {
    adapter: OnceCell<bluer::Adapter>,
}

impl LinuxPairer {
    pub fn new() -> Self {
        Self {
            adapter: OnceCell::new(),
        }
    }

    async fn adapter(&self) -> Result<&bluer::Adapter, BleTransportError> {
        self.adapter
            .get_or_try_init(|| async {
                let session = bluer::Session::new().await.map_err(|e| {
                    BleTransportError::AdapterNotAvailable(format!("BlueZ session: {}", e))
                })?;
                session.default_adapter().await.map_err(|e| {
                    BleTransportError::AdapterNotAvailable(format!("BLE adapter: {}", e))
                })
            })
            .await
    }

    async fn device(&self, address: BDAddr) -> Result<bluer::Device, BleTransportError> {
        let adapter = self.adapter().await?;
        adapter
            .device(bluer::Address(address.into_inner()))
            .map_err(|e| BleTransportError::PairingFailed(format!("Unknown device {}: {}", address, e)))
    }
}

impl Default for LinuxPairer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DevicePairer for LinuxPairer {
    async fn is_paired(&self, address: BDAddr) -> Result<bool, BleTransportError> {
        let device = self.device(address).await?;
        device
            .is_paired()
            .await
            .map_err(|e| BleTransportError::PairingFailed(format!("Pairing state unavailable: {}", e)))
    }

    async fn pair(&self, address: BDAddr) -> Result<PairingOutcome, BleTransportError> {
        let device = self.device(address).await?;

        match device.pair().await {
            Ok(()) => {
                info!("Paired with {}", address);
            }
            Err(e) if matches!(e.kind, bluer::ErrorKind::AlreadyExists) => {
                debug!("{} was already paired", address);
                return Ok(PairingOutcome::AlreadyPaired);
            }
            Err(e) => {
                return Err(BleTransportError::PairingFailed(e.to_string()));
            }
        }

        // Trust so BlueZ reconnects without prompting
        if let Err(e) = device.set_trusted(true).await {
            debug!("Failed to mark {} trusted: {}", address, e);
        }

        Ok(PairingOutcome::Paired)
    }
}
