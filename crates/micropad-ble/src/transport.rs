//! BLE implementation of the device transport

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::Peripheral as _;
use micropad_core::{DeviceSession, DeviceTransport, TransportError};
use tokio::sync::OnceCell;
use tracing::debug;

use crate::config::BleTransportConfig;
use crate::discovery::{BleDiscovery, DiscoveredDevice};
use crate::error::BleTransportError;
use crate::pairing::PlatformPairer;
use crate::session::BleSession;

// ----------------------------------------------------------------------------
// BLE Transport
// ----------------------------------------------------------------------------

/// Opens [`BleSession`]s on the configured adapter. The adapter is acquired
/// lazily on first use.
pub struct BleTransport {
    config: BleTransportConfig,
    discovery: OnceCell<BleDiscovery>,
    pairer: Arc<PlatformPairer>,
}

impl BleTransport {
    pub fn new(config: BleTransportConfig) -> Self {
        Self {
            config,
            discovery: OnceCell::new(),
            pairer: Arc::new(PlatformPairer::new()),
        }
    }

    pub fn config(&self) -> &BleTransportConfig {
        &self.config
    }

    async fn discovery(&self) -> Result<&BleDiscovery, BleTransportError> {
        self.discovery
            .get_or_try_init(|| BleDiscovery::initialize(self.config.clone()))
            .await
    }

    /// List nearby devices that look like a Micropad
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, TransportError> {
        Ok(self.discovery().await?.scan().await?)
    }
}

impl Default for BleTransport {
    fn default() -> Self {
        Self::new(BleTransportConfig::default())
    }
}

#[async_trait]
impl DeviceTransport for BleTransport {
    async fn open_session(&self, device_id: &str) -> Result<Box<dyn DeviceSession>, TransportError> {
        let discovery = self.discovery().await?;
        let peripheral = discovery.find_peripheral(device_id).await?;

        let name = match peripheral.properties().await {
            Ok(Some(properties)) => properties.local_name,
            Ok(None) => None,
            Err(e) => {
                debug!("No properties for {}: {}", device_id, e);
                None
            }
        };

        Ok(Box::new(BleSession::new(
            self.config.clone(),
            discovery.adapter().clone(),
            peripheral,
            name,
            self.pairer.clone(),
        )))
    }
}
