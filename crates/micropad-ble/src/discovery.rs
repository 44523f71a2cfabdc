//! Adapter setup and device lookup

use btleplug::api::{Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use futures::stream::StreamExt;
use tokio::time::{sleep, timeout};
use tracing::{debug, info};

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::protocol::{is_micropad_name, matches_device_id, CONFIG_SERVICE_UUID};

// ----------------------------------------------------------------------------
// Discovered Devices
// ----------------------------------------------------------------------------

/// A nearby Micropad seen during a scan
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct DiscoveredDevice {
    /// Bluetooth address, usable as a device id
    pub address: String,
    pub name: Option<String>,
    pub rssi: Option<i16>,
}

// ----------------------------------------------------------------------------
// Discovery Implementation
// ----------------------------------------------------------------------------

/// Owns the host adapter and resolves device ids to peripherals
pub struct BleDiscovery {
    config: BleTransportConfig,
    adapter: Adapter,
}

impl BleDiscovery {
    /// Open the configured adapter
    pub async fn initialize(config: BleTransportConfig) -> Result<Self, BleTransportError> {
        let manager = Manager::new().await.map_err(|e| {
            BleTransportError::AdapterNotAvailable(format!("Failed to create BLE manager: {}", e))
        })?;

        let adapters = manager.adapters().await.map_err(|e| {
            BleTransportError::AdapterNotAvailable(format!("Failed to get BLE adapters: {}", e))
        })?;

        let adapter = adapters.get(config.adapter_index).cloned().ok_or_else(|| {
            BleTransportError::AdapterNotAvailable(format!(
                "No BLE adapter at index {} ({} available)",
                config.adapter_index,
                adapters.len()
            ))
        })?;

        info!("BLE adapter {} initialized", config.adapter_index);
        Ok(Self { config, adapter })
    }

    pub fn adapter(&self) -> &Adapter {
        &self.adapter
    }

    /// Resolve a device id, scanning if the adapter has not seen it yet
    pub async fn find_peripheral(&self, device_id: &str) -> Result<Peripheral, BleTransportError> {
        if let Some(peripheral) = self.known_peripheral(device_id).await {
            debug!("Device {} already known to the adapter", device_id);
            return Ok(peripheral);
        }

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(|e| BleTransportError::ConnectionFailed {
                device_id: device_id.to_string(),
                reason: format!("Failed to start BLE scan: {}", e),
            })?;
        debug!("Scanning for device {}", device_id);

        let found = timeout(self.config.scan_timeout, async {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) = event
                {
                    if let Ok(peripheral) = self.adapter.peripheral(&id).await {
                        if Self::is_target(&peripheral, device_id) {
                            return Some(peripheral);
                        }
                    }
                }
            }
            None
        })
        .await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop BLE scan: {}", e);
        }

        match found {
            Ok(Some(peripheral)) => Ok(peripheral),
            _ => Err(BleTransportError::DeviceNotFound {
                device_id: device_id.to_string(),
            }),
        }
    }

    /// Scan for the configured duration and list devices that look like a Micropad
    pub async fn scan(&self) -> Result<Vec<DiscoveredDevice>, BleTransportError> {
        let filter = ScanFilter {
            services: vec![CONFIG_SERVICE_UUID],
        };
        self.adapter
            .start_scan(filter)
            .await
            .map_err(|e| BleTransportError::AdapterNotAvailable(format!("Failed to start BLE scan: {}", e)))?;

        info!("Scanning for Micropad devices for {:?}", self.config.scan_timeout);
        sleep(self.config.scan_timeout).await;

        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop BLE scan: {}", e);
        }

        let peripherals = self
            .adapter
            .peripherals()
            .await
            .map_err(|e| BleTransportError::AdapterNotAvailable(e.to_string()))?;

        let mut devices = Vec::new();
        for peripheral in peripherals {
            let Ok(Some(properties)) = peripheral.properties().await else {
                continue;
            };

            let advertises_service = properties.services.contains(&CONFIG_SERVICE_UUID);
            let named_like_micropad = properties
                .local_name
                .as_deref()
                .is_some_and(|name| is_micropad_name(name, &self.config.device_name_prefix));

            if advertises_service || named_like_micropad {
                devices.push(DiscoveredDevice {
                    address: peripheral.address().to_string(),
                    name: properties.local_name,
                    rssi: properties.rssi,
                });
            }
        }

        Ok(devices)
    }

    async fn known_peripheral(&self, device_id: &str) -> Option<Peripheral> {
        let peripherals = self.adapter.peripherals().await.ok()?;
        peripherals
            .into_iter()
            .find(|peripheral| Self::is_target(peripheral, device_id))
    }

    fn is_target(peripheral: &Peripheral, device_id: &str) -> bool {
        matches_device_id(
            device_id,
            peripheral.address(),
            &format!("{:?}", peripheral.id()),
        )
    }
}
