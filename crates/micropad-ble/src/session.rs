//! GATT session with one Micropad

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, CentralEvent, Characteristic, Peripheral as _, WriteType};
use btleplug::platform::{Adapter, Peripheral};
use futures::stream::StreamExt;
use micropad_core::{DeviceSession, PairingOutcome, SessionSignal, TransportError};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::BleTransportConfig;
use crate::error::BleTransportError;
use crate::pairing::{DevicePairer, PlatformPairer};
use crate::protocol::{COMMAND_CHARACTERISTIC_UUID, CONFIG_SERVICE_UUID, EVENT_CHARACTERISTIC_UUID};

/// Resolved handles of the config service
#[derive(Debug, Clone)]
struct ConfigChannels {
    command: Characteristic,
    event: Characteristic,
}

// ----------------------------------------------------------------------------
// BLE Session
// ----------------------------------------------------------------------------

/// One link to a Micropad over btleplug
pub struct BleSession {
    config: BleTransportConfig,
    adapter: Adapter,
    peripheral: Peripheral,
    address: BDAddr,
    name: Option<String>,
    pairer: Arc<PlatformPairer>,
    channels: RwLock<Option<ConfigChannels>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl BleSession {
    pub fn new(
        config: BleTransportConfig,
        adapter: Adapter,
        peripheral: Peripheral,
        name: Option<String>,
        pairer: Arc<PlatformPairer>,
    ) -> Self {
        let address = peripheral.address();
        Self {
            config,
            adapter,
            peripheral,
            address,
            name,
            pairer,
            channels: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        }
    }

    async fn connect_link(&self) -> Result<(), BleTransportError> {
        if self.peripheral.is_connected().await.unwrap_or(false) {
            return Ok(());
        }

        let device_id = self.address.to_string();
        match timeout(self.config.connection_timeout, self.peripheral.connect()).await {
            Ok(Ok(())) => {
                info!("Connected to {}", device_id);
                Ok(())
            }
            Ok(Err(e)) => Err(BleTransportError::ConnectionFailed {
                device_id,
                reason: e.to_string(),
            }),
            Err(_) => Err(BleTransportError::ConnectionTimeout {
                device_id,
                timeout_ms: self.config.connection_timeout.as_millis() as u64,
            }),
        }
    }

    async fn find_channels(&self) -> Result<ConfigChannels, BleTransportError> {
        self.peripheral
            .discover_services()
            .await
            .map_err(|e| BleTransportError::ServiceDiscoveryFailed(e.to_string()))?;

        let services = self.peripheral.services();
        let service = services
            .iter()
            .find(|s| s.uuid == CONFIG_SERVICE_UUID)
            .ok_or_else(|| BleTransportError::ServiceNotFound {
                service: CONFIG_SERVICE_UUID.to_string(),
            })?;

        let find = |uuid: Uuid, label: &str| {
            service
                .characteristics
                .iter()
                .find(|c| c.uuid == uuid)
                .cloned()
                .ok_or_else(|| BleTransportError::CharacteristicNotFound {
                    characteristic: label.to_string(),
                })
        };

        Ok(ConfigChannels {
            command: find(COMMAND_CHARACTERISTIC_UUID, "command")?,
            event: find(EVENT_CHARACTERISTIC_UUID, "event")?,
        })
    }

    async fn channels(&self) -> Result<ConfigChannels, TransportError> {
        self.channels
            .read()
            .await
            .clone()
            .ok_or(TransportError::SessionClosed)
    }
}

#[async_trait]
impl DeviceSession for BleSession {
    fn device_name(&self) -> Option<String> {
        self.name.clone()
    }

    async fn is_paired(&self) -> Result<bool, TransportError> {
        Ok(self.pairer.is_paired(self.address).await?)
    }

    async fn pair(&self) -> Result<PairingOutcome, TransportError> {
        Ok(self.pairer.pair(self.address).await?)
    }

    async fn resolve_channels(&self) -> Result<(), TransportError> {
        self.connect_link().await?;
        let channels = self.find_channels().await?;
        debug!("Resolved config channels on {}", self.address);
        *self.channels.write().await = Some(channels);
        Ok(())
    }

    async fn subscribe(
        &self,
        sink: mpsc::UnboundedSender<SessionSignal>,
    ) -> Result<(), TransportError> {
        let channels = self.channels().await?;

        self.peripheral
            .subscribe(&channels.event)
            .await
            .map_err(|e| BleTransportError::SubscriptionFailed(e.to_string()))?;

        let mut notifications = self
            .peripheral
            .notifications()
            .await
            .map_err(|e| BleTransportError::NotificationStreamFailed(e.to_string()))?;

        let mut events = self
            .adapter
            .events()
            .await
            .map_err(|e| BleTransportError::EventStreamFailed(e.to_string()))?;

        let data_sink = sink.clone();
        let notify_task = tokio::spawn(async move {
            while let Some(notification) = notifications.next().await {
                if notification.uuid != EVENT_CHARACTERISTIC_UUID {
                    continue;
                }
                if data_sink.send(SessionSignal::Data(notification.value)).is_err() {
                    return;
                }
            }
            debug!("Notification stream ended");
            let _ = data_sink.send(SessionSignal::Disconnected);
        });

        let peripheral_id = self.peripheral.id();
        let address = self.address;
        let link_task = tokio::spawn(async move {
            while let Some(event) = events.next().await {
                if let CentralEvent::DeviceDisconnected(id) = event {
                    if id == peripheral_id {
                        warn!("Link to {} dropped", address);
                        let _ = sink.send(SessionSignal::Disconnected);
                        return;
                    }
                }
            }
        });

        self.tasks.lock().await.extend([notify_task, link_task]);
        Ok(())
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        let channels = self.channels().await?;
        self.peripheral
            .write(&channels.command, data, WriteType::WithResponse)
            .await
            .map_err(|e| BleTransportError::WriteFailed(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) {
        for task in self.tasks.lock().await.drain(..) {
            task.abort();
        }

        if let Some(channels) = self.channels.write().await.take() {
            if let Err(e) = self.peripheral.unsubscribe(&channels.event).await {
                debug!("Failed to unsubscribe from {}: {}", self.address, e);
            }
        }

        if self.peripheral.is_connected().await.unwrap_or(false) {
            if let Err(e) = self.peripheral.disconnect().await {
                debug!("Failed to disconnect from {}: {}", self.address, e);
            }
        }
    }
}
