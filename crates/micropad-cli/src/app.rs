//! Wires the BLE transport, connection manager and protocol handler together

use std::path::PathBuf;
use std::sync::Arc;

use micropad_ble::BleTransport;
use micropad_core::{ConnectionManager, ProtocolHandler};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::error::{CliError, Result};

/// The CLI's view of one Micropad session
pub struct MicropadApp {
    config: AppConfig,
    config_path: PathBuf,
    transport: Arc<BleTransport>,
    handler: Arc<ProtocolHandler>,
}

impl MicropadApp {
    pub fn new(config: AppConfig, config_path: PathBuf) -> Self {
        let transport = Arc::new(BleTransport::new(config.ble.clone()));
        let connection = ConnectionManager::new(transport.clone(), config.session.clone());
        let handler = ProtocolHandler::new(connection);

        Self {
            config,
            config_path,
            transport,
            handler,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn transport(&self) -> &BleTransport {
        &self.transport
    }

    pub fn handler(&self) -> &Arc<ProtocolHandler> {
        &self.handler
    }

    /// Connect to the explicit device, or the remembered one when auto-connect is on
    pub async fn connect(&mut self, explicit: Option<&str>) -> Result<()> {
        let device_id = self.config.target_device(explicit).ok_or_else(|| {
            CliError::Config(
                "No device selected; pass --device or set device_id with auto_connect = true"
                    .to_string(),
            )
        })?;

        info!("Connecting to {}", device_id);
        self.handler.connection().connect(&device_id).await?;

        match self.handler.device_name().await {
            Some(name) => info!("Connected to {} ({})", name, device_id),
            None => info!("Connected to {}", device_id),
        }

        if self.config.device_id.as_deref() != Some(device_id.as_str()) {
            self.remember_device(device_id);
        }
        Ok(())
    }

    pub async fn shutdown(&self) {
        self.handler.connection().disconnect().await;
    }

    fn remember_device(&mut self, device_id: String) {
        self.config.device_id = Some(device_id);
        if let Err(e) = self.config.save_to_file(&self.config_path) {
            warn!("Failed to remember device in {}: {}", self.config_path.display(), e);
        }
    }
}
