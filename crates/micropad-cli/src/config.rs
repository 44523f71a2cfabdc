//! Micropad CLI configuration
//!
//! Loaded from `micropad.toml`. Without an explicit path the file lives in
//! the user config directory (`~/.config/micropad/micropad.toml` on Linux).
//! Missing files and missing keys fall back to defaults.

use std::path::{Path, PathBuf};

use micropad_ble::BleTransportConfig;
use micropad_core::SessionConfig;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CliError, Result};

pub const CONFIG_FILE_NAME: &str = "micropad.toml";

// ----------------------------------------------------------------------------
// Application Configuration
// ----------------------------------------------------------------------------

/// Complete configuration for the CLI
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Last device the CLI connected to
    pub device_id: Option<String>,
    /// Connect to `device_id` without `--device`
    pub auto_connect: bool,
    pub session: SessionConfig,
    pub ble: BleTransportConfig,
}

impl AppConfig {
    /// Default configuration file location
    pub fn default_path() -> Result<PathBuf> {
        dirs::config_dir()
            .map(|dir| dir.join("micropad").join(CONFIG_FILE_NAME))
            .ok_or_else(|| CliError::Config("No user configuration directory".to_string()))
    }

    /// Load from `path`, or defaults if the file does not exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let text = std::fs::read_to_string(path)?;
        let config: AppConfig = toml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path.as_ref(), toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Validate the configuration for consistency
    pub fn validate(&self) -> Result<()> {
        self.session.validate()?;
        Ok(())
    }

    /// Device to open: the explicit override, else the remembered device when
    /// auto-connect is on
    pub fn target_device(&self, explicit: Option<&str>) -> Option<String> {
        match explicit {
            Some(device) => Some(device.to_string()),
            None if self.auto_connect => self.device_id.clone(),
            None => None,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
