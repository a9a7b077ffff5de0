// Configuration module - loads and validates the exporter settings file
//
// This module is responsible for:
// 1. Reading the JSON settings file given on the command line
// 2. Applying defaults for optional settings
// 3. Validating the device inventory before any polling starts

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use tracing::info;

use crate::metrics::Device;

/// Errors that can occur during configuration loading
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read settings file {path}: {source}")]
    ReadError {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid settings format: {0}")]
    InvalidSettings(#[from] serde_json::Error),

    #[error("Missing required setting: {0}")]
    MissingRequiredSetting(String),

    #[error("Invalid setting: {0}")]
    InvalidValue(String),
}

/// Exporter settings loaded from the settings file
///
/// # Example Settings File
/// ```json
/// {
///   "listen": "0.0.0.0:9436",
///   "poll_interval": 30,
///   "request_timeout": 10,
///   "collectors": { "capsman": true, "capsman_legacy": false },
///   "devices": [
///     {
///       "name": "core-router",
///       "address": "10.0.0.1",
///       "user": "prometheus",
///       "password": "changeme",
///       "insecure_tls": true
///     }
///   ]
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExporterSettings {
    /// Address the /metrics endpoint listens on
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Seconds between two collection cycles of the same device and collector
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,

    /// Seconds a single device request may take
    #[serde(default = "default_request_timeout")]
    pub request_timeout: u64,

    #[serde(default)]
    pub collectors: CollectorSettings,

    pub devices: Vec<DeviceSettings>,
}

/// Which registration table collectors run against every device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectorSettings {
    #[serde(default = "enabled")]
    pub capsman: bool,

    #[serde(default)]
    pub capsman_legacy: bool,
}

impl Default for CollectorSettings {
    fn default() -> Self {
        CollectorSettings {
            capsman: true,
            capsman_legacy: false,
        }
    }
}

/// Address and credentials of a polled device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceSettings {
    /// Name exposed in the `name` label
    pub name: String,

    /// Host name or IP address, exposed in the `address` label
    pub address: String,

    pub user: String,

    #[serde(default, skip_serializing)]
    pub password: String,

    /// REST API port; defaults to the scheme's standard port
    #[serde(default)]
    pub port: Option<u16>,

    #[serde(default = "enabled")]
    pub use_tls: bool,

    /// Accept self-signed certificates (the RouterOS default)
    #[serde(default)]
    pub insecure_tls: bool,
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9436))
}

fn default_poll_interval() -> u64 {
    30
}

fn default_request_timeout() -> u64 {
    10
}

fn enabled() -> bool {
    true
}

impl DeviceSettings {
    /// Device identity as seen by collectors
    pub fn device(&self) -> Device {
        Device {
            name: self.name.clone(),
            address: self.address.clone(),
        }
    }

    /// Scheme, host and optional port of the REST API
    pub fn base_url(&self) -> String {
        let scheme = if self.use_tls { "https" } else { "http" };
        match self.port {
            Some(port) => format!("{}://{}:{}", scheme, self.address, port),
            None => format!("{}://{}", scheme, self.address),
        }
    }
}

impl ExporterSettings {
    /// Parses and validates settings from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let settings: ExporterSettings = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads the settings file at `path`
    ///
    /// # Returns
    /// * `Ok(ExporterSettings)` - Successfully loaded and validated settings
    /// * `Err(ConfigError)` - File unreadable, malformed or invalid
    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        info!("Loading exporter settings from: {}", path.display());

        let contents =
            tokio::fs::read_to_string(path)
                .await
                .map_err(|source| ConfigError::ReadError {
                    path: path.display().to_string(),
                    source,
                })?;

        let settings = Self::from_json(&contents)?;

        info!(
            "Loaded {} device(s), polling every {}s",
            settings.devices.len(),
            settings.poll_interval
        );
        for device in &settings.devices {
            info!("  {} - {}", device.name, device.base_url());
        }

        Ok(settings)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    /// Checks the settings for values that would make polling impossible
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.devices.is_empty() {
            return Err(ConfigError::MissingRequiredSetting("devices".to_string()));
        }

        if self.poll_interval == 0 {
            return Err(ConfigError::InvalidValue(
                "poll_interval must be at least 1 second".to_string(),
            ));
        }

        if self.request_timeout == 0 {
            return Err(ConfigError::InvalidValue(
                "request_timeout must be at least 1 second".to_string(),
            ));
        }

        if !self.collectors.capsman && !self.collectors.capsman_legacy {
            return Err(ConfigError::InvalidValue(
                "at least one collector must be enabled".to_string(),
            ));
        }

        let mut names = HashSet::new();
        for device in &self.devices {
            if device.name.is_empty() {
                return Err(ConfigError::MissingRequiredSetting("device name".to_string()));
            }
            if device.address.is_empty() {
                return Err(ConfigError::MissingRequiredSetting(format!(
                    "address of device '{}'",
                    device.name
                )));
            }
            if !names.insert(device.name.as_str()) {
                return Err(ConfigError::InvalidValue(format!(
                    "duplicate device name '{}'",
                    device.name
                )));
            }
        }

        Ok(())
    }
}
