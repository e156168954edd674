//! ==============================================================================
//! config.rs - Runtime Configuration Loader
//! ==============================================================================
//!
//! purpose:
//!     defines the schema for `gateway.toml`.
//!     loads configuration from file or falls back to defaults.
//!
//! structure:
//!     - NetworkConfig: UDP bind address and datagram buffer size.
//!     - SerialConfig: device path and baud rate.
//!     - RecordLogConfig: where readings are persisted.
//!     - IngestConfig: keyed vs single-value parsing, tracked keys.
//!     - LoggingConfig: default log filter and reading echo.
//!
//! ==============================================================================

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use crate::error::Error;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct GatewayConfig {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub serial: SerialConfig,
    #[serde(default)]
    pub record_log: RecordLogConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    /// extra or overriding key -> unit entries
    #[serde(default)]
    pub units: HashMap<String, String>,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NetworkConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_max_datagram")]
    pub max_datagram: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SerialConfig {
    pub port: String,
    pub baud_rate: u32,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RecordLogConfig {
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    /// `key:value` lines only, state keeps one value per tracked key
    #[default]
    Keyed,
    /// bare lines are accepted as a single scalar value
    Single,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IngestConfig {
    #[serde(default)]
    pub mode: IngestMode,
    #[serde(default = "default_tracked_keys")]
    pub tracked_keys: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
    #[serde(default)]
    pub show_readings: bool,
}

fn default_max_datagram() -> usize {
    1024
}

fn default_tracked_keys() -> Vec<String> {
    ["temperature", "humidity", "luminosity"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self { host: "0.0.0.0".to_string(), port: 10000, max_datagram: default_max_datagram() }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self { port: "/dev/ttyUSB0".to_string(), baud_rate: 115200 }
    }
}

impl Default for RecordLogConfig {
    fn default() -> Self {
        Self { path: PathBuf::from("values.json") }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self { mode: IngestMode::default(), tracked_keys: default_tracked_keys() }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string(), show_readings: true }
    }
}

impl GatewayConfig {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let config: GatewayConfig = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Load from an explicit path, else the usual locations, else defaults
    pub fn load_or_default(explicit: Option<&Path>) -> Self {
        if let Some(path) = explicit {
            match Self::load(path) {
                Ok(config) => {
                    tracing::info!("[CONFIG] Loaded from {}", path.display());
                    return config;
                }
                Err(e) => {
                    tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                }
            }
        }

        let paths = [
            PathBuf::from("config").join("gateway.toml"),
            PathBuf::from("..").join("config").join("gateway.toml"),
        ];

        for path in &paths {
            if path.exists() {
                match Self::load(path) {
                    Ok(config) => {
                        tracing::info!("[CONFIG] Loaded from {}", path.display());
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("[CONFIG] Failed to load {}: {:#}", path.display(), e);
                    }
                }
            }
        }

        tracing::warn!("[CONFIG] No config file found - using defaults");
        Self::default()
    }

    /// Socket address the gateway binds to
    pub fn bind_addr(&self) -> Result<SocketAddr, Error> {
        format!("{}:{}", self.network.host, self.network.port)
            .parse()
            .map_err(|e| Error::Config(format!("bad bind address {}:{}: {}", self.network.host, self.network.port, e)))
    }

    fn validate(&self) -> Result<(), Error> {
        self.bind_addr()?;
        if self.network.max_datagram == 0 {
            return Err(Error::Config("network.max_datagram must be > 0".to_string()));
        }
        if self.ingest.mode == IngestMode::Keyed && self.ingest.tracked_keys.is_empty() {
            return Err(Error::Config("ingest.tracked_keys is empty in keyed mode".to_string()));
        }
        Ok(())
    }

    /// Log configuration summary
    pub fn print_summary(&self) {
        let bind = format!("{}:{}", self.network.host, self.network.port);
        tracing::info!(
            bind = %bind,
            serial = %self.serial.port,
            baud = self.serial.baud_rate,
            record_log = %self.record_log.path.display(),
            mode = ?self.ingest.mode,
            tracked = ?self.ingest.tracked_keys,
            "gateway configuration"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_deployment() {
        let config = GatewayConfig::default();
        assert_eq!(config.network.port, 10000);
        assert_eq!(config.serial.baud_rate, 115200);
        assert_eq!(config.record_log.path, PathBuf::from("values.json"));
        assert_eq!(config.ingest.mode, IngestMode::Keyed);
        assert_eq!(config.ingest.tracked_keys, vec!["temperature", "humidity", "luminosity"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let config: GatewayConfig = toml::from_str(
            r#"
            [serial]
            port = "COM6"
            baud_rate = 9600

            [ingest]
            mode = "single"

            [units]
            pressure = "hPa"
            "#,
        )
        .unwrap();
        assert_eq!(config.serial.port, "COM6");
        assert_eq!(config.ingest.mode, IngestMode::Single);
        assert_eq!(config.ingest.tracked_keys.len(), 3);
        assert_eq!(config.units.get("pressure").map(String::as_str), Some("hPa"));
        assert_eq!(config.network.max_datagram, 1024);
    }

    #[test]
    fn test_load_rejects_bad_bind_address() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[network]\nhost = \"not an ip\"\nport = 10000\n").unwrap();
        assert!(GatewayConfig::load(&path).is_err());
    }

    #[test]
    fn test_load_or_default_falls_back() {
        let config = GatewayConfig::load_or_default(Some(Path::new("/nonexistent/gateway.toml")));
        assert_eq!(config.network.port, 10000);
    }
}
