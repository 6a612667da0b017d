//! Configuration management
//!
//! Handles:
//! - `nvme` binary and invocation timeout
//! - Device selection (static list, vendor filter)
//! - Report location and lock wait
//! - Optional restriction of the extracted metrics

use crate::error::{HealthError, Result};
use crate::metrics::MetricKey;
use crate::report::{StoreOptions, DEFAULT_REPORT_PATH};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Environment variable overriding the config file location
pub const CONFIG_ENV: &str = "NVME_HEALTH_CONFIG";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub nvme: NvmeConfig,
    pub devices: DeviceConfig,
    pub report: ReportConfig,
    /// Metrics to extract, all of them when absent
    pub metrics: Option<Vec<MetricKey>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NvmeConfig {
    pub binary: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Only poll devices whose model starts with this (case-insensitive)
    pub vendor_prefix: Option<String>,
    /// Model token index in `Node SN Model...`; a `Generic` column is skipped
    pub model_field_index: usize,
    /// Explicit device list; enumeration is skipped when non-empty
    #[serde(rename = "static")]
    pub static_devices: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub path: PathBuf,
    /// How long an append waits for another writer before giving up
    pub lock_wait_ms: u64,
}

impl Default for NvmeConfig {
    fn default() -> Self {
        Self {
            binary: "nvme".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            vendor_prefix: None,
            model_field_index: 2,
            static_devices: Vec::new(),
        }
    }
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_REPORT_PATH),
            lock_wait_ms: 2000,
        }
    }
}

impl AgentConfig {
    /// Load from `$NVME_HEALTH_CONFIG`, else the OS config dir, else defaults
    pub async fn load() -> Result<Self> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)).await,
            None => match Self::config_file_path() {
                Some(path) if path.exists() => Self::load_from(&path).await,
                _ => {
                    debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    /// Load a specific file; a missing file yields defaults
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                info!("Config {} not found, using defaults", path.display());
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(HealthError::Config {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })
            }
        };

        let config: AgentConfig = toml::from_str(&content).map_err(|e| HealthError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// OS-specific config file path
    pub fn config_file_path() -> Option<PathBuf> {
        let mut path = dirs::config_dir()?;
        path.push("nvme-health-agent");
        path.push("config.toml");
        Some(path)
    }

    /// Metrics the extractor should look for
    pub fn metric_keys(&self) -> Vec<MetricKey> {
        self.metrics
            .clone()
            .unwrap_or_else(|| MetricKey::ALL.to_vec())
    }

    pub fn store_options(&self) -> StoreOptions {
        StoreOptions {
            metrics: self.metric_keys(),
            lock_wait: Duration::from_millis(self.report.lock_wait_ms),
        }
    }
}
