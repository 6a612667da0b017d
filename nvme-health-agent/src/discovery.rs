//! NVMe device selection
//!
//! This module handles:
//! - Parsing `nvme list` output into device paths
//! - Vendor filtering on the model column (e.g. only "SOLIDIGM" drives),
//!   with or without the `Generic` (`/dev/ngXnY`) column of newer nvme-cli
//! - Static device lists that bypass enumeration

use crate::config::DeviceConfig;
use tracing::debug;

/// Device node prefix of NVMe namespaces
const DEVICE_PREFIX: &str = "/dev/nvme";

/// Character device prefix printed in the `Generic` column
const GENERIC_PREFIX: &str = "/dev/ng";

/// Predicate applied to each `nvme list` line
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    /// Case-insensitive prefix of the model token, `None` accepts everything
    pub vendor_prefix: Option<String>,
    /// Index of the model token once the `Generic` column is removed
    pub model_field_index: usize,
}

impl Default for DeviceFilter {
    fn default() -> Self {
        Self {
            vendor_prefix: None,
            model_field_index: 2,
        }
    }
}

impl DeviceFilter {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            vendor_prefix: config.vendor_prefix.clone(),
            model_field_index: config.model_field_index,
        }
    }

    fn accepts(&self, fields: &[&str]) -> bool {
        let Some(prefix) = &self.vendor_prefix else {
            return true;
        };
        columns(fields)
            .nth(self.model_field_index)
            .map(|model| model.to_lowercase().starts_with(&prefix.to_lowercase()))
            .unwrap_or(false)
    }

    /// Device paths of all matching lines, in listing order, without duplicates
    pub fn select<'a>(&self, lines: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let mut devices: Vec<String> = Vec::new();

        for line in lines {
            if !line.starts_with(DEVICE_PREFIX) {
                continue;
            }
            let fields: Vec<&str> = line.split_whitespace().collect();
            if !self.accepts(&fields) {
                debug!("Skipping {} (vendor filter)", fields[0]);
                continue;
            }
            if !devices.iter().any(|known| known == fields[0]) {
                devices.push(fields[0].to_string());
            }
        }

        devices
    }
}

/// Line tokens in the `Node SN Model...` layout, whichever nvme-cli printed them
fn columns<'a>(fields: &'a [&'a str]) -> impl Iterator<Item = &'a str> + 'a {
    let generic = fields
        .get(1)
        .map(|field| field.starts_with(GENERIC_PREFIX))
        .unwrap_or(false);
    fields
        .iter()
        .enumerate()
        .filter(move |(i, _)| !(generic && *i == 1))
        .map(|(_, field)| *field)
}
