//! Device identification from `nvme id-ctrl` output
//!
//! Only the `sn`, `mn` and `fr` fields are kept. A field is recognised by its
//! exact leading token, so lines that merely contain "sn" elsewhere are ignored.

use serde::Serialize;

/// Placeholder for identity fields that could not be resolved
pub const UNKNOWN: &str = "Unknown";

/// Stable identity attributes of one NVMe controller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceIdentity {
    pub device_path: String,
    pub serial_number: String,
    pub model_number: String,
    pub firmware_revision: String,
}

impl DeviceIdentity {
    /// Identity with every attribute set to "Unknown"
    pub fn unknown(device_path: &str) -> Self {
        Self {
            device_path: device_path.to_string(),
            serial_number: UNKNOWN.to_string(),
            model_number: UNKNOWN.to_string(),
            firmware_revision: UNKNOWN.to_string(),
        }
    }

    /// Parse controller identification text line by line
    pub fn resolve(device_path: &str, id_ctrl_text: &str) -> Self {
        let mut identity = Self::unknown(device_path);

        for line in id_ctrl_text.lines() {
            let Some((field, value)) = line.split_once(':') else {
                continue;
            };
            let value = value.trim();
            if value.is_empty() {
                continue;
            }

            match field.trim().to_lowercase().as_str() {
                "sn" => identity.serial_number = value.to_string(),
                "mn" => identity.model_number = value.to_string(),
                "fr" => identity.firmware_revision = value.to_string(),
                _ => {}
            }
        }

        identity
    }
}
