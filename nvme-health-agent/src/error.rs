//! Error taxonomy for the health agent
//!
//! Every variant carries the device (or dataset path) it relates to so the
//! poll loop can log a diagnostic and move on to the next device.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, HealthError>;

#[derive(Debug, Error)]
pub enum HealthError {
    /// `nvme` exited non-zero, could not be spawned, or printed unreadable output
    #[error("nvme tool failed for {device}: {reason}")]
    ExternalTool { device: String, reason: String },

    /// `nvme` did not answer within the configured timeout
    #[error("nvme tool timed out after {secs}s for {device}")]
    Timeout { device: String, secs: u64 },

    /// Existing dataset cannot be parsed back; never overwritten
    #[error("dataset {path:?} is not a readable report: {reason}")]
    CorruptDataset {
        path: PathBuf,
        reason: String,
        /// Device whose row was being appended when the damage was found
        device: Option<String>,
    },

    /// Dataset could not be written (disk full, permissions, lock held)
    #[error("failed to persist {path:?} for {device}: {source}")]
    Persistence {
        device: String,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Report could not be read, created or locked at open time
    #[error("failed to open dataset {path:?}: {source}")]
    DatasetIo {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid configuration {path:?}: {reason}")]
    Config { path: PathBuf, reason: String },
}

impl HealthError {
    pub fn external(device: &str, reason: impl Into<String>) -> Self {
        HealthError::ExternalTool {
            device: device.to_string(),
            reason: reason.into(),
        }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        HealthError::CorruptDataset {
            path: path.into(),
            reason: reason.to_string(),
            device: None,
        }
    }

    pub fn persistence(device: &str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        HealthError::Persistence {
            device: device.to_string(),
            path: path.into(),
            source,
        }
    }

    /// Attribute a dataset failure to the device being appended.
    ///
    /// I/O failures become a per-device `Persistence` error; a corrupt
    /// dataset stays fatal but names the device.
    pub fn for_device(self, device: &str) -> Self {
        match self {
            HealthError::DatasetIo { path, source } => HealthError::persistence(device, path, source),
            HealthError::CorruptDataset { path, reason, .. } => HealthError::CorruptDataset {
                path,
                reason,
                device: Some(device.to_string()),
            },
            other => other,
        }
    }

    /// Device the failure is attributed to, if any
    pub fn device(&self) -> Option<&str> {
        match self {
            HealthError::ExternalTool { device, .. }
            | HealthError::Timeout { device, .. }
            | HealthError::Persistence { device, .. } => Some(device),
            HealthError::CorruptDataset { device, .. } => device.as_deref(),
            HealthError::DatasetIo { .. } | HealthError::Config { .. } => None,
        }
    }

    /// Fatal errors abort the whole run instead of skipping one device
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            HealthError::CorruptDataset { .. }
                | HealthError::DatasetIo { .. }
                | HealthError::Config { .. }
        )
    }
}
