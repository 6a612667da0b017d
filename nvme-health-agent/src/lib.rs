//! NVMe Health Agent - append-only history of NVMe self-reported health
//!
//! Each poll:
//! - Enumerates NVMe devices (optionally filtered by vendor)
//! - Resolves identity (`nvme id-ctrl`) and health (`nvme smart-log`)
//! - Normalises the health text into a fixed metric vocabulary
//! - Appends one row per device to a CSV report whose schema only grows

pub mod agent;
pub mod config;
pub mod discovery;
pub mod error;
pub mod execution;
pub mod identity;
pub mod metrics;
pub mod record;
pub mod report;

pub use agent::{Agent, PollSummary};
pub use config::AgentConfig;
pub use error::{HealthError, Result};
pub use execution::{NvmeCli, NvmeTool};
pub use identity::DeviceIdentity;
pub use metrics::{FieldExtractor, FieldMap, MetricKey};
pub use record::HealthRecord;
pub use report::ReportStore;
