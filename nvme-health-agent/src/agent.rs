//! Poll cycle: enumerate devices, read identity and health, append to report
//!
//! Devices are processed one after the other. A failure on one device is
//! logged and the loop moves on; only a corrupt or unopenable report stops
//! the run.

use crate::config::AgentConfig;
use crate::discovery::DeviceFilter;
use crate::error::{HealthError, Result};
use crate::execution::NvmeTool;
use crate::identity::DeviceIdentity;
use crate::metrics::FieldExtractor;
use crate::record::HealthRecord;
use crate::report::ReportStore;
use chrono::{DateTime, Local};
use tracing::{debug, error, info, warn};

/// Outcome of one pass over all devices
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PollSummary {
    pub appended: usize,
    /// Unreachable devices or devices without usable health data
    pub skipped: Vec<String>,
    /// Devices whose row could not be persisted
    pub failed: Vec<String>,
}

/// Main agent state
pub struct Agent<T: NvmeTool> {
    tool: T,
    extractor: FieldExtractor,
    filter: DeviceFilter,
    static_devices: Vec<String>,
    store: ReportStore,
    clock: fn() -> DateTime<Local>,
}

impl<T: NvmeTool> Agent<T> {
    pub fn new(tool: T, config: &AgentConfig, store: ReportStore) -> Self {
        Self {
            tool,
            extractor: FieldExtractor::with_metrics(&config.metric_keys()),
            filter: DeviceFilter::from_config(&config.devices),
            static_devices: config.devices.static_devices.clone(),
            store,
            clock: Local::now,
        }
    }

    /// Replace the capture clock
    pub fn with_clock(mut self, clock: fn() -> DateTime<Local>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &ReportStore {
        &self.store
    }

    /// Hand back the report so the caller can close it
    pub fn into_store(self) -> ReportStore {
        self.store
    }

    /// Devices to poll this cycle
    pub async fn devices(&self) -> Vec<String> {
        if !self.static_devices.is_empty() {
            debug!("Using {} statically configured devices", self.static_devices.len());
            return self.static_devices.clone();
        }

        match self.tool.list().await {
            Ok(listing) => self.filter.select(listing.lines()),
            Err(e) => {
                error!("Error listing NVMe devices: {}", e);
                Vec::new()
            }
        }
    }

    /// Resolve identity and health of one device.
    ///
    /// `Ok(None)` means the device answered but no known metric was found.
    pub async fn poll_device(&self, device: &str) -> Result<Option<HealthRecord>> {
        let identity = match self.tool.id_ctrl(device).await {
            Ok(text) => DeviceIdentity::resolve(device, &text),
            Err(e @ HealthError::Timeout { .. }) => return Err(e),
            Err(e) => {
                warn!("Identity unavailable for {}: {}", device, e);
                DeviceIdentity::unknown(device)
            }
        };

        let smart_log = self.tool.smart_log(device).await?;
        let metrics = self.extractor.extract(&smart_log);
        if metrics.is_empty() {
            warn!("No health metrics recognised for {}", device);
            return Ok(None);
        }

        debug!("{}: {} metrics extracted", device, metrics.len());
        Ok(Some(HealthRecord::build(identity, metrics, (self.clock)())))
    }

    /// Poll every device once, appending one row per healthy answer
    pub async fn run_once(&self) -> Result<PollSummary> {
        let devices = self.devices().await;
        if devices.is_empty() {
            info!("No NVMe devices found");
        }

        let mut summary = PollSummary::default();
        for device in devices {
            match self.poll_device(&device).await {
                Ok(Some(record)) => match self.store.append(&record) {
                    Ok(()) => summary.appended += 1,
                    Err(e) if e.is_fatal() => {
                        error!("Report unusable while appending for {}, aborting: {}", device, e);
                        return Err(e);
                    }
                    Err(e) => {
                        error!("Error writing report: {}", e);
                        summary.failed.push(device);
                    }
                },
                Ok(None) => summary.skipped.push(device),
                Err(e) => {
                    warn!("Skipping {}: {}", device, e);
                    summary.skipped.push(device);
                }
            }
        }

        info!(
            "Poll complete: {} appended, {} skipped, {} failed",
            summary.appended,
            summary.skipped.len(),
            summary.failed.len()
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{DatasetLock, NOT_AVAILABLE};
    use chrono::TimeZone;
    use std::collections::{HashMap, HashSet};
    use std::time::Duration;
    use tempfile::TempDir;

    /// In-memory `nvme` answering from canned text
    #[derive(Default)]
    struct ScriptedNvme {
        listing: Option<String>,
        smart_logs: HashMap<String, String>,
        id_ctrls: HashMap<String, String>,
        hung: HashSet<String>,
    }

    impl ScriptedNvme {
        fn answer(&self, table: &HashMap<String, String>, device: &str) -> Result<String> {
            if self.hung.contains(device) {
                return Err(HealthError::Timeout { device: device.to_string(), secs: 10 });
            }
            table
                .get(device)
                .cloned()
                .ok_or_else(|| HealthError::external(device, "exit status 1"))
        }
    }

    impl NvmeTool for ScriptedNvme {
        async fn list(&self) -> Result<String> {
            self.listing
                .clone()
                .ok_or_else(|| HealthError::external(crate::execution::ENUMERATION, "exit status 1"))
        }

        async fn smart_log(&self, device: &str) -> Result<String> {
            self.answer(&self.smart_logs, device)
        }

        async fn id_ctrl(&self, device: &str) -> Result<String> {
            self.answer(&self.id_ctrls, device)
        }
    }

    fn fixed_now() -> DateTime<Local> {
        Local.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    const LISTING: &str = "\
Node             SN                   Model                                    Namespace
---------------- -------------------- ---------------------------------------- ---------
/dev/nvme0n1     ABC123               SOLIDIGM SSDPFKNU010TZ                   1
/dev/nvme1n1     S4EWNX0R123456       Samsung SSD 980 PRO 1TB                  1
";

    fn scripted() -> ScriptedNvme {
        let mut nvme = ScriptedNvme {
            listing: Some(LISTING.to_string()),
            ..ScriptedNvme::default()
        };
        for device in ["/dev/nvme0n1", "/dev/nvme1n1"] {
            nvme.id_ctrls
                .insert(device.to_string(), "sn : ABC123\nmn : MyModel\nfr : 1.0.0\n".to_string());
            nvme.smart_logs.insert(
                device.to_string(),
                "critical_warning : 0\navailable_spare : 100%\n".to_string(),
            );
        }
        nvme
    }

    fn agent(nvme: ScriptedNvme, config: &AgentConfig, dir: &TempDir) -> Agent<ScriptedNvme> {
        let store = ReportStore::open_with(dir.path().join("report.csv"), config.store_options()).unwrap();
        Agent::new(nvme, config, store).with_clock(fixed_now)
    }

    #[tokio::test]
    async fn test_end_to_end_single_device() {
        let dir = TempDir::new().unwrap();
        let mut config = AgentConfig::default();
        config.devices.static_devices = vec!["/dev/nvme0n1".to_string()];
        let agent = agent(scripted(), &config, &dir);

        let record = agent.poll_device("/dev/nvme0n1").await.unwrap().unwrap();
        assert_eq!(record.identity().serial_number, "ABC123");
        assert_eq!(record.identity().model_number, "MyModel");
        assert_eq!(record.identity().firmware_revision, "1.0.0");
        assert_eq!(record.metrics().len(), 2);
        assert_eq!(record.metrics().get_by_name("Critical Warning"), Some("0"));
        assert_eq!(record.metrics().get_by_name("Available Spare"), Some("100%"));

        let summary = agent.run_once().await.unwrap();
        assert_eq!(summary.appended, 1);

        let store = agent.into_store();
        let header = store.header();
        let rows = store.rows();
        let path = store.path().to_path_buf();
        store.close();

        let content = std::fs::read_to_string(path).unwrap();
        assert_eq!(content.lines().count(), 2);
        assert_eq!(rows.len(), 1);

        let populated = [
            "Timestamp",
            "Device",
            "Serial Number",
            "Model Number",
            "Firmware Version",
            "Critical Warning",
            "Available Spare",
        ];
        for (column, value) in header.iter().zip(&rows[0]) {
            if !populated.contains(&column.as_str()) {
                assert_eq!(value, NOT_AVAILABLE, "column {}", column);
            }
        }
        assert_eq!(rows[0][0], "2024-05-01 08:30:00");
    }

    #[tokio::test]
    async fn test_vendor_filter_selects_devices() {
        let dir = TempDir::new().unwrap();
        let mut config = AgentConfig::default();
        config.devices.vendor_prefix = Some("SOLIDIGM".to_string());
        let agent = agent(scripted(), &config, &dir);

        assert_eq!(agent.devices().await, ["/dev/nvme0n1"]);
        let summary = agent.run_once().await.unwrap();
        assert_eq!(summary.appended, 1);
        assert_eq!(agent.store().rows()[0][1], "/dev/nvme0n1");
    }

    #[tokio::test]
    async fn test_failed_health_query_skips_only_that_device() {
        let dir = TempDir::new().unwrap();
        let mut nvme = scripted();
        nvme.smart_logs.remove("/dev/nvme0n1");
        let agent = agent(nvme, &AgentConfig::default(), &dir);

        let summary = agent.run_once().await.unwrap();

        assert_eq!(summary.appended, 1);
        assert_eq!(summary.skipped, ["/dev/nvme0n1"]);
        let rows = agent.store().rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0][1], "/dev/nvme1n1");
    }

    #[tokio::test]
    async fn test_identity_failure_records_unknown() {
        let dir = TempDir::new().unwrap();
        let mut nvme = scripted();
        nvme.id_ctrls.remove("/dev/nvme1n1");
        let agent = agent(nvme, &AgentConfig::default(), &dir);

        let record = agent.poll_device("/dev/nvme1n1").await.unwrap().unwrap();
        assert_eq!(record.identity(), &DeviceIdentity::unknown("/dev/nvme1n1"));
    }

    #[tokio::test]
    async fn test_hung_device_is_skipped() {
        let dir = TempDir::new().unwrap();
        let mut nvme = scripted();
        nvme.hung.insert("/dev/nvme0n1".to_string());
        let agent = agent(nvme, &AgentConfig::default(), &dir);

        let summary = agent.run_once().await.unwrap();
        assert_eq!(summary.skipped, ["/dev/nvme0n1"]);
        assert_eq!(summary.appended, 1);
    }

    #[tokio::test]
    async fn test_unrecognised_health_text_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let mut nvme = scripted();
        nvme.smart_logs
            .insert("/dev/nvme0n1".to_string(), "Smart Log for NVME device:nvme0n1\n".to_string());
        let agent = agent(nvme, &AgentConfig::default(), &dir);

        assert!(agent.poll_device("/dev/nvme0n1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_enumeration_failure_polls_nothing() {
        let dir = TempDir::new().unwrap();
        let nvme = ScriptedNvme::default();
        let agent = agent(nvme, &AgentConfig::default(), &dir);

        assert_eq!(agent.run_once().await.unwrap(), PollSummary::default());
    }

    #[tokio::test]
    async fn test_persistence_failure_continues_with_next_device() {
        let dir = TempDir::new().unwrap();
        let mut config = AgentConfig::default();
        config.report.lock_wait_ms = 50;
        let agent = agent(scripted(), &config, &dir);
        let _held = DatasetLock::acquire(agent.store().path(), Duration::ZERO).unwrap();

        let summary = agent.run_once().await.unwrap();

        assert_eq!(summary.appended, 0);
        assert_eq!(summary.failed, ["/dev/nvme0n1", "/dev/nvme1n1"]);
    }

    #[tokio::test]
    async fn test_corrupt_report_aborts_run() {
        let dir = TempDir::new().unwrap();
        let agent = agent(scripted(), &AgentConfig::default(), &dir);
        std::fs::write(agent.store().path(), "Device,Model\n/dev/nvme0n1\n").unwrap();

        let err = agent.run_once().await.unwrap_err();
        assert!(matches!(err, HealthError::CorruptDataset { .. }));
        assert_eq!(err.device(), Some("/dev/nvme0n1"));
    }

    #[tokio::test]
    async fn test_repeated_polls_grow_history() {
        let dir = TempDir::new().unwrap();
        let agent = agent(scripted(), &AgentConfig::default(), &dir);

        agent.run_once().await.unwrap();
        agent.run_once().await.unwrap();

        assert_eq!(agent.store().rows().len(), 4);
    }
}
