//! Append-only health report
//!
//! Handles:
//! - Loading an existing CSV report, or creating one with the canonical header
//! - Schema growth: unseen metric columns are appended on the right and
//!   earlier rows are padded with "N/A"
//! - One row per observation, persisted atomically (temp file + rename)
//! - Mutual exclusion: one writer per handle, one process per dataset
//!   (advisory lock, readers never take it)

mod dataset;
mod lock;

pub use dataset::{Dataset, IDENTITY_COLUMNS, NOT_AVAILABLE};
pub use lock::DatasetLock;

use crate::error::{HealthError, Result};
use crate::metrics::MetricKey;
use crate::record::HealthRecord;
use dataset::{DEVICE, FIRMWARE_VERSION, MODEL_NUMBER, SERIAL_NUMBER, TIMESTAMP};
use parking_lot::Mutex;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Default report file, relative to the working directory
pub const DEFAULT_REPORT_PATH: &str = "nvme_health_report.csv";

/// Options used when opening a report
#[derive(Debug, Clone)]
pub struct StoreOptions {
    /// Metric columns of a freshly created report
    pub metrics: Vec<MetricKey>,
    /// How long a writer waits for another process to release the lock
    pub lock_wait: Duration,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            metrics: MetricKey::ALL.to_vec(),
            lock_wait: Duration::from_secs(2),
        }
    }
}

/// Handle on an open report
#[derive(Debug)]
pub struct ReportStore {
    path: PathBuf,
    options: StoreOptions,
    dataset: Mutex<Dataset>,
}

impl ReportStore {
    /// Open with the full metric vocabulary
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::open_with(path, StoreOptions::default())
    }

    /// Open with a restricted set of metric columns for new reports
    pub fn open_with_metrics(path: impl Into<PathBuf>, metrics: &[MetricKey]) -> Result<Self> {
        Self::open_with(
            path,
            StoreOptions {
                metrics: metrics.to_vec(),
                ..StoreOptions::default()
            },
        )
    }

    /// Load the report at `path`, creating it with a header if absent.
    /// An unparseable existing file is left untouched and reported as corrupt.
    ///
    /// Reading needs no lock since writers replace the file by rename; the
    /// lock is only taken to create a missing report.
    pub fn open_with(path: impl Into<PathBuf>, options: StoreOptions) -> Result<Self> {
        let path = path.into();
        let dataset = match Dataset::load(&path)? {
            Some(dataset) => dataset,
            None => Self::create(&path, &options)?,
        };
        info!(
            "Opened report {} ({} rows, {} columns)",
            path.display(),
            dataset.len(),
            dataset.header().len()
        );

        Ok(Self {
            path,
            options,
            dataset: Mutex::new(dataset),
        })
    }

    fn create(path: &Path, options: &StoreOptions) -> Result<Dataset> {
        let open_error = |source: io::Error| HealthError::DatasetIo {
            path: path.to_path_buf(),
            source,
        };
        let _lock = DatasetLock::acquire(path, options.lock_wait).map_err(open_error)?;

        // Another process may have created it while we waited
        if let Some(dataset) = Dataset::load(path)? {
            return Ok(dataset);
        }
        let dataset = Dataset::with_header(canonical_header(&options.metrics));
        persist(path, &dataset).map_err(open_error)?;
        info!("Created report {}", path.display());
        Ok(dataset)
    }

    /// Append one observation and persist the whole report.
    ///
    /// The on-disk report is reloaded under the lock so rows written by other
    /// processes since `open` are kept.
    pub fn append(&self, record: &HealthRecord) -> Result<()> {
        let device = record.device();
        let persist_error = |source: io::Error| HealthError::persistence(device, &self.path, source);

        let mut cached = self.dataset.lock();
        let _lock = DatasetLock::acquire(&self.path, self.options.lock_wait).map_err(persist_error)?;

        let mut dataset = match Dataset::load(&self.path).map_err(|e| e.for_device(device))? {
            Some(dataset) => dataset,
            None => Dataset::with_header(canonical_header(&self.options.metrics)),
        };

        let timestamp = record.timestamp();
        let columns_before = dataset.header().len();
        dataset.append_row(&record_cells(record, &timestamp));
        if dataset.header().len() > columns_before {
            info!(
                "Report schema extended with {:?}",
                &dataset.header()[columns_before..]
            );
        }

        persist(&self.path, &dataset).map_err(persist_error)?;
        *cached = dataset;

        info!("Data written to {} for device {}", self.path.display(), device);
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Header as of the last open/append
    pub fn header(&self) -> Vec<String> {
        self.dataset.lock().header().to_vec()
    }

    /// Data rows as of the last open/append
    pub fn rows(&self) -> Vec<Vec<String>> {
        self.dataset.lock().rows().to_vec()
    }

    /// Release the handle. Every append is already on disk.
    pub fn close(self) {
        debug!("Closed report {}", self.path.display());
    }
}

/// Identity columns followed by `metrics` in vocabulary order
pub fn canonical_header(metrics: &[MetricKey]) -> Vec<String> {
    let mut metrics = metrics.to_vec();
    metrics.sort();
    metrics.dedup();

    IDENTITY_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(metrics.iter().map(|key| key.as_str().to_string()))
        .collect()
}

fn record_cells<'a>(record: &'a HealthRecord, timestamp: &'a str) -> Vec<(&'a str, &'a str)> {
    let identity = record.identity();
    let mut cells = vec![
        (TIMESTAMP, timestamp),
        (DEVICE, identity.device_path.as_str()),
        (SERIAL_NUMBER, identity.serial_number.as_str()),
        (MODEL_NUMBER, identity.model_number.as_str()),
        (FIRMWARE_VERSION, identity.firmware_revision.as_str()),
    ];
    cells.extend(record.metrics().iter().map(|(key, value)| (key.as_str(), value)));
    cells
}

/// Write to a temp file beside `path`, then rename over it
fn persist(path: &Path, dataset: &Dataset) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::Builder::new()
        .prefix(".nvme_health_report")
        .suffix(".tmp")
        .tempfile_in(dir)?;

    dataset.write_to(tmp.as_file_mut())?;
    if let Ok(metadata) = fs::metadata(path) {
        tmp.as_file().set_permissions(metadata.permissions())?;
    }
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}
