//! One health observation: identity + metrics at a capture time

use crate::identity::DeviceIdentity;
use crate::metrics::FieldMap;
use chrono::{DateTime, Local, SubsecRound};
use serde::Serialize;

/// Timestamp layout written to the report
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Immutable snapshot of one device for one poll
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthRecord {
    captured_at: DateTime<Local>,
    identity: DeviceIdentity,
    metrics: FieldMap,
}

impl HealthRecord {
    /// Compose a record; `now` is truncated to whole seconds
    pub fn build(identity: DeviceIdentity, metrics: FieldMap, now: DateTime<Local>) -> Self {
        Self {
            captured_at: now.trunc_subsecs(0),
            identity,
            metrics,
        }
    }

    pub fn captured_at(&self) -> DateTime<Local> {
        self.captured_at
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    pub fn metrics(&self) -> &FieldMap {
        &self.metrics
    }

    pub fn device(&self) -> &str {
        &self.identity.device_path
    }

    pub fn timestamp(&self) -> String {
        self.captured_at.format(TIMESTAMP_FORMAT).to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::MetricKey;
    use chrono::TimeZone;

    #[test]
    fn test_build_truncates_to_seconds() {
        let now = Local.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
            + chrono::Duration::milliseconds(731);
        let mut metrics = FieldMap::new();
        metrics.insert(MetricKey::PercentageUsed, "3%");

        let record = HealthRecord::build(DeviceIdentity::unknown("/dev/nvme0n1"), metrics, now);

        assert_eq!(record.timestamp(), "2024-03-09 14:05:07");
        assert_eq!(record.captured_at().timestamp_subsec_nanos(), 0);
        assert_eq!(record.device(), "/dev/nvme0n1");
        assert_eq!(record.metrics().get(MetricKey::PercentageUsed), Some("3%"));
    }

    #[test]
    fn test_build_is_pure() {
        let now = Local.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let a = HealthRecord::build(DeviceIdentity::unknown("/dev/nvme0n1"), FieldMap::new(), now);
        let b = HealthRecord::build(DeviceIdentity::unknown("/dev/nvme0n1"), FieldMap::new(), now);
        assert_eq!(a, b);
    }
}
