//! Health metric extraction for NVMe smart-log output
//!
//! Turns the loosely structured `key : value` text printed by `nvme smart-log`
//! into a [`FieldMap`] keyed by a fixed vocabulary:
//! - Case-insensitive matching, `_` and spaces are interchangeable
//!   (nvme-cli changed spelling between releases)
//! - First matching rule wins for a line, last line wins for a key
//! - Unknown lines are ignored
//! - Values are kept verbatim, no unit parsing

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Canonical metric names, in report column order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum MetricKey {
    #[serde(rename = "Percentage Used")]
    PercentageUsed,
    #[serde(rename = "Critical Warning")]
    CriticalWarning,
    #[serde(rename = "Available Spare")]
    AvailableSpare,
    #[serde(rename = "Media Errors")]
    MediaErrors,
    #[serde(rename = "Data Units Written")]
    DataUnitsWritten,
    #[serde(rename = "Data Units Read")]
    DataUnitsRead,
    #[serde(rename = "Host Read Commands")]
    HostReadCommands,
    #[serde(rename = "Host Write Commands")]
    HostWriteCommands,
    #[serde(rename = "Power Cycles")]
    PowerCycles,
    #[serde(rename = "Power On Hours")]
    PowerOnHours,
    #[serde(rename = "Unsafe Shutdowns")]
    UnsafeShutdowns,
    #[serde(rename = "Temperature")]
    Temperature,
}

impl MetricKey {
    pub const ALL: [MetricKey; 12] = [
        MetricKey::PercentageUsed,
        MetricKey::CriticalWarning,
        MetricKey::AvailableSpare,
        MetricKey::MediaErrors,
        MetricKey::DataUnitsWritten,
        MetricKey::DataUnitsRead,
        MetricKey::HostReadCommands,
        MetricKey::HostWriteCommands,
        MetricKey::PowerCycles,
        MetricKey::PowerOnHours,
        MetricKey::UnsafeShutdowns,
        MetricKey::Temperature,
    ];

    /// Column name used in the report header
    pub fn as_str(&self) -> &'static str {
        match self {
            MetricKey::PercentageUsed => "Percentage Used",
            MetricKey::CriticalWarning => "Critical Warning",
            MetricKey::AvailableSpare => "Available Spare",
            MetricKey::MediaErrors => "Media Errors",
            MetricKey::DataUnitsWritten => "Data Units Written",
            MetricKey::DataUnitsRead => "Data Units Read",
            MetricKey::HostReadCommands => "Host Read Commands",
            MetricKey::HostWriteCommands => "Host Write Commands",
            MetricKey::PowerCycles => "Power Cycles",
            MetricKey::PowerOnHours => "Power On Hours",
            MetricKey::UnsafeShutdowns => "Unsafe Shutdowns",
            MetricKey::Temperature => "Temperature",
        }
    }
}

impl fmt::Display for MetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetricKey::ALL
            .iter()
            .copied()
            .find(|key| key.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown metric: {}", s))
    }
}

/// Metric values of one device for one poll
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldMap {
    fields: BTreeMap<MetricKey, String>,
}

impl FieldMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a value, replacing any earlier one for the same key
    pub fn insert(&mut self, key: MetricKey, value: impl Into<String>) {
        self.fields.insert(key, value.into());
    }

    pub fn get(&self, key: MetricKey) -> Option<&str> {
        self.fields.get(&key).map(String::as_str)
    }

    /// Lookup by column name, e.g. `"Percentage Used"`
    pub fn get_by_name(&self, name: &str) -> Option<&str> {
        name.parse::<MetricKey>().ok().and_then(|key| self.get(key))
    }

    /// Entries in vocabulary order
    pub fn iter(&self) -> impl Iterator<Item = (MetricKey, &str)> {
        self.fields.iter().map(|(key, value)| (*key, value.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// One line predicate of the rule table
#[derive(Debug, Clone, Copy)]
pub struct MatchRule {
    pub key: MetricKey,
    /// Phrase looked for in the normalised label
    pub phrase: &'static str,
    /// Label is rejected if it contains any of these
    pub excludes: &'static [&'static str],
}

impl MatchRule {
    const fn new(key: MetricKey, phrase: &'static str) -> Self {
        Self { key, phrase, excludes: &[] }
    }

    const fn excluding(key: MetricKey, phrase: &'static str, excludes: &'static [&'static str]) -> Self {
        Self { key, phrase, excludes }
    }

    fn matches(&self, label: &str) -> bool {
        label.contains(self.phrase) && !self.excludes.iter().any(|word| label.contains(word))
    }
}

/// Standard smart-log rule table. Each phrase targets a distinct label.
pub const STANDARD_RULES: &[MatchRule] = &[
    MatchRule::new(MetricKey::PercentageUsed, "percentage used"),
    MatchRule::excluding(MetricKey::CriticalWarning, "critical warning", &["endurance group"]),
    MatchRule::excluding(MetricKey::AvailableSpare, "available spare", &["threshold"]),
    MatchRule::excluding(MetricKey::MediaErrors, "media errors", &["threshold"]),
    MatchRule::new(MetricKey::DataUnitsWritten, "data units written"),
    MatchRule::new(MetricKey::DataUnitsRead, "data units read"),
    MatchRule::new(MetricKey::HostReadCommands, "host read commands"),
    MatchRule::new(MetricKey::HostWriteCommands, "host write commands"),
    MatchRule::new(MetricKey::PowerCycles, "power cycles"),
    MatchRule::new(MetricKey::PowerOnHours, "power on hours"),
    MatchRule::new(MetricKey::UnsafeShutdowns, "unsafe shutdowns"),
    // "Warning/Critical Composite Temperature Time" are counters, not readings
    MatchRule::excluding(MetricKey::Temperature, "temperature", &["sensor", "time"]),
];

/// Rule-table driven extractor
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    rules: Vec<MatchRule>,
}

impl Default for FieldExtractor {
    fn default() -> Self {
        Self::new(STANDARD_RULES.to_vec())
    }
}

impl FieldExtractor {
    pub fn new(rules: Vec<MatchRule>) -> Self {
        Self { rules }
    }

    /// Standard rules restricted to `keys`, keeping table order
    pub fn with_metrics(keys: &[MetricKey]) -> Self {
        let rules = STANDARD_RULES
            .iter()
            .filter(|rule| keys.contains(&rule.key))
            .copied()
            .collect();
        Self::new(rules)
    }

    /// Keys this extractor can populate, in vocabulary order
    pub fn metrics(&self) -> Vec<MetricKey> {
        let mut keys: Vec<MetricKey> = self.rules.iter().map(|rule| rule.key).collect();
        keys.sort();
        keys.dedup();
        keys
    }

    /// Build a field map from one smart-log text block. Never fails.
    pub fn extract(&self, text: &str) -> FieldMap {
        let mut fields = FieldMap::new();

        for line in text.lines() {
            let Some((label, value)) = line.split_once(':') else {
                continue;
            };
            let label = normalize_label(label);

            if let Some(rule) = self.rules.iter().find(|rule| rule.matches(&label)) {
                fields.insert(rule.key, value.trim());
            }
        }

        fields
    }
}

/// Lower-case, `_` as space, collapsed whitespace
fn normalize_label(label: &str) -> String {
    label
        .to_lowercase()
        .replace('_', " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
