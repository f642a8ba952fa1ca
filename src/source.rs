// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Counter source: live cumulative I/O counters per block device.
//!
//! The Linux implementation reads `/proc/diskstats`:
//! ```text
//! major minor name rd_ios rd_merges rd_sectors rd_ticks wr_ios wr_merges wr_sectors wr_ticks in_flight io_ticks time_in_queue [discard/flush fields...]
//! ```
//! Only the first eleven counters are kept; they line up with
//! [`MetricCatalog::diskstats`](crate::catalog::MetricCatalog::diskstats).

use std::path::PathBuf;

use chrono::NaiveDateTime;
use regex::Regex;
use serde::Serialize;
use tracing::{debug, warn};

use crate::catalog::{MetricCatalog, MetricDefinition};
use crate::error::{ProbeError, Result};

/// Number of counters taken from each diskstats line.
pub const DISKSTATS_COUNTERS: usize = 11;

/// One device's counters at one instant, aligned to catalog positions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Snapshot {
    pub device: String,
    pub timestamp: NaiveDateTime,
    pub values: Vec<u64>,
}

impl Snapshot {
    pub fn value(&self, metric: &MetricDefinition) -> Option<u64> {
        self.values.get(metric.position).copied()
    }
}

/// Produces the current counters of every admitted device.
pub trait CounterSource {
    /// Read all devices, stamping each snapshot with `taken_at`. The result is
    /// sorted by device name.
    fn read(&self, taken_at: NaiveDateTime) -> Result<Vec<Snapshot>>;
}

/// Admission test for devices: major-number allowlist plus partition
/// exclusion. Under the "disk" majors any digit-suffixed name is a
/// partition; under every major a `<digit>p<N>` suffix is one
/// (`nvme0n1p1`, `md127p2`).
#[derive(Debug, Clone)]
pub struct DeviceFilter {
    majors: Vec<u32>,
    disk_majors: Vec<u32>,
    partition: Regex,
    numbered_partition: Regex,
}

impl DeviceFilter {
    pub fn new(majors: Vec<u32>, disk_majors: Vec<u32>) -> Self {
        Self {
            majors,
            disk_majors,
            partition: Regex::new(r"\d$").expect("static partition pattern"),
            numbered_partition: Regex::new(r"\dp\d+$").expect("static partition pattern"),
        }
    }

    pub fn admits(&self, major: u32, name: &str) -> bool {
        if !self.majors.contains(&major) || self.numbered_partition.is_match(name) {
            return false;
        }
        !(self.disk_majors.contains(&major) && self.partition.is_match(name))
    }
}

/// `/proc/diskstats` reader.
#[derive(Debug, Clone)]
pub struct ProcDiskstats {
    path: PathBuf,
    filter: DeviceFilter,
}

impl ProcDiskstats {
    pub fn new(path: impl Into<PathBuf>, filter: DeviceFilter) -> Self {
        Self {
            path: path.into(),
            filter,
        }
    }

    /// Parse diskstats content. Lines with too few fields or non-numeric
    /// counters are skipped.
    pub fn parse(&self, content: &str, taken_at: NaiveDateTime) -> Vec<Snapshot> {
        let mut snapshots = Vec::new();

        for line in content.lines() {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.is_empty() {
                continue;
            }
            if parts.len() < 3 + DISKSTATS_COUNTERS {
                debug!(line, "diskstats line too short, skipping");
                continue;
            }

            let Ok(major) = parts[0].parse::<u32>() else {
                warn!(line, "diskstats line has non-numeric major");
                continue;
            };
            let device = parts[2];
            if !self.filter.admits(major, device) {
                continue;
            }

            let values: std::result::Result<Vec<u64>, _> = parts[3..3 + DISKSTATS_COUNTERS]
                .iter()
                .map(|v| v.parse::<u64>())
                .collect();
            let Ok(values) = values else {
                warn!(device, "diskstats counters not numeric, skipping device");
                continue;
            };

            snapshots.push(Snapshot {
                device: device.to_string(),
                timestamp: taken_at,
                values,
            });
        }

        snapshots.sort_by(|a, b| a.device.cmp(&b.device));
        snapshots.dedup_by(|a, b| a.device == b.device);
        snapshots
    }
}

impl CounterSource for ProcDiskstats {
    fn read(&self, taken_at: NaiveDateTime) -> Result<Vec<Snapshot>> {
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ProbeError::SourceUnavailable(format!("{}: {e}", self.path.display()))
        })?;
        let snapshots = self.parse(&content, taken_at);
        debug!(
            path = %self.path.display(),
            device_count = snapshots.len(),
            "counter snapshot read"
        );
        Ok(snapshots)
    }
}

/// Fixed in-memory source, for replaying captured counters.
#[derive(Debug, Clone, Default)]
pub struct StaticSource {
    devices: Vec<(String, Vec<u64>)>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_device(mut self, device: impl Into<String>, values: Vec<u64>) -> Self {
        self.devices.push((device.into(), values));
        self
    }
}

impl CounterSource for StaticSource {
    fn read(&self, taken_at: NaiveDateTime) -> Result<Vec<Snapshot>> {
        let mut snapshots: Vec<Snapshot> = self
            .devices
            .iter()
            .map(|(device, values)| Snapshot {
                device: device.clone(),
                timestamp: taken_at,
                values: values.clone(),
            })
            .collect();
        snapshots.sort_by(|a, b| a.device.cmp(&b.device));
        Ok(snapshots)
    }
}

/// Check that a snapshot carries every catalog position.
pub fn covers_catalog(snapshot: &Snapshot, catalog: &MetricCatalog) -> bool {
    snapshot.values.len() >= catalog.len()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    const SAMPLE: &str = r#"   8       0 sda 12345 6789 1000000 50000 5432 2100 500000 25000 0 30000 75000 0 0 0 0
   8       1 sda1 10000 5000 800000 40000 4000 1800 400000 20000 0 25000 60000 0 0 0 0
 259       0 nvme0n1 50000 0 2000000 100000 30000 0 1500000 80000 2 120000 180000 0 0 0 0
 259       1 nvme0n1p1 40000 0 1600000 90000 20000 0 1000000 60000 0 90000 150000 0 0 0 0
   7       0 loop0 100 0 200 10 0 0 0 0 0 5 5 0 0 0 0
 253       0 dm-0 700 0 5600 70 300 0 2400 30 0 90 100
"#;

    fn at() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2025, 3, 14)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap()
    }

    fn reader() -> ProcDiskstats {
        ProcDiskstats::new(
            "/proc/diskstats",
            DeviceFilter::new(vec![3, 8, 9, 202, 253, 259], vec![3, 8, 202]),
        )
    }

    #[test]
    fn parse_admits_disks_and_skips_partitions() {
        let snaps = reader().parse(SAMPLE, at());
        let names: Vec<_> = snaps.iter().map(|s| s.device.as_str()).collect();
        assert_eq!(names, vec!["dm-0", "nvme0n1", "sda"]);

        let sda = snaps.iter().find(|s| s.device == "sda").unwrap();
        assert_eq!(sda.values.len(), DISKSTATS_COUNTERS);
        assert_eq!(sda.values[0], 12345);
        assert_eq!(sda.values[2], 1_000_000);
        assert_eq!(sda.values[9], 30000);
        assert_eq!(sda.timestamp, at());
    }

    #[test]
    fn partition_rule_only_applies_to_disk_majors() {
        let filter = DeviceFilter::new(vec![8, 259], vec![8]);
        assert!(filter.admits(8, "sdb"));
        assert!(!filter.admits(8, "sdb3"));
        assert!(filter.admits(259, "nvme0n1"));
        assert!(!filter.admits(7, "loop0"));
    }

    #[test]
    fn numbered_partitions_excluded_under_any_major() {
        let filter = DeviceFilter::new(vec![9, 253, 259], vec![8]);
        assert!(!filter.admits(259, "nvme0n1p1"));
        assert!(!filter.admits(259, "nvme10n2p12"));
        assert!(!filter.admits(9, "md127p2"));
        assert!(filter.admits(9, "md127"));
        assert!(filter.admits(253, "dm-0"));
    }

    #[test]
    fn parse_skips_short_and_garbled_lines() {
        let content = "8 0 sda 1 2 3\n8 16 sdb 1 2 x 4 5 6 7 8 9 10 11\n\n";
        assert!(reader().parse(content, at()).is_empty());
    }

    #[test]
    fn missing_file_is_source_unavailable() {
        let source = ProcDiskstats::new(
            "/nonexistent/diskstats",
            DeviceFilter::new(vec![8], vec![8]),
        );
        assert!(matches!(
            source.read(at()),
            Err(ProbeError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn static_source_sorts_devices() {
        let source = StaticSource::new()
            .with_device("sdb", vec![1])
            .with_device("sda", vec![2]);
        let snaps = source.read(at()).unwrap();
        assert_eq!(snaps[0].device, "sda");
        assert_eq!(snaps[1].device, "sdb");
    }
}
