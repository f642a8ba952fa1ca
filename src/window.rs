// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Window resolution: pick a baseline record per device and interval, then
//! turn (current, baseline) pairs into rates.
//!
//! The baseline for an interval of `n` minutes is the most recent record of
//! that device whose age is at least `n * 60` seconds. Records are visited
//! newest first (today's file backwards, then yesterday's backwards). All
//! checked metrics of a device/interval share one baseline.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::debug;

use crate::catalog::MetricCatalog;
use crate::error::Result;
use crate::history::{DatedRecord, LogRecord};
use crate::rate::compute_rate;
use crate::source::Snapshot;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AverageResult {
    pub device: String,
    /// Window length in minutes.
    pub interval: u32,
    pub metric: &'static str,
    /// `None` when no record was old enough; distinct from a zero rate.
    pub value: Option<f64>,
}

/// Results ordered by device, then configured interval, then catalog order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AverageReport {
    pub results: Vec<AverageResult>,
}

impl AverageReport {
    pub fn get(&self, device: &str, interval: u32, metric: &str) -> Option<&AverageResult> {
        self.results
            .iter()
            .find(|r| r.device == device && r.interval == interval && r.metric == metric)
    }

    pub fn devices(&self) -> BTreeSet<&str> {
        self.results.iter().map(|r| r.device.as_str()).collect()
    }

    pub fn computed(&self) -> usize {
        self.results.iter().filter(|r| r.value.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
enum Baseline<'a> {
    Pending,
    Found { record: &'a LogRecord, age_secs: i64 },
}

/// Resolve every (device, interval, checked metric) of `snapshots` against a
/// chronological `timeline`.
pub fn resolve(
    snapshots: &[Snapshot],
    timeline: &[DatedRecord<'_>],
    intervals: &[u32],
    catalog: &MetricCatalog,
) -> Result<AverageReport> {
    let mut report = AverageReport::default();

    for snapshot in snapshots {
        let baselines = find_baselines(snapshot, timeline, intervals);

        for (&interval, baseline) in intervals.iter().zip(&baselines) {
            for metric in catalog.checked() {
                let value = match *baseline {
                    Baseline::Pending => None,
                    Baseline::Found { record, age_secs } => {
                        match (snapshot.value(metric), record.value(metric)) {
                            (Some(current), Some(past)) => {
                                Some(compute_rate(current, past, age_secs, metric)?)
                            }
                            _ => None,
                        }
                    }
                };
                report.results.push(AverageResult {
                    device: snapshot.device.clone(),
                    interval,
                    metric: metric.name,
                    value,
                });
            }
        }
    }

    Ok(report)
}

fn find_baselines<'a>(
    snapshot: &Snapshot,
    timeline: &[DatedRecord<'a>],
    intervals: &[u32],
) -> Vec<Baseline<'a>> {
    let mut baselines = vec![Baseline::Pending; intervals.len()];
    let mut pending = intervals.len();

    for entry in timeline.iter().rev() {
        if pending == 0 {
            break;
        }
        if entry.record.device != snapshot.device {
            continue;
        }
        let age_secs = (snapshot.timestamp - entry.at).num_seconds();
        for (slot, &interval) in baselines.iter_mut().zip(intervals) {
            if matches!(slot, Baseline::Pending) && age_secs >= i64::from(interval) * 60 {
                *slot = Baseline::Found {
                    record: entry.record,
                    age_secs,
                };
                pending -= 1;
            }
        }
    }

    if pending > 0 {
        debug!(
            device = %snapshot.device,
            unresolved = pending,
            "not enough history for some intervals"
        );
    }
    baselines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProbeError;
    use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
    }

    fn at(h: u32, m: u32, s: u32) -> NaiveDateTime {
        day().and_hms_opt(h, m, s).unwrap()
    }

    fn record(device: &str, h: u32, m: u32, s: u32, first: u64) -> LogRecord {
        LogRecord {
            time: NaiveTime::from_hms_opt(h, m, s).unwrap(),
            device: device.to_string(),
            values: vec![first, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    fn timeline(records: &[LogRecord]) -> Vec<DatedRecord<'_>> {
        records
            .iter()
            .map(|record| DatedRecord {
                at: day().and_time(record.time),
                record,
            })
            .collect()
    }

    fn snapshot(device: &str, when: NaiveDateTime, first: u64) -> Snapshot {
        Snapshot {
            device: device.to_string(),
            timestamp: when,
            values: vec![first, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0],
        }
    }

    #[test]
    fn most_recent_qualifying_record_wins() {
        // ages at 12:10:00: 5m30s, 5m01s, 4m59s
        let records = vec![
            record("sda", 12, 4, 30, 100),
            record("sda", 12, 4, 59, 200),
            record("sda", 12, 5, 1, 300),
        ];
        let snaps = vec![snapshot("sda", at(12, 10, 0), 501)];
        let report =
            resolve(&snaps, &timeline(&records), &[5], &MetricCatalog::diskstats()).unwrap();

        let rio = report.get("sda", 5, "rio").unwrap().value.unwrap();
        // baseline is the 12:04:59 record (301s old)
        assert!((rio - 301.0 / 301.0).abs() < 1e-9, "rio {rio}");
    }

    #[test]
    fn device_without_history_is_absent_not_zero() {
        let records = vec![record("sda", 11, 0, 0, 0)];
        let snaps = vec![snapshot("sdb", at(12, 0, 0), 10)];
        let report =
            resolve(&snaps, &timeline(&records), &[1, 5], &MetricCatalog::diskstats()).unwrap();

        assert_eq!(report.results.len(), 2 * 5);
        assert!(report.results.iter().all(|r| r.value.is_none()));
        assert_eq!(report.computed(), 0);
    }

    #[test]
    fn unchanged_counters_yield_a_computed_zero() {
        let records = vec![record("sda", 11, 50, 0, 42)];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 42)];
        let report =
            resolve(&snaps, &timeline(&records), &[5], &MetricCatalog::diskstats()).unwrap();
        assert_eq!(report.get("sda", 5, "rio").unwrap().value, Some(0.0));
    }

    #[test]
    fn intervals_resolve_independently_in_one_scan() {
        let records = vec![
            record("sda", 11, 40, 0, 0),
            record("sda", 11, 55, 0, 600),
            record("sda", 11, 59, 30, 900),
        ];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 1200)];
        let report = resolve(
            &snaps,
            &timeline(&records),
            &[1, 5, 15, 60],
            &MetricCatalog::diskstats(),
        )
        .unwrap();

        // 1m: 11:55 (300s), 5m: 11:55 (300s), 15m: 11:40 (1200s), 60m: absent
        assert_eq!(report.get("sda", 1, "rio").unwrap().value, Some(2.0));
        assert_eq!(report.get("sda", 5, "rio").unwrap().value, Some(2.0));
        assert_eq!(report.get("sda", 15, "rio").unwrap().value, Some(1.0));
        assert_eq!(report.get("sda", 60, "rio").unwrap().value, None);
    }

    #[test]
    fn skewed_records_follow_file_order() {
        // file order with a backwards clock step and a record from the future
        let records = vec![
            record("sda", 11, 50, 0, 0),
            record("sda", 11, 58, 0, 100),
            record("sda", 11, 52, 0, 300),
            record("sda", 12, 5, 0, 999),
        ];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 900)];
        let report =
            resolve(&snaps, &timeline(&records), &[1, 5], &MetricCatalog::diskstats()).unwrap();

        // 12:05 has a negative age and is passed over; 11:52 (480s) is the
        // first qualifying line scanning backwards, ahead of 11:58
        let expected = Some((900.0 - 300.0) / 480.0);
        assert_eq!(report.get("sda", 1, "rio").unwrap().value, expected);
        assert_eq!(report.get("sda", 5, "rio").unwrap().value, expected);
    }

    #[test]
    fn future_only_history_is_absent() {
        let records = vec![record("sda", 12, 30, 0, 5)];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 10)];
        let report =
            resolve(&snaps, &timeline(&records), &[1], &MetricCatalog::diskstats()).unwrap();
        assert_eq!(report.get("sda", 1, "rio").unwrap().value, None);
    }

    #[test]
    fn unchecked_metrics_never_reported() {
        let records = vec![record("sda", 11, 0, 0, 0)];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 10)];
        let catalog = MetricCatalog::diskstats();
        let report = resolve(&snaps, &timeline(&records), &[5], &catalog).unwrap();

        for metric in catalog.iter().filter(|m| !m.checked) {
            assert!(report.results.iter().all(|r| r.metric != metric.name));
        }
    }

    #[test]
    fn short_records_leave_missing_positions_absent() {
        let mut short = record("sda", 11, 0, 0, 0);
        short.values.truncate(3);
        let records = vec![short];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 3600)];
        let report =
            resolve(&snaps, &timeline(&records), &[5], &MetricCatalog::diskstats()).unwrap();

        assert_eq!(report.get("sda", 5, "rio").unwrap().value, Some(1.0));
        assert_eq!(report.get("sda", 5, "wio").unwrap().value, None);
    }

    #[test]
    fn same_inputs_same_report() {
        let records = vec![record("sda", 11, 0, 0, 5), record("sda", 11, 58, 0, 9)];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 77)];
        let catalog = MetricCatalog::diskstats();
        let first = resolve(&snaps, &timeline(&records), &[1, 15], &catalog).unwrap();
        let second = resolve(&snaps, &timeline(&records), &[1, 15], &catalog).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn zero_length_interval_hits_the_window_guard() {
        let records = vec![record("sda", 12, 0, 0, 5)];
        let snaps = vec![snapshot("sda", at(12, 0, 0), 7)];
        let err = resolve(&snaps, &timeline(&records), &[0], &MetricCatalog::diskstats())
            .unwrap_err();
        assert!(matches!(err, ProbeError::InvalidWindow(0)));
    }
}
