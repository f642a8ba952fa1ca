// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Day-partitioned, append-only counter history.
//!
//! One plain-text file per calendar day, `<base_dir>/log-YYYY-MM-DD`, one
//! line per device per run:
//! ```text
//! HH:MM:SS <device> <v0> <v1> ... <vN>
//! ```
//! with all catalog counters in catalog order. Rotated logs live in
//! `<base_dir>/../<archive_subdir>/` and are only ever read, never written.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use chrono::{NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use tracing::{debug, warn};

use crate::catalog::MetricDefinition;
use crate::error::{ProbeError, Result};
use crate::source::Snapshot;

const LOG_PREFIX: &str = "log-";
const ZSTD_SUFFIX: &str = ".zst";
const TIME_FORMAT: &str = "%H:%M:%S";

/// Where a day's log may be found. Lookups try strategies in order and stop
/// at the first file that exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStrategy {
    /// `<base_dir>/log-D`
    Primary,
    /// `<base_dir>/../<archive>/log-D`
    Archive,
    /// `<base_dir>/../<archive>/log-D.zst`
    ArchiveZstd,
}

impl LookupStrategy {
    pub fn is_archive(self) -> bool {
        matches!(self, LookupStrategy::Archive | LookupStrategy::ArchiveZstd)
    }
}

/// Lookup order for the previous day's log.
pub const PREVIOUS_DAY_LOOKUP: [LookupStrategy; 3] = [
    LookupStrategy::Primary,
    LookupStrategy::Archive,
    LookupStrategy::ArchiveZstd,
];

const ARCHIVE_LOOKUP: [LookupStrategy; 2] = [LookupStrategy::Archive, LookupStrategy::ArchiveZstd];

/// One device's counters at one time of day, as persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub time: NaiveTime,
    pub device: String,
    pub values: Vec<u64>,
}

impl LogRecord {
    pub fn from_snapshot(snapshot: &Snapshot) -> Self {
        let time = snapshot.timestamp.time();
        Self {
            time: time.with_nanosecond(0).unwrap_or(time),
            device: snapshot.device.clone(),
            values: snapshot.values.clone(),
        }
    }

    pub fn value(&self, metric: &MetricDefinition) -> Option<u64> {
        self.values.get(metric.position).copied()
    }

    /// Encode as one log line, newline included.
    pub fn encode(&self) -> String {
        let mut line = format!("{} {}", self.time.format(TIME_FORMAT), self.device);
        for value in &self.values {
            line.push(' ');
            line.push_str(&value.to_string());
        }
        line.push('\n');
        line
    }

    pub fn parse(line: &str) -> Result<Self> {
        let malformed = |reason: &str| ProbeError::MalformedLogLine {
            line: line.to_string(),
            reason: reason.to_string(),
        };

        let mut fields = line.split_whitespace();
        let time = fields.next().ok_or_else(|| malformed("empty line"))?;
        let time = NaiveTime::parse_from_str(time, TIME_FORMAT)
            .map_err(|e| malformed(&format!("bad time: {e}")))?;
        let device = fields
            .next()
            .ok_or_else(|| malformed("missing device"))?
            .to_string();
        let values = fields
            .map(|v| v.parse::<u64>())
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| malformed(&format!("bad counter: {e}")))?;
        if values.is_empty() {
            return Err(malformed("no counters"));
        }

        Ok(Self {
            time,
            device,
            values,
        })
    }
}

/// Parse a whole day file, skipping malformed lines.
pub fn parse_records(content: &str) -> Vec<LogRecord> {
    let mut records = Vec::new();
    for line in content.lines() {
        if line.trim().is_empty() {
            continue;
        }
        match LogRecord::parse(line) {
            Ok(record) => records.push(record),
            Err(err) => warn!(error = %err, "skipping history line"),
        }
    }
    records
}

pub fn day_file_name(date: NaiveDate) -> String {
    format!("{LOG_PREFIX}{}", date.format("%Y-%m-%d"))
}

/// Records of one day, in file order.
#[derive(Debug, Clone)]
pub struct DayLog {
    pub date: NaiveDate,
    pub found_in: LookupStrategy,
    pub path: PathBuf,
    pub records: Vec<LogRecord>,
}

/// A history record anchored to its calendar day.
#[derive(Debug, Clone, Copy)]
pub struct DatedRecord<'a> {
    pub at: NaiveDateTime,
    pub record: &'a LogRecord,
}

/// What a run could read: today's log and, near midnight, yesterday's.
#[derive(Debug, Clone, Default)]
pub struct History {
    pub today: Option<DayLog>,
    pub yesterday: Option<DayLog>,
    /// Whether the run was close enough to midnight to need yesterday.
    pub yesterday_consulted: bool,
}

impl History {
    /// No day file was found at all.
    pub fn is_empty(&self) -> bool {
        self.today.is_none() && self.yesterday.is_none()
    }

    /// Yesterday was needed but neither the primary nor an archive location
    /// had it.
    pub fn yesterday_missing(&self) -> bool {
        self.yesterday_consulted && self.yesterday.is_none()
    }

    pub fn record_count(&self) -> usize {
        self.today.iter().chain(self.yesterday.iter()).map(|d| d.records.len()).sum()
    }

    /// All records in chronological file order: yesterday's lines, then
    /// today's. Scanning this backwards visits every one of today's records
    /// before any of yesterday's.
    pub fn timeline(&self) -> Vec<DatedRecord<'_>> {
        let mut out = Vec::with_capacity(self.record_count());
        for day in self.yesterday.iter().chain(self.today.iter()) {
            out.extend(day.records.iter().map(|record| DatedRecord {
                at: day.date.and_time(record.time),
                record,
            }));
        }
        out
    }
}

pub struct HistoryLog {
    base_dir: PathBuf,
    archive_subdir: String,
}

impl HistoryLog {
    pub fn new(base_dir: impl Into<PathBuf>, archive_subdir: impl Into<String>) -> Self {
        Self {
            base_dir: base_dir.into(),
            archive_subdir: archive_subdir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.base_dir.join("..").join(&self.archive_subdir)
    }

    pub fn day_path(&self, date: NaiveDate) -> PathBuf {
        self.base_dir.join(day_file_name(date))
    }

    pub fn strategy_path(&self, strategy: LookupStrategy, date: NaiveDate) -> PathBuf {
        match strategy {
            LookupStrategy::Primary => self.day_path(date),
            LookupStrategy::Archive => self.archive_dir().join(day_file_name(date)),
            LookupStrategy::ArchiveZstd => self
                .archive_dir()
                .join(format!("{}{ZSTD_SUFFIX}", day_file_name(date))),
        }
    }

    /// Append one snapshot to its day's log.
    pub fn append(&self, snapshot: &Snapshot) -> Result<()> {
        self.append_all(std::slice::from_ref(snapshot)).map(|_| ())
    }

    /// Append snapshots to the log of the day they were taken on. All lines
    /// for one day go out in a single append-mode write.
    pub fn append_all(&self, snapshots: &[Snapshot]) -> Result<usize> {
        if !self.base_dir.is_dir() {
            return Err(ProbeError::storage(
                &self.base_dir,
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "history directory does not exist",
                ),
            ));
        }

        let mut written = 0;
        let mut start = 0;
        while start < snapshots.len() {
            let date = snapshots[start].timestamp.date();
            let end = snapshots[start..]
                .iter()
                .position(|s| s.timestamp.date() != date)
                .map_or(snapshots.len(), |offset| start + offset);

            let mut buf = String::new();
            for snapshot in &snapshots[start..end] {
                buf.push_str(&LogRecord::from_snapshot(snapshot).encode());
            }

            let path = self.day_path(date);
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|e| ProbeError::storage(&path, e))?;
            file.write_all(buf.as_bytes())
                .map_err(|e| ProbeError::storage(&path, e))?;

            debug!(path = %path.display(), lines = end - start, "history appended");
            written += end - start;
            start = end;
        }
        Ok(written)
    }

    /// Records of `date` from the primary directory; empty when the file
    /// does not exist.
    pub fn read_day(&self, date: NaiveDate) -> Result<Vec<LogRecord>> {
        Ok(self
            .lookup(date, &[LookupStrategy::Primary])?
            .map(|day| day.records)
            .unwrap_or_default())
    }

    /// Records of `date` from the archive directory, plain or zstd; empty
    /// when neither exists.
    pub fn read_archived_day(&self, date: NaiveDate) -> Result<Vec<LogRecord>> {
        Ok(self
            .lookup(date, &ARCHIVE_LOOKUP)?
            .map(|day| day.records)
            .unwrap_or_default())
    }

    /// Try each strategy in order; the first readable file wins. An archived
    /// file that cannot be read or decoded counts as not found.
    pub fn lookup(&self, date: NaiveDate, strategies: &[LookupStrategy]) -> Result<Option<DayLog>> {
        for &strategy in strategies {
            let path = self.strategy_path(strategy, date);
            let compressed = strategy == LookupStrategy::ArchiveZstd;
            let records = match read_records(&path, compressed) {
                Ok(records) => records,
                Err(err) if strategy.is_archive() => {
                    warn!(error = %err, "unreadable archived log, skipping");
                    None
                }
                Err(err) => return Err(err),
            };
            if let Some(records) = records {
                debug!(
                    path = %path.display(),
                    strategy = ?strategy,
                    records = records.len(),
                    "history day loaded"
                );
                return Ok(Some(DayLog {
                    date,
                    found_in: strategy,
                    path,
                    records,
                }));
            }
        }
        Ok(None)
    }

    /// Load what a run at `now` needs: today's log, plus yesterday's when
    /// `now` is less than `lookback_minutes` past midnight.
    pub fn load(&self, now: NaiveDateTime, lookback_minutes: u32) -> Result<History> {
        let today = now.date();
        let today_log = self.lookup(today, &[LookupStrategy::Primary])?;

        let since_midnight = i64::from(now.time().num_seconds_from_midnight());
        let yesterday_consulted = since_midnight < i64::from(lookback_minutes) * 60;
        let yesterday_log = if yesterday_consulted {
            match today.pred_opt() {
                Some(yesterday) => self.lookup(yesterday, &PREVIOUS_DAY_LOOKUP)?,
                None => None,
            }
        } else {
            None
        };

        Ok(History {
            today: today_log,
            yesterday: yesterday_log,
            yesterday_consulted,
        })
    }
}

fn read_records(path: &Path, compressed: bool) -> Result<Option<Vec<LogRecord>>> {
    let file = match File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(ProbeError::storage(path, e)),
    };

    let bytes = if compressed {
        zstd::decode_all(file).map_err(|e| ProbeError::storage(path, e))?
    } else {
        let mut buf = Vec::new();
        let mut reader = file;
        reader
            .read_to_end(&mut buf)
            .map_err(|e| ProbeError::storage(path, e))?;
        buf
    };

    Ok(Some(parse_records(&String::from_utf8_lossy(&bytes))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_line_format() {
        let record = LogRecord {
            time: NaiveTime::from_hms_opt(7, 5, 9).unwrap(),
            device: "sda".to_string(),
            values: vec![1, 22, 333],
        };
        assert_eq!(record.encode(), "07:05:09 sda 1 22 333\n");
        assert_eq!(LogRecord::parse(record.encode().trim_end()).unwrap(), record);
    }

    #[test]
    fn malformed_lines_are_rejected_individually() {
        for bad in [
            "",
            "25:00:00 sda 1 2",
            "12:00:00",
            "12:00:00 sda",
            "12:00:00 sda 1 -2 3",
            "12:00:00 sda 1 two 3",
        ] {
            assert!(
                matches!(LogRecord::parse(bad), Err(ProbeError::MalformedLogLine { .. })),
                "expected malformed: {bad:?}"
            );
        }
    }

    #[test]
    fn parse_records_skips_garbage_and_keeps_order() {
        let content = "00:00:10 sda 1 2\nnot a record\n\n00:01:10 sdb 3 4\n00:00:05 sda 5 6\n";
        let records = parse_records(content);
        let times: Vec<_> = records.iter().map(|r| r.time.to_string()).collect();
        assert_eq!(times, vec!["00:00:10", "00:01:10", "00:00:05"]);
    }

    #[test]
    fn day_file_name_is_a_function_of_the_date() {
        let date = NaiveDate::from_ymd_opt(2024, 2, 29).unwrap();
        assert_eq!(day_file_name(date), "log-2024-02-29");
    }

    #[test]
    fn archive_paths_are_siblings_of_the_base_dir() {
        let log = HistoryLog::new("/var/lib/diskavg/log", "archive");
        let date = NaiveDate::from_ymd_opt(2025, 1, 2).unwrap();
        assert_eq!(
            log.strategy_path(LookupStrategy::Primary, date),
            PathBuf::from("/var/lib/diskavg/log/log-2025-01-02")
        );
        assert_eq!(
            log.strategy_path(LookupStrategy::Archive, date),
            PathBuf::from("/var/lib/diskavg/log/../archive/log-2025-01-02")
        );
        assert_eq!(
            log.strategy_path(LookupStrategy::ArchiveZstd, date),
            PathBuf::from("/var/lib/diskavg/log/../archive/log-2025-01-02.zst")
        );
    }

    #[test]
    fn timeline_puts_yesterday_first() {
        let today = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let yesterday = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let rec = |h, m| LogRecord {
            time: NaiveTime::from_hms_opt(h, m, 0).unwrap(),
            device: "sda".to_string(),
            values: vec![0],
        };
        let history = History {
            today: Some(DayLog {
                date: today,
                found_in: LookupStrategy::Primary,
                path: PathBuf::from("t"),
                records: vec![rec(0, 1)],
            }),
            yesterday: Some(DayLog {
                date: yesterday,
                found_in: LookupStrategy::Archive,
                path: PathBuf::from("y"),
                records: vec![rec(23, 50), rec(23, 59)],
            }),
            yesterday_consulted: true,
        };
        let timeline = history.timeline();
        assert_eq!(timeline.len(), 3);
        assert_eq!(timeline[0].at, yesterday.and_hms_opt(23, 50, 0).unwrap());
        assert_eq!(timeline[2].at, today.and_hms_opt(0, 1, 0).unwrap());
        assert!(!history.yesterday_missing());
    }
}
