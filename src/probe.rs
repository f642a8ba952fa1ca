// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! One probe invocation: read counters, load history, log the snapshot,
//! resolve windowed averages.
//!
//! Runs are single-threaded and run to completion. The day log is the only
//! state shared between runs; the caller must keep runs from overlapping.

use chrono::{Local, NaiveDateTime, Timelike};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog::MetricCatalog;
use crate::config::Config;
use crate::error::{ProbeError, Result};
use crate::history::HistoryLog;
use crate::report::Status;
use crate::source::{covers_catalog, CounterSource, DeviceFilter, ProcDiskstats};
use crate::window::{resolve, AverageReport};

#[derive(Debug, Clone, Serialize)]
pub struct ProbeOutcome {
    pub taken_at: NaiveDateTime,
    pub report: AverageReport,
    /// Set when the snapshot could not be logged; averages still come from
    /// the history that already existed.
    pub append_error: Option<String>,
    /// Yesterday's log was needed but found in no location.
    pub yesterday_missing: bool,
}

impl ProbeOutcome {
    pub fn status(&self) -> Status {
        Status::Ok
    }
}

pub struct Probe<S> {
    source: S,
    log: HistoryLog,
    catalog: MetricCatalog,
    intervals: Vec<u32>,
    append: bool,
}

impl Probe<ProcDiskstats> {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;
        let source = ProcDiskstats::new(
            config.diskstats_path.clone(),
            DeviceFilter::new(config.majors.clone(), config.disk_majors.clone()),
        );
        let log = HistoryLog::new(config.log_dir.clone(), config.archive_subdir.clone());
        let probe = Probe::new(source, log, config.catalog()?, config.intervals.clone());
        Ok(if config.append {
            probe
        } else {
            probe.without_append()
        })
    }
}

impl<S: CounterSource> Probe<S> {
    pub fn new(source: S, log: HistoryLog, catalog: MetricCatalog, intervals: Vec<u32>) -> Self {
        Self {
            source,
            log,
            catalog,
            intervals,
            append: true,
        }
    }

    /// Read history without logging the current snapshot.
    pub fn without_append(mut self) -> Self {
        self.append = false;
        self
    }

    /// Run at the current local wall-clock time, truncated to seconds.
    pub fn run_now(&self) -> Result<ProbeOutcome> {
        let now = Local::now().naive_local();
        self.run(now.with_nanosecond(0).unwrap_or(now))
    }

    pub fn run(&self, now: NaiveDateTime) -> Result<ProbeOutcome> {
        let snapshots = self.source.read(now)?;
        for snapshot in &snapshots {
            if !covers_catalog(snapshot, &self.catalog) {
                warn!(
                    device = %snapshot.device,
                    values = snapshot.values.len(),
                    catalog = self.catalog.len(),
                    "snapshot shorter than catalog"
                );
            }
        }

        // history is read before the append: a snapshot is never its own baseline
        let lookback = self.intervals.iter().copied().max().unwrap_or(0);
        let history = self.log.load(now, lookback);

        let append_error = if self.append {
            match self.log.append_all(&snapshots) {
                Ok(lines) => {
                    debug!(lines, "snapshot logged");
                    None
                }
                Err(err) => {
                    warn!(error = %err, "failed to log snapshot, continuing with existing history");
                    Some(err.to_string())
                }
            }
        } else {
            None
        };

        let history = history?;
        if history.is_empty() {
            return Err(ProbeError::NoHistoryFound(format!(
                "no log for {} under {}",
                now.date(),
                self.log.base_dir().display()
            )));
        }
        if history.yesterday_missing() {
            info!(
                archive = %self.log.archive_dir().display(),
                "previous day log not found, early-morning windows may be absent"
            );
        }

        let timeline = history.timeline();
        let report = resolve(&snapshots, &timeline, &self.intervals, &self.catalog)?;
        info!(
            devices = snapshots.len(),
            records = timeline.len(),
            computed = report.computed(),
            total = report.results.len(),
            "averages resolved"
        );

        Ok(ProbeOutcome {
            taken_at: now,
            report,
            append_error,
            yesterday_missing: history.yesterday_missing(),
        })
    }
}
