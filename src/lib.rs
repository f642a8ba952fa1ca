// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Block-device I/O probe with history-backed windowed averages.
//!
//! Each run reads cumulative `/proc/diskstats` counters, appends them to a
//! day-partitioned log, and derives per-second rates over the configured
//! windows from that log.

#![forbid(unsafe_code)]

pub mod catalog;
pub mod config;
pub mod error;
pub mod history;
pub mod logging;
pub mod probe;
pub mod rate;
pub mod report;
pub mod source;
pub mod window;

pub use crate::catalog::{MetricCatalog, MetricDefinition, Transform};
pub use crate::config::Config;
pub use crate::error::{ProbeError, Result};
pub use crate::history::{History, HistoryLog, LogRecord, LookupStrategy};
pub use crate::probe::{Probe, ProbeOutcome};
pub use crate::rate::compute_rate;
pub use crate::report::{OutputFormat, ReportOptions, Status};
pub use crate::source::{CounterSource, DeviceFilter, ProcDiskstats, Snapshot, StaticSource};
pub use crate::window::{resolve, AverageReport, AverageResult};
