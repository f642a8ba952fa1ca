// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use tracing::warn;

use crate::catalog::MetricCatalog;
use crate::error::{ProbeError, Result};
use crate::report::ReportOptions;

/// Longest supported window: today's log plus yesterday's cover one day.
pub const MAX_INTERVAL_MINUTES: u32 = 24 * 60;

#[derive(Debug, Clone)]
pub struct Config {
    pub log_dir: PathBuf,
    pub archive_subdir: String,
    pub intervals: Vec<u32>,
    pub majors: Vec<u32>,
    pub disk_majors: Vec<u32>,
    pub diskstats_path: PathBuf,
    /// Checked-set override; `None` keeps the catalog defaults.
    pub metrics: Option<Vec<String>>,
    pub absent_value: String,
    pub precision: usize,
    pub append: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("/var/lib/diskavg/log"),
            archive_subdir: "archive".to_string(),
            intervals: vec![1, 5, 15],
            majors: vec![3, 8, 9, 202, 253, 259],
            disk_majors: vec![3, 8, 202],
            diskstats_path: PathBuf::from("/proc/diskstats"),
            metrics: None,
            absent_value: "0".to_string(),
            precision: 2,
            append: true,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            log_dir: env_path("DISKAVG_LOG_DIR", defaults.log_dir),
            archive_subdir: env_string("DISKAVG_ARCHIVE_SUBDIR", defaults.archive_subdir),
            intervals: env_u32_list("DISKAVG_INTERVALS", defaults.intervals),
            majors: env_u32_list("DISKAVG_MAJORS", defaults.majors),
            disk_majors: env_u32_list("DISKAVG_DISK_MAJORS", defaults.disk_majors),
            diskstats_path: env_path("DISKAVG_DISKSTATS", defaults.diskstats_path),
            metrics: std::env::var("DISKAVG_METRICS")
                .ok()
                .map(|v| parse_name_list(&v))
                .filter(|names| !names.is_empty()),
            absent_value: env_string("DISKAVG_ABSENT_VALUE", defaults.absent_value),
            precision: env_usize("DISKAVG_PRECISION", defaults.precision),
            append: defaults.append,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.intervals.is_empty() {
            return Err(ProbeError::InvalidConfig(
                "at least one interval is required".into(),
            ));
        }
        if let Some(bad) = self
            .intervals
            .iter()
            .find(|&&i| i == 0 || i > MAX_INTERVAL_MINUTES)
        {
            return Err(ProbeError::InvalidConfig(format!(
                "interval {bad} outside 1..={MAX_INTERVAL_MINUTES} minutes"
            )));
        }
        if self.majors.is_empty() {
            return Err(ProbeError::InvalidConfig(
                "major allowlist is empty".into(),
            ));
        }
        if self.archive_subdir.trim().is_empty() {
            return Err(ProbeError::InvalidConfig(
                "archive subdirectory is empty".into(),
            ));
        }
        self.catalog().map(|_| ())
    }

    pub fn catalog(&self) -> Result<MetricCatalog> {
        let catalog = MetricCatalog::diskstats();
        match &self.metrics {
            Some(names) => catalog.with_checked(names.as_slice()),
            None => Ok(catalog),
        }
    }

    pub fn report_options(&self) -> ReportOptions {
        ReportOptions {
            absent_value: self.absent_value.clone(),
            precision: self.precision,
        }
    }
}

pub fn parse_u32_list(value: &str) -> std::result::Result<Vec<u32>, std::num::ParseIntError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::parse::<u32>)
        .collect()
}

pub fn parse_name_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_string(key: &str, default: String) -> String {
    std::env::var(key)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or(default)
}

fn env_path(key: &str, default: PathBuf) -> PathBuf {
    std::env::var_os(key)
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or(default)
}

fn env_usize(key: &str, default: usize) -> usize {
    match std::env::var(key) {
        Ok(raw) => usize_or(key, &raw, default),
        Err(_) => default,
    }
}

fn usize_or(key: &str, raw: &str, default: usize) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(v) => v,
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring unparsable number");
            default
        }
    }
}

fn env_u32_list(key: &str, default: Vec<u32>) -> Vec<u32> {
    let Ok(raw) = std::env::var(key) else {
        return default;
    };
    match parse_u32_list(&raw) {
        Ok(list) => list,
        Err(err) => {
            warn!(key, value = %raw, error = %err, "ignoring unparsable list");
            default
        }
    }
}
