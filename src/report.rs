// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Status rendering in the monitoring-plugin convention:
//! `STATUS - summary | label=value label=value ...` and exit codes
//! 0 OK, 1 WARNING, 2 CRITICAL, 3 UNKNOWN.

use std::fmt::Write as _;

use serde::Serialize;

use crate::error::{ProbeError, Result};
use crate::probe::ProbeOutcome;
use crate::window::AverageResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Ok,
    Warning,
    Critical,
    Unknown,
}

impl Status {
    pub fn exit_code(self) -> u8 {
        match self {
            Status::Ok => 0,
            Status::Warning => 1,
            Status::Critical => 2,
            Status::Unknown => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Status::Ok => "OK",
            Status::Warning => "WARNING",
            Status::Critical => "CRITICAL",
            Status::Unknown => "UNKNOWN",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// One plugin status line with perfdata.
    #[default]
    Status,
    /// Pretty-printed JSON document.
    Json,
}

#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Rendered in place of absent averages.
    pub absent_value: String,
    /// Decimal places for computed averages.
    pub precision: usize,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            absent_value: "0".to_string(),
            precision: 2,
        }
    }
}

pub fn perfdata_label(result: &AverageResult) -> String {
    format!("{}_{}_{}m", result.device, result.metric, result.interval)
}

pub fn render_status_line(outcome: &ProbeOutcome, options: &ReportOptions) -> String {
    let report = &outcome.report;
    let mut line = format!(
        "{} - {} devices, {}/{} averages",
        outcome.status().label(),
        report.devices().len(),
        report.computed(),
        report.results.len()
    );
    if let Some(err) = &outcome.append_error {
        // `|` starts the perfdata section
        let _ = write!(line, ", history not updated: {}", err.replace('|', "/"));
    }

    if !report.is_empty() {
        line.push_str(" |");
        for result in &report.results {
            let value = match result.value {
                Some(v) => format!("{:.*}", options.precision, v),
                None => options.absent_value.clone(),
            };
            let _ = write!(line, " {}={}", perfdata_label(result), value);
        }
    }
    line
}

pub fn render_failure(err: &ProbeError) -> String {
    format!("{} - {err}", err.status().label())
}

#[derive(Serialize)]
struct OutcomeDocument<'a> {
    status: Status,
    #[serde(flatten)]
    outcome: &'a ProbeOutcome,
}

#[derive(Serialize)]
struct FailureDocument {
    status: Status,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    kind: Option<&'static str>,
}

pub fn render_json(outcome: &ProbeOutcome) -> Result<String> {
    let doc = OutcomeDocument {
        status: outcome.status(),
        outcome,
    };
    serde_json::to_string_pretty(&doc).map_err(|e| ProbeError::Io(std::io::Error::other(e)))
}

pub fn render_failure_json(err: &ProbeError) -> Result<String> {
    let kind = match err {
        ProbeError::NoHistoryFound(_) => Some("no_history"),
        ProbeError::InvalidConfig(_) => Some("config"),
        ProbeError::SourceUnavailable(_) => Some("source"),
        _ => None,
    };
    let doc = FailureDocument {
        status: err.status(),
        error: err.to_string(),
        kind,
    };
    serde_json::to_string_pretty(&doc).map_err(|e| ProbeError::Io(std::io::Error::other(e)))
}
