// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use diskavg::config::{parse_name_list, Config};
use diskavg::logging::{init_logging, LogConfig};
use diskavg::probe::{Probe, ProbeOutcome};
use diskavg::report::{
    render_failure, render_failure_json, render_json, render_status_line, OutputFormat, Status,
};
use diskavg::{ProbeError, Result};
use tracing::error;

#[derive(Parser, Debug)]
#[command(
    name = "diskavg",
    version,
    about = "Log block-device counters and report windowed I/O averages"
)]
struct Cli {
    /// Directory holding the day logs (must exist)
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Archive directory name, resolved next to the log directory
    #[arg(long)]
    archive_subdir: Option<String>,

    /// Averaging windows in minutes
    #[arg(long, value_delimiter = ',')]
    intervals: Option<Vec<u32>>,

    /// Block-device major numbers to admit
    #[arg(long, value_delimiter = ',')]
    majors: Option<Vec<u32>>,

    /// Majors whose digit-suffixed device names are partitions
    #[arg(long, value_delimiter = ',')]
    disk_majors: Option<Vec<u32>>,

    /// Counter source path
    #[arg(long)]
    diskstats: Option<PathBuf>,

    /// Comma-separated metrics to average (replaces the default set)
    #[arg(long)]
    metrics: Option<String>,

    /// Value printed for averages without enough history
    #[arg(long)]
    absent_value: Option<String>,

    /// Decimal places in the status line
    #[arg(long)]
    precision: Option<usize>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Status)]
    format: OutputFormat,

    /// Do not log this run's snapshot
    #[arg(long)]
    no_append: bool,

    /// Enable debug logging on stderr
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn apply(self, config: &mut Config) {
        if let Some(v) = self.log_dir {
            config.log_dir = v;
        }
        if let Some(v) = self.archive_subdir {
            config.archive_subdir = v;
        }
        if let Some(v) = self.intervals {
            config.intervals = v;
        }
        if let Some(v) = self.majors {
            config.majors = v;
        }
        if let Some(v) = self.disk_majors {
            config.disk_majors = v;
        }
        if let Some(v) = self.diskstats {
            config.diskstats_path = v;
        }
        if let Some(v) = self.metrics {
            config.metrics = Some(parse_name_list(&v));
        }
        if let Some(v) = self.absent_value {
            config.absent_value = v;
        }
        if let Some(v) = self.precision {
            config.precision = v;
        }
        if self.no_append {
            config.append = false;
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mut log_config = LogConfig::from_env("warn");
    if cli.verbose {
        log_config = log_config.with_level("debug");
    }
    if let Err(err) = init_logging(&log_config) {
        eprintln!("logging setup failed: {err}");
    }

    let format = cli.format;
    let mut config = Config::from_env();
    cli.apply(&mut config);

    let outcome = Probe::from_config(&config).and_then(|probe| probe.run_now());
    let (text, status) = match outcome {
        Ok(outcome) => match render_success(&outcome, &config, format) {
            Ok(text) => (text, outcome.status()),
            Err(err) => failure(&err, format),
        },
        Err(err) => failure(&err, format),
    };

    println!("{text}");
    ExitCode::from(status.exit_code())
}

fn render_success(outcome: &ProbeOutcome, config: &Config, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Status => Ok(render_status_line(outcome, &config.report_options())),
        OutputFormat::Json => render_json(outcome),
    }
}

fn failure(err: &ProbeError, format: OutputFormat) -> (String, Status) {
    error!(error = %err, "probe run failed");
    let text = match format {
        OutputFormat::Status => render_failure(err),
        OutputFormat::Json => render_failure_json(err).unwrap_or_else(|_| render_failure(err)),
    };
    (text, err.status())
}
