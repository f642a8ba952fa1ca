// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Diagnostic logging setup. Everything goes to stderr; stdout carries only
//! the status line or JSON document.

use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{ProbeError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Compact,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "pretty" => Some(Self::Pretty),
            "compact" => Some(Self::Compact),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
    pub format: LogFormat,
}

impl LogConfig {
    /// Reads `DISKAVG_LOG_LEVEL` and `DISKAVG_LOG_FORMAT`.
    pub fn from_env(default_level: &str) -> Self {
        let level = std::env::var("DISKAVG_LOG_LEVEL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| default_level.to_string());
        let format = std::env::var("DISKAVG_LOG_FORMAT")
            .ok()
            .and_then(|v| LogFormat::parse(&v))
            .unwrap_or(LogFormat::Compact);
        Self { level, format }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    /// `RUST_LOG` wins over the configured level when it parses.
    pub fn env_filter(&self) -> EnvFilter {
        if std::env::var_os("RUST_LOG").is_some() {
            if let Ok(filter) = EnvFilter::try_from_default_env() {
                return filter;
            }
        }
        EnvFilter::new(&self.level)
    }
}

pub fn init_logging(config: &LogConfig) -> Result<()> {
    let builder = fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(config.env_filter())
        .with_target(false);

    let result = match config.format {
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ProbeError::Io(std::io::Error::other(e.to_string())))
}
