// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;

use thiserror::Error;

use crate::report::Status;

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("counter source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("history storage error at {path}: {source}")]
    Storage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("no history found: {0}")]
    NoHistoryFound(String),
    #[error("malformed log line {line:?}: {reason}")]
    MalformedLogLine { line: String, reason: String },
    #[error("invalid rate window: elapsed {0}s")]
    InvalidWindow(i64),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    pub fn storage(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Storage {
            path: path.into(),
            source,
        }
    }

    /// Terminal status a run ends with when this error reaches the top.
    pub fn status(&self) -> Status {
        match self {
            ProbeError::NoHistoryFound(_) | ProbeError::InvalidConfig(_) => Status::Unknown,
            ProbeError::SourceUnavailable(_)
            | ProbeError::Storage { .. }
            | ProbeError::MalformedLogLine { .. }
            | ProbeError::InvalidWindow(_)
            | ProbeError::Io(_) => Status::Critical,
        }
    }
}

pub type Result<T> = std::result::Result<T, ProbeError>;
