// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

use crate::catalog::MetricDefinition;
use crate::error::{ProbeError, Result};

/// Per-second rate of a cumulative counter between a past and a current read.
///
/// A decrease (`past > current`) means the counter restarted somewhere inside
/// the window (reboot, controller reset). The rate then counts only what was
/// accumulated since zero, which underestimates by whatever happened before
/// the reset. The metric's transform is applied to the result.
pub fn compute_rate(
    current: u64,
    past: u64,
    elapsed_secs: i64,
    metric: &MetricDefinition,
) -> Result<f64> {
    if elapsed_secs <= 0 {
        return Err(ProbeError::InvalidWindow(elapsed_secs));
    }
    let delta = if past <= current {
        current - past
    } else {
        current
    };
    let rate = delta as f64 / elapsed_secs as f64;
    Ok(metric.transform.apply(rate))
}
