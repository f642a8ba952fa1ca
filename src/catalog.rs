// Copyright 2025 StrongDM Inc
// SPDX-License-Identifier: Apache-2.0

//! Metric catalog: the ordered set of counters read from a device record.
//!
//! Catalog order is shared by the history writer and reader. Every metric is
//! logged; only `checked` metrics produce averages. Reordering the catalog
//! without migrating existing day logs breaks readback.

use serde::Serialize;

use crate::error::{ProbeError, Result};

/// Bytes per sector as reported by the block layer, independent of the
/// device's physical sector size.
pub const SECTOR_BYTES: f64 = 512.0;

/// Post-processing applied to a computed rate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", content = "factor", rename_all = "snake_case")]
pub enum Transform {
    Identity,
    Scale(f64),
}

impl Transform {
    pub fn apply(self, rate: f64) -> f64 {
        match self {
            Transform::Identity => rate,
            Transform::Scale(factor) => rate * factor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricDefinition {
    pub name: &'static str,
    pub position: usize,
    pub checked: bool,
    pub unit: &'static str,
    pub transform: Transform,
}

impl MetricDefinition {
    const fn new(
        name: &'static str,
        position: usize,
        checked: bool,
        unit: &'static str,
        transform: Transform,
    ) -> Self {
        Self {
            name,
            position,
            checked,
            unit,
            transform,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricCatalog {
    metrics: Vec<MetricDefinition>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::diskstats()
    }
}

impl MetricCatalog {
    /// Build a catalog from explicit definitions. Positions must be unique
    /// and dense (0..n) since they index both snapshot and log values.
    pub fn new(mut metrics: Vec<MetricDefinition>) -> Result<Self> {
        metrics.sort_by_key(|m| m.position);
        for (idx, metric) in metrics.iter().enumerate() {
            if metric.position != idx {
                return Err(ProbeError::InvalidConfig(format!(
                    "catalog position {} for metric {} is not dense",
                    metric.position, metric.name
                )));
            }
        }
        for (idx, metric) in metrics.iter().enumerate() {
            if metrics[..idx].iter().any(|m| m.name == metric.name) {
                return Err(ProbeError::InvalidConfig(format!(
                    "duplicate catalog metric {}",
                    metric.name
                )));
            }
        }
        Ok(Self { metrics })
    }

    /// The eleven classic `/proc/diskstats` counters, in kernel field order.
    pub fn diskstats() -> Self {
        use Transform::{Identity, Scale};
        Self {
            metrics: vec![
                MetricDefinition::new("rio", 0, true, "ops/s", Identity),
                MetricDefinition::new("rmerge", 1, false, "ops/s", Identity),
                MetricDefinition::new("rsect", 2, true, "B/s", Scale(SECTOR_BYTES)),
                MetricDefinition::new("ruse", 3, false, "ms/s", Identity),
                MetricDefinition::new("wio", 4, true, "ops/s", Identity),
                MetricDefinition::new("wmerge", 5, false, "ops/s", Identity),
                MetricDefinition::new("wsect", 6, true, "B/s", Scale(SECTOR_BYTES)),
                MetricDefinition::new("wuse", 7, false, "ms/s", Identity),
                // in-flight gauge, logged but never averaged
                MetricDefinition::new("running", 8, false, "", Identity),
                // ms busy per second / 10 = percent busy
                MetricDefinition::new("use", 9, true, "%", Scale(0.1)),
                MetricDefinition::new("aveq", 10, false, "ms/s", Identity),
            ],
        }
    }

    /// Replace the checked set with exactly `names`.
    pub fn with_checked<S: AsRef<str>>(mut self, names: &[S]) -> Result<Self> {
        for name in names {
            let name = name.as_ref();
            if self.get(name).is_none() {
                return Err(ProbeError::InvalidConfig(format!(
                    "unknown metric {name:?} in checked set"
                )));
            }
        }
        for metric in &mut self.metrics {
            metric.checked = names.iter().any(|n| n.as_ref() == metric.name);
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter()
    }

    pub fn checked(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.iter().filter(|m| m.checked)
    }

    pub fn get(&self, name: &str) -> Option<&MetricDefinition> {
        self.metrics.iter().find(|m| m.name == name)
    }
}
