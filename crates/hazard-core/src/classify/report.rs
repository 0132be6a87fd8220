//! Forecast risk summaries derived from one classification pass.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{ClassificationPass, FlagState, HazardKind};
use crate::coords::LatLon;
use crate::grid::SpatialAxes;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HazardCounts {
    pub exceeded: usize,
    pub indeterminate: usize,
    pub clear: usize,
    /// Largest severity among exceeded cells.
    pub max_severity: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskSummary {
    pub time: DateTime<Utc>,
    pub hazards: BTreeMap<HazardKind, HazardCounts>,
    /// Hazards that could not be evaluated, with the reason.
    pub failed: BTreeMap<HazardKind, String>,
    /// Cells where at least one hazard is exceeded.
    pub combined_exceeded: usize,
}

/// A cell with at least one exceeded hazard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskyPoint {
    pub time: DateTime<Utc>,
    pub location: LatLon,
    pub severities: BTreeMap<HazardKind, f32>,
}

impl RiskyPoint {
    pub fn hazards(&self) -> impl Iterator<Item = HazardKind> + '_ {
        self.severities.keys().copied()
    }
}

/// Per-cell union of exceedances over every hazard that evaluated.
pub fn combined_mask(pass: &ClassificationPass) -> Vec<bool> {
    let mut mask: Vec<bool> = Vec::new();
    for flags in pass.results.values().filter_map(|r| r.as_ref().ok()) {
        if mask.is_empty() {
            mask = vec![false; flags.cells.len()];
        }
        for (m, f) in mask.iter_mut().zip(&flags.cells) {
            *m |= f.is_exceeded();
        }
    }
    mask
}

pub fn summarize_pass(pass: &ClassificationPass) -> RiskSummary {
    let mut hazards = BTreeMap::new();
    let mut failed = BTreeMap::new();
    for (&hazard, result) in &pass.results {
        match result {
            Ok(flags) => {
                let max_severity = flags
                    .cells
                    .iter()
                    .filter(|c| c.is_exceeded())
                    .filter_map(|c| c.severity)
                    .reduce(f32::max);
                hazards.insert(
                    hazard,
                    HazardCounts {
                        exceeded: flags.count(FlagState::Exceeded),
                        indeterminate: flags.count(FlagState::Indeterminate),
                        clear: flags.count(FlagState::Clear),
                        max_severity,
                    },
                );
            }
            Err(e) => {
                failed.insert(hazard, e.to_string());
            }
        }
    }
    let combined_exceeded = combined_mask(pass).iter().filter(|&&m| m).count();
    RiskSummary { time: pass.time, hazards, failed, combined_exceeded }
}

/// Every cell with at least one exceeded hazard, in row-major order.
pub fn risky_points(pass: &ClassificationPass, axes: &SpatialAxes) -> Vec<RiskyPoint> {
    let mut per_cell: BTreeMap<usize, BTreeMap<HazardKind, f32>> = BTreeMap::new();
    for (&hazard, flags) in pass.results.iter().filter_map(|(h, r)| r.as_ref().ok().map(|f| (h, f))) {
        for (i, cell) in flags.cells.iter().enumerate() {
            if let (true, Some(sev)) = (cell.is_exceeded(), cell.severity) {
                per_cell.entry(i).or_default().insert(hazard, sev);
            }
        }
    }
    per_cell
        .into_iter()
        .map(|(i, severities)| RiskyPoint { time: pass.time, location: axes.cell_center(i), severities })
        .collect()
}
