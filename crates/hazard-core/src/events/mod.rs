//! Historical event extraction.
//!
//! Flagged cells at each timestep are grouped into connected components;
//! components are chained across consecutive timesteps by spatial overlap
//! into tracks ([`tracker::EventTracker`]); a track that finds no
//! continuation is closed into one [`HistoricalEvent`]. Closed events go to
//! the append-only [`ledger::EventLedger`], keyed by [`EventKey`].

pub mod components;
pub mod ledger;
pub mod tracker;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::precip::PrecipDerived;
use crate::classify::{HazardFlagGrid, HazardKind};
use crate::coords::{GeoBounds, LatLon};
use crate::error::Result;
use crate::grid::{FieldKind, SpatialAxes, Snapshot};

pub use components::{connected_components, Component, Connectivity};
pub use ledger::{AppendSummary, EventLedger};
pub use tracker::EventTracker;

/// Raw input values at an event's peak cell and time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawValues {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_k: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dewpoint_k: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_u: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wind_v: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip_accum_mm: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip_rate_mm_h: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precip_window_mm: Option<f32>,
}

/// One spatiotemporally contiguous exceedance region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoricalEvent {
    pub hazard: HazardKind,
    /// First timestep with a flagged component.
    pub start: DateTime<Utc>,
    /// Last timestep with a flagged component.
    pub end: DateTime<Utc>,
    /// Representative timestamp: timestep of peak severity.
    pub peak_time: DateTime<Utc>,
    /// Severity-weighted centroid over every flagged cell-step.
    pub centroid: LatLon,
    pub peak_location: LatLon,
    pub peak_severity: f32,
    /// Bounding box of cell centres touched at any timestep.
    pub bounds: GeoBounds,
    /// Distinct grid cells touched.
    pub cell_count: usize,
    /// Flagged (cell, timestep) pairs.
    pub cell_steps: usize,
    pub duration_steps: usize,
    pub raw: RawValues,
}

/// Ledger deduplication key: hazard, bounding box (to 1e-4°), start time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EventKey {
    pub hazard: HazardKind,
    pub start: DateTime<Utc>,
    pub bounds_e4: [i64; 4],
}

#[inline]
fn quantise(deg: f64) -> i64 {
    (deg * 1e4).round() as i64
}

impl HistoricalEvent {
    pub fn key(&self) -> EventKey {
        let b = &self.bounds;
        EventKey {
            hazard: self.hazard,
            start: self.start,
            bounds_e4: [quantise(b.min_lat), quantise(b.max_lat), quantise(b.min_lon), quantise(b.max_lon)],
        }
    }

    /// True if both events cover a common instant and their boxes intersect.
    pub fn overlaps(&self, other: &HistoricalEvent) -> bool {
        self.hazard == other.hazard
            && self.start <= other.end
            && other.start <= self.end
            && self.bounds.intersects(&other.bounds)
    }
}

// ── Raw value lookup ──────────────────────────────────────────────────────────

/// Supplies raw inputs for a cell at the timestep being tracked.
pub trait RawSource {
    fn raw_values(&self, cell: usize) -> RawValues;
}

/// Reads raw values from a snapshot and its derived precipitation.
pub struct CellSampler<'a> {
    pub snapshot: &'a Snapshot<'a>,
    pub precip: Option<&'a PrecipDerived>,
}

impl RawSource for CellSampler<'_> {
    fn raw_values(&self, cell: usize) -> RawValues {
        let s = self.snapshot;
        RawValues {
            temperature_k: s.value(FieldKind::Temperature2m, cell),
            dewpoint_k: s.value(FieldKind::Dewpoint2m, cell),
            wind_u: s.value(FieldKind::WindU10, cell),
            wind_v: s.value(FieldKind::WindV10, cell),
            precip_accum_mm: s.value(FieldKind::TotalPrecip, cell),
            precip_rate_mm_h: self.precip.and_then(|p| p.rate.get(cell).copied().flatten()),
            precip_window_mm: self.precip.and_then(|p| p.window_total.get(cell).copied().flatten()),
        }
    }
}

/// No raw values available.
pub struct NoRaw;

impl RawSource for NoRaw {
    fn raw_values(&self, _cell: usize) -> RawValues {
        RawValues::default()
    }
}

// ── Batch extraction ──────────────────────────────────────────────────────────

/// One step of a flag sequence: either a classified grid or a recorded gap.
#[derive(Debug, Clone, Copy)]
pub enum FlagFrame<'a> {
    Flags(&'a HazardFlagGrid),
    Gap,
}

/// Extract events from a complete in-memory flag sequence for one hazard.
/// Output is sorted by key and free of duplicate keys.
pub fn extract_events(
    frames: &[FlagFrame<'_>],
    hazard: HazardKind,
    axes: &SpatialAxes,
    connectivity: Connectivity,
) -> Result<Vec<HistoricalEvent>> {
    let mut tracker = EventTracker::new(hazard, axes.clone(), connectivity);
    let mut out = BTreeMap::new();
    for frame in frames {
        let closed = match frame {
            FlagFrame::Flags(flags) => tracker.step(flags, &NoRaw)?,
            FlagFrame::Gap => tracker.record_gap(),
        };
        for e in closed {
            out.entry(e.key()).or_insert(e);
        }
    }
    for e in tracker.finish() {
        out.entry(e.key()).or_insert(e);
    }
    Ok(out.into_values().collect())
}
