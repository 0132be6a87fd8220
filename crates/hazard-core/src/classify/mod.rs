//! Hazard classifier: per-cell hazard flags and severities from one
//! temporally reconciled grid snapshot.
//!
//! Each enabled rule in [`rules::RULES`] is evaluated independently. A rule
//! whose input field is absent fails with `MissingField` for that hazard
//! only; the rest of the pass still evaluates. Output grids are new values;
//! the input grid is never touched.

pub mod precip;
pub mod report;
pub mod rules;
pub mod wbgt;

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::config::HazardConfig;
use crate::error::{HazardError, Result};
use crate::grid::{FieldKind, Snapshot, WeatherGrid};
use precip::PrecipDerived;
use rules::{CellInputs, RuleInput, RuleParams, RULES};

// ── Hazard identifiers ────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HazardKind {
    HeatStress,
    FlashFlood,
    LandslideProxy,
    HighWind,
    ExtremeHeat,
    Freezing,
}

impl HazardKind {
    pub const ALL: [HazardKind; 6] = [
        HazardKind::HeatStress,
        HazardKind::FlashFlood,
        HazardKind::LandslideProxy,
        HazardKind::HighWind,
        HazardKind::ExtremeHeat,
        HazardKind::Freezing,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HazardKind::HeatStress => "heat_stress",
            HazardKind::FlashFlood => "flash_flood",
            HazardKind::LandslideProxy => "landslide_proxy",
            HazardKind::HighWind => "high_wind",
            HazardKind::ExtremeHeat => "extreme_heat",
            HazardKind::Freezing => "freezing",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        HazardKind::ALL.into_iter().find(|h| h.name() == name)
    }
}

impl fmt::Display for HazardKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ── Flags ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlagState {
    Clear,
    Exceeded,
    /// An input the rule needs is missing at this cell.
    Indeterminate,
}

/// One cell's verdict for one hazard.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CellFlag {
    pub state: FlagState,
    /// Rule-specific intensity (WBGT °C, mm/h, mm, m/s, ...). `None` when indeterminate.
    pub severity: Option<f32>,
}

impl CellFlag {
    pub const INDETERMINATE: CellFlag = CellFlag { state: FlagState::Indeterminate, severity: None };

    /// Exceeded iff `value > threshold` (strict).
    #[inline]
    pub fn above(value: f32, threshold: f32) -> Self {
        let state = if value > threshold { FlagState::Exceeded } else { FlagState::Clear };
        CellFlag { state, severity: Some(value) }
    }

    #[inline]
    pub fn is_exceeded(&self) -> bool {
        self.state == FlagState::Exceeded
    }
}

/// Per-cell flags for one hazard at one timestep; same spatial shape as the input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardFlagGrid {
    pub hazard: HazardKind,
    pub time: DateTime<Utc>,
    pub width: usize,
    pub height: usize,
    pub cells: Vec<CellFlag>,
}

impl HazardFlagGrid {
    pub fn exceeded_mask(&self) -> Vec<bool> {
        self.cells.iter().map(CellFlag::is_exceeded).collect()
    }

    pub fn count(&self, state: FlagState) -> usize {
        self.cells.iter().filter(|c| c.state == state).count()
    }
}

/// Result of one classification pass: one outcome per enabled hazard.
#[derive(Debug)]
pub struct ClassificationPass {
    pub time: DateTime<Utc>,
    pub results: BTreeMap<HazardKind, Result<HazardFlagGrid>>,
}

impl ClassificationPass {
    pub fn flags(&self, hazard: HazardKind) -> Option<&HazardFlagGrid> {
        self.results.get(&hazard).and_then(|r| r.as_ref().ok())
    }
}

// ── Classification ────────────────────────────────────────────────────────────

/// Classify every enabled hazard at one snapshot.
///
/// `precip` carries the differenced rate and trailing-window total for this
/// timestep; pass `None` when there is no history yet, which leaves the
/// precipitation hazards indeterminate everywhere.
pub fn classify_snapshot(
    snapshot: &Snapshot<'_>,
    precip: Option<&PrecipDerived>,
    config: &HazardConfig,
) -> ClassificationPass {
    let cells = snapshot.cell_count();
    let mut results = BTreeMap::new();

    for rule in RULES {
        let settings = config.rule(rule.hazard);
        if !settings.enabled {
            continue;
        }
        if let Some(input) = rule.inputs.iter().find(|i| snapshot.field(i.source_field()).is_none()) {
            let err = HazardError::MissingField { hazard: rule.hazard, field: input.source_field() };
            log::debug!("{} at {}: {err}", rule.hazard, snapshot.time);
            results.insert(rule.hazard, Err(err));
            continue;
        }

        let params = RuleParams { threshold: settings.threshold, wbgt: config.wbgt };
        let flags = (0..cells)
            .map(|i| (rule.evaluate)(&cell_inputs(snapshot, precip, rule.inputs, i), &params))
            .collect();
        results.insert(
            rule.hazard,
            Ok(HazardFlagGrid {
                hazard: rule.hazard,
                time: snapshot.time,
                width: snapshot.axes.width(),
                height: snapshot.axes.height(),
                cells: flags,
            }),
        );
    }

    ClassificationPass { time: snapshot.time, results }
}

fn cell_inputs(snapshot: &Snapshot<'_>, precip: Option<&PrecipDerived>, needs: &[RuleInput], i: usize) -> CellInputs {
    let mut c = CellInputs::default();
    for input in needs {
        match *input {
            RuleInput::Field(FieldKind::Temperature2m) => c.temperature_k = snapshot.value(FieldKind::Temperature2m, i),
            RuleInput::Field(FieldKind::Dewpoint2m) => c.dewpoint_k = snapshot.value(FieldKind::Dewpoint2m, i),
            RuleInput::Field(FieldKind::WindU10) => c.wind_u = snapshot.value(FieldKind::WindU10, i),
            RuleInput::Field(FieldKind::WindV10) => c.wind_v = snapshot.value(FieldKind::WindV10, i),
            RuleInput::Field(FieldKind::TotalPrecip) => {}
            RuleInput::PrecipRate => c.precip_rate = precip.and_then(|p| p.rate[i]),
            RuleInput::PrecipWindow => {
                c.precip_window = precip.and_then(|p| p.window_total[i]);
                c.precip_window_complete = precip.is_some_and(PrecipDerived::window_complete);
            }
        }
    }
    c
}

/// A classification frame: timestep plus the precipitation state derived for it.
#[derive(Debug, Clone)]
pub struct FrameInput {
    pub time: DateTime<Utc>,
    pub precip: Option<PrecipDerived>,
}

/// Classify a batch of frames from one grid chunk. Frames are independent
/// once their precipitation state has been derived, so with the `threading`
/// feature they run in parallel; output order always matches `frames`.
pub fn classify_frames(
    grid: &WeatherGrid,
    frames: &[FrameInput],
    config: &HazardConfig,
    tolerance: Duration,
) -> Vec<ClassificationPass> {
    let classify = |f: &FrameInput| classify_snapshot(&grid.snapshot(f.time, tolerance), f.precip.as_ref(), config);

    #[cfg(feature = "threading")]
    {
        use rayon::prelude::*;
        frames.par_iter().map(classify).collect()
    }
    #[cfg(not(feature = "threading"))]
    {
        frames.iter().map(classify).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::test_support::*;
    use crate::grid::{FieldSeries, SpatialAxes};
    use precip::PrecipAccumulator;

    fn two_cell_grid() -> WeatherGrid {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 2).unwrap();
        WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::Temperature2m, FieldSeries::new("K", vec![t0()], -9999.0, vec![305.0, 290.0]))
            .unwrap()
            .with_field(FieldKind::Dewpoint2m, FieldSeries::new("K", vec![t0()], -9999.0, vec![298.0, -9999.0]))
            .unwrap()
    }

    #[test]
    fn heat_stress_scenario() {
        let grid = two_cell_grid();
        let pass = classify_snapshot(&grid.snapshot(t0(), Duration::zero()), None, &HazardConfig::default());
        let heat = pass.flags(HazardKind::HeatStress).unwrap();
        assert_eq!(heat.cells[0].state, FlagState::Exceeded);
        assert_eq!(heat.cells[1].state, FlagState::Indeterminate);
        assert_eq!((heat.width, heat.height), (2, 1));
    }

    #[test]
    fn missing_field_isolated_to_its_hazard() {
        let grid = two_cell_grid();
        let pass = classify_snapshot(&grid.snapshot(t0(), Duration::zero()), None, &HazardConfig::default());
        match &pass.results[&HazardKind::HighWind] {
            Err(HazardError::MissingField { field, .. }) => assert_eq!(*field, FieldKind::WindU10),
            other => panic!("expected MissingField, got {other:?}"),
        }
        assert!(matches!(pass.results[&HazardKind::FlashFlood], Err(HazardError::MissingField { .. })));
        assert!(pass.flags(HazardKind::ExtremeHeat).is_some());
        assert!(pass.flags(HazardKind::Freezing).is_some());
    }

    #[test]
    fn disabled_hazards_are_skipped() {
        let grid = two_cell_grid();
        let cfg = HazardConfig::from_toml_str("[heat_stress]\nenabled = false\n").unwrap();
        let pass = classify_snapshot(&grid.snapshot(t0(), Duration::zero()), None, &cfg);
        assert!(!pass.results.contains_key(&HazardKind::HeatStress));
    }

    #[test]
    fn flash_flood_scenario_ten_minute_burst() {
        let axes = SpatialAxes::regular(40.0, 14.0, 0.25, 1, 1).unwrap();
        let times = vec![t0(), t0() + Duration::minutes(10)];
        let grid = WeatherGrid::new(axes)
            .unwrap()
            .with_field(FieldKind::TotalPrecip, FieldSeries::new("mm", times.clone(), -9999.0, vec![0.0, 6.0]))
            .unwrap();

        let mut acc = PrecipAccumulator::new(Duration::hours(24), precip::DEFAULT_MAX_RATE_MM_H);
        let cfg = HazardConfig::default();
        let mut last = None;
        for t in times {
            let snap = grid.snapshot(t, Duration::zero());
            let derived = acc.advance(snap.field(FieldKind::TotalPrecip));
            last = Some(classify_snapshot(&snap, derived.as_ref(), &cfg));
        }
        let pass = last.unwrap();
        let ff = pass.flags(HazardKind::FlashFlood).unwrap();
        assert_eq!(ff.cells[0].state, FlagState::Exceeded);
        assert!((ff.cells[0].severity.unwrap() - 36.0).abs() < 1e-3);
        let landslide = pass.flags(HazardKind::LandslideProxy).unwrap();
        assert_eq!(landslide.cells[0].state, FlagState::Indeterminate, "10 minutes of a 24 h window");
    }

    #[test]
    fn classification_does_not_mutate_input() {
        let grid = two_cell_grid();
        let before = serde_json::to_string(&grid).unwrap();
        let _ = classify_snapshot(&grid.snapshot(t0(), Duration::zero()), None, &HazardConfig::default());
        assert_eq!(before, serde_json::to_string(&grid).unwrap());
    }
}
