//! Hazard rule table.
//!
//! Each rule is a pure function over one cell's inputs. Which rules run, and
//! with which thresholds, is decided by the configuration, not by branching
//! on hazard names.

use super::wbgt::WbgtApproximation;
use super::{CellFlag, HazardKind};
use crate::grid::FieldKind;

const KELVIN_OFFSET: f32 = 273.15;

/// An input a rule reads for every cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuleInput {
    Field(FieldKind),
    /// Differenced precipitation rate (needs `tp` plus trailing history).
    PrecipRate,
    /// Trailing-window precipitation total (needs `tp` plus trailing history).
    PrecipWindow,
}

impl RuleInput {
    /// Grid field the input is ultimately derived from.
    pub fn source_field(self) -> FieldKind {
        match self {
            RuleInput::Field(k) => k,
            RuleInput::PrecipRate | RuleInput::PrecipWindow => FieldKind::TotalPrecip,
        }
    }
}

/// Everything a rule may read for one cell. `None` marks a missing value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CellInputs {
    pub temperature_k: Option<f32>,
    pub dewpoint_k: Option<f32>,
    pub wind_u: Option<f32>,
    pub wind_v: Option<f32>,
    pub precip_rate: Option<f32>,
    pub precip_window: Option<f32>,
    /// History spans the whole trailing window behind `precip_window`.
    pub precip_window_complete: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleParams {
    pub threshold: f32,
    pub wbgt: WbgtApproximation,
}

pub type RuleFn = fn(&CellInputs, &RuleParams) -> CellFlag;

pub struct RuleDescriptor {
    pub hazard: HazardKind,
    pub inputs: &'static [RuleInput],
    pub evaluate: RuleFn,
}

pub const RULES: &[RuleDescriptor] = &[
    RuleDescriptor {
        hazard: HazardKind::HeatStress,
        inputs: &[RuleInput::Field(FieldKind::Temperature2m), RuleInput::Field(FieldKind::Dewpoint2m)],
        evaluate: heat_stress,
    },
    RuleDescriptor {
        hazard: HazardKind::FlashFlood,
        inputs: &[RuleInput::PrecipRate],
        evaluate: flash_flood,
    },
    RuleDescriptor {
        hazard: HazardKind::LandslideProxy,
        inputs: &[RuleInput::PrecipWindow],
        evaluate: landslide_proxy,
    },
    RuleDescriptor {
        hazard: HazardKind::HighWind,
        inputs: &[RuleInput::Field(FieldKind::WindU10), RuleInput::Field(FieldKind::WindV10)],
        evaluate: high_wind,
    },
    RuleDescriptor {
        hazard: HazardKind::ExtremeHeat,
        inputs: &[RuleInput::Field(FieldKind::Temperature2m)],
        evaluate: extreme_heat,
    },
    RuleDescriptor {
        hazard: HazardKind::Freezing,
        inputs: &[RuleInput::Field(FieldKind::Temperature2m)],
        evaluate: freezing,
    },
];

pub fn descriptor(hazard: HazardKind) -> &'static RuleDescriptor {
    RULES
        .iter()
        .find(|r| r.hazard == hazard)
        .unwrap_or_else(|| unreachable!("every HazardKind has a rule descriptor"))
}

// ── Rules ─────────────────────────────────────────────────────────────────────

/// Severity = WBGT (°C).
fn heat_stress(c: &CellInputs, p: &RuleParams) -> CellFlag {
    match (c.temperature_k, c.dewpoint_k) {
        (Some(t), Some(td)) => CellFlag::above(p.wbgt.wbgt_c(t, td), p.threshold),
        _ => CellFlag::INDETERMINATE,
    }
}

/// Severity = precipitation rate (mm/h).
fn flash_flood(c: &CellInputs, p: &RuleParams) -> CellFlag {
    c.precip_rate.map_or(CellFlag::INDETERMINATE, |r| CellFlag::above(r, p.threshold))
}

/// Severity = trailing-window precipitation (mm). A total over a partial
/// window only counts once it already exceeds the threshold.
fn landslide_proxy(c: &CellInputs, p: &RuleParams) -> CellFlag {
    c.precip_window.map_or(CellFlag::INDETERMINATE, |w| {
        let flag = CellFlag::above(w, p.threshold);
        if flag.is_exceeded() || c.precip_window_complete {
            flag
        } else {
            CellFlag::INDETERMINATE
        }
    })
}

/// Severity = 10 m wind speed (m/s).
fn high_wind(c: &CellInputs, p: &RuleParams) -> CellFlag {
    match (c.wind_u, c.wind_v) {
        (Some(u), Some(v)) => CellFlag::above(wind_speed(u, v), p.threshold),
        _ => CellFlag::INDETERMINATE,
    }
}

/// Severity = 2 m temperature (°C).
fn extreme_heat(c: &CellInputs, p: &RuleParams) -> CellFlag {
    c.temperature_k
        .map_or(CellFlag::INDETERMINATE, |t| CellFlag::above(t - KELVIN_OFFSET, p.threshold))
}

/// Severity = frost depth, −T (°C); flagged where T < threshold.
fn freezing(c: &CellInputs, p: &RuleParams) -> CellFlag {
    c.temperature_k
        .map_or(CellFlag::INDETERMINATE, |t| CellFlag::above(-(t - KELVIN_OFFSET), -p.threshold))
}

#[inline]
pub fn wind_speed(u: f32, v: f32) -> f32 {
    (u * u + v * v).sqrt()
}
