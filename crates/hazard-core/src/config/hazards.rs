//! Hazard rule configuration: `[hazards]` table of the pipeline TOML.
//!
//! Every hazard is independently toggleable and its threshold overridable;
//! hazards without a table keep their defaults.

use std::collections::BTreeMap;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use crate::classify::precip::{PrecipAccumulator, DEFAULT_MAX_RATE_MM_H};
use crate::classify::wbgt::WbgtApproximation;
use crate::classify::HazardKind;
use crate::error::{HazardError, Result};

/// Upper bound on any trailing window (30 days).
pub const MAX_WINDOW_HOURS: f64 = 720.0;

const DEFAULT_LANDSLIDE_WINDOW_HOURS: f64 = 24.0;

/// Optional overrides for one hazard, as written in TOML.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RuleOverride {
    pub enabled: Option<bool>,
    pub threshold: Option<f32>,
    /// Trailing window length; only meaningful for `landslide_proxy`.
    pub window_hours: Option<f64>,
}

/// Fully resolved settings for one hazard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RuleSettings {
    pub enabled: bool,
    pub threshold: f32,
    pub window: Option<Duration>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HazardConfig {
    #[serde(default)]
    pub wbgt: WbgtApproximation,
    /// Differenced precipitation rates above this (mm/h) are read as
    /// accumulation resets.
    #[serde(default = "default_max_rate")]
    pub max_plausible_rate_mm_h: f32,
    #[serde(flatten)]
    pub rules: BTreeMap<HazardKind, RuleOverride>,
}

impl Default for HazardConfig {
    fn default() -> Self {
        Self {
            wbgt: WbgtApproximation::default(),
            max_plausible_rate_mm_h: DEFAULT_MAX_RATE_MM_H,
            rules: BTreeMap::new(),
        }
    }
}

fn default_max_rate() -> f32 {
    DEFAULT_MAX_RATE_MM_H
}

pub fn default_threshold(hazard: HazardKind) -> f32 {
    match hazard {
        HazardKind::HeatStress => 30.0,
        HazardKind::FlashFlood => 30.0,
        HazardKind::LandslideProxy => 50.0,
        HazardKind::HighWind => 15.0,
        HazardKind::ExtremeHeat => 35.0,
        HazardKind::Freezing => 0.0,
    }
}

fn uses_window(hazard: HazardKind) -> bool {
    hazard == HazardKind::LandslideProxy
}

impl HazardConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: HazardConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Enable or disable one hazard.
    pub fn with_enabled(mut self, hazard: HazardKind, enabled: bool) -> Self {
        self.rules.entry(hazard).or_default().enabled = Some(enabled);
        self
    }

    pub fn with_threshold(mut self, hazard: HazardKind, threshold: f32) -> Self {
        self.rules.entry(hazard).or_default().threshold = Some(threshold);
        self
    }

    /// Resolve defaults and overrides for `hazard`.
    pub fn rule(&self, hazard: HazardKind) -> RuleSettings {
        let o = self.rules.get(&hazard);
        let window = uses_window(hazard).then(|| {
            let h = o.and_then(|o| o.window_hours).unwrap_or(DEFAULT_LANDSLIDE_WINDOW_HOURS);
            Duration::seconds((h * 3600.0).round() as i64)
        });
        RuleSettings {
            enabled: o.and_then(|o| o.enabled).unwrap_or(true),
            threshold: o.and_then(|o| o.threshold).unwrap_or_else(|| default_threshold(hazard)),
            window,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = HazardKind> + '_ {
        HazardKind::ALL.into_iter().filter(|&h| self.rule(h).enabled)
    }

    /// Trailing window of the cumulative-precipitation rule.
    pub fn precip_window(&self) -> Duration {
        self.rule(HazardKind::LandslideProxy)
            .window
            .unwrap_or_else(|| Duration::hours(DEFAULT_LANDSLIDE_WINDOW_HOURS as i64))
    }

    /// Empty precipitation state for this configuration.
    pub fn precip_accumulator(&self) -> PrecipAccumulator {
        PrecipAccumulator::new(self.precip_window(), self.max_plausible_rate_mm_h)
    }

    pub fn validate(&self) -> Result<()> {
        let max_rate = self.max_plausible_rate_mm_h;
        if !max_rate.is_finite() || max_rate <= 0.0 {
            return Err(HazardError::config(format!("max_plausible_rate_mm_h must be positive, got {max_rate}")));
        }
        for (&hazard, o) in &self.rules {
            if let Some(t) = o.threshold {
                if !t.is_finite() {
                    return Err(HazardError::config(format!("{hazard}: threshold must be finite, got {t}")));
                }
            }
            if let Some(w) = o.window_hours {
                if !uses_window(hazard) {
                    return Err(HazardError::config(format!("{hazard}: rule has no rolling window")));
                }
                if !w.is_finite() || w <= 0.0 || w > MAX_WINDOW_HOURS {
                    return Err(HazardError::config(format!(
                        "{hazard}: window_hours must be in (0, {MAX_WINDOW_HOURS}], got {w}"
                    )));
                }
            }
        }
        Ok(())
    }
}
