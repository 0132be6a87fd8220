//! Full pipeline configuration, loaded from one TOML file.
//!
//! ```toml
//! [hazards]
//! wbgt = "bom"
//! [hazards.high_wind]
//! threshold = 15.0
//!
//! [extraction]
//! connectivity = "eight"
//!
//! [mining]
//! chunk_hours = 72
//!
//! [dataset]
//! negative_ratio = 1.0
//! features = ["2t", "2d", "10u", "10v", "tp", "latitude", "longitude"]
//!
//! [training]
//! n_trees = 50
//! max_depth = 10
//! ```
//!
//! Every section is optional. [`PipelineConfig::validate`] runs before any
//! grid is read.

use std::fs;
use std::path::Path;

use chrono::Duration;
use serde::{Deserialize, Serialize};

use super::HazardConfig;
use crate::dataset::FeatureSchema;
use crate::error::{HazardError, Result};
use crate::events::Connectivity;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PipelineConfig {
    #[serde(default)]
    pub hazards: HazardConfig,
    #[serde(default)]
    pub extraction: ExtractionSettings,
    #[serde(default)]
    pub mining: MiningSettings,
    #[serde(default)]
    pub dataset: DatasetSettings,
    #[serde(default)]
    pub training: TrainingSettings,
}

// ── Sections ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExtractionSettings {
    pub connectivity: Connectivity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MiningSettings {
    /// Nominal spacing between timesteps. A larger jump (beyond tolerance)
    /// is recorded as a gap.
    pub expected_step_minutes: i64,
    /// Maximum offset for nearest-timestamp reconciliation across fields.
    pub time_tolerance_minutes: i64,
    /// Length of one in-memory chunk when splitting a grid.
    pub chunk_hours: i64,
    /// How long a hazard whose input field has no reading at a timestep
    /// keeps its open events, while the chunk still carries that field.
    /// Covers fields archived on a coarser cadence than the timeline.
    pub field_hold_minutes: i64,
}

impl Default for MiningSettings {
    fn default() -> Self {
        Self { expected_step_minutes: 60, time_tolerance_minutes: 30, chunk_hours: 72, field_hold_minutes: 180 }
    }
}

impl MiningSettings {
    pub fn cadence(&self) -> Duration {
        Duration::minutes(self.expected_step_minutes)
    }

    pub fn tolerance(&self) -> Duration {
        Duration::minutes(self.time_tolerance_minutes)
    }

    pub fn chunk(&self) -> Duration {
        Duration::hours(self.chunk_hours)
    }

    pub fn field_hold(&self) -> Duration {
        Duration::minutes(self.field_hold_minutes)
    }
}

/// How timestamps are grouped before the chronological split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitUnit {
    /// Whole UTC days go to one side, so same-day autocorrelation cannot leak.
    #[default]
    Day,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DatasetSettings {
    /// Negatives drawn per positive.
    pub negative_ratio: f64,
    /// Cells around an event's bounding box excluded from negative sampling.
    pub spatial_buffer_cells: usize,
    /// Timesteps before and after an event excluded from negative sampling.
    pub temporal_buffer_steps: usize,
    /// Fraction of time groups (latest first) held out for evaluation.
    pub eval_fraction: f64,
    pub split_unit: SplitUnit,
    /// When set, samples are also split by lat/lon blocks of this size and
    /// only those whose block agrees with their time group are kept.
    pub spatial_block_deg: Option<f64>,
    pub seed: u64,
    /// Ordered feature schema.
    pub features: Vec<String>,
}

impl Default for DatasetSettings {
    fn default() -> Self {
        Self {
            negative_ratio: 1.0,
            spatial_buffer_cells: 1,
            temporal_buffer_steps: 1,
            eval_fraction: 0.2,
            split_unit: SplitUnit::Day,
            spatial_block_deg: None,
            seed: 42,
            features: ["2t", "2d", "10u", "10v", "tp", "latitude", "longitude"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl DatasetSettings {
    pub fn schema(&self) -> Result<FeatureSchema> {
        FeatureSchema::parse(&self.features)
    }
}

/// Number of features tried at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MaxFeatures {
    Count(usize),
    Named(MaxFeaturesRule),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeaturesRule {
    Sqrt,
    All,
}

impl Default for MaxFeatures {
    fn default() -> Self {
        MaxFeatures::Named(MaxFeaturesRule::Sqrt)
    }
}

impl MaxFeatures {
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            MaxFeatures::Count(k) => k,
            MaxFeatures::Named(MaxFeaturesRule::Sqrt) => (n_features as f64).sqrt().round() as usize,
            MaxFeatures::Named(MaxFeaturesRule::All) => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TrainingSettings {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub seed: u64,
    /// Probability at or above which a sample is predicted positive.
    pub decision_threshold: f64,
}

impl Default for TrainingSettings {
    fn default() -> Self {
        Self {
            n_trees: 50,
            max_depth: 10,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::default(),
            bootstrap: true,
            seed: 42,
            decision_threshold: 0.5,
        }
    }
}

// ── Loading and validation ────────────────────────────────────────────────────

impl PipelineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let cfg: PipelineConfig = toml::from_str(text)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        self.hazards.validate()?;

        let m = &self.mining;
        if m.expected_step_minutes <= 0 {
            return Err(HazardError::config("mining.expected_step_minutes must be positive"));
        }
        if m.time_tolerance_minutes < 0 || m.time_tolerance_minutes >= m.expected_step_minutes {
            return Err(HazardError::config(
                "mining.time_tolerance_minutes must be non-negative and below the step length",
            ));
        }
        if m.chunk_hours <= 0 {
            return Err(HazardError::config("mining.chunk_hours must be positive"));
        }
        if m.field_hold_minutes < 0 {
            return Err(HazardError::config("mining.field_hold_minutes must be non-negative"));
        }

        let d = &self.dataset;
        if !d.negative_ratio.is_finite() || d.negative_ratio < 0.0 {
            return Err(HazardError::config("dataset.negative_ratio must be finite and non-negative"));
        }
        if !(d.eval_fraction > 0.0 && d.eval_fraction < 1.0) {
            return Err(HazardError::config("dataset.eval_fraction must be in (0, 1)"));
        }
        if let Some(deg) = d.spatial_block_deg {
            if !deg.is_finite() || deg <= 0.0 {
                return Err(HazardError::config("dataset.spatial_block_deg must be positive"));
            }
        }
        d.schema()?;

        let t = &self.training;
        if t.n_trees == 0 || t.max_depth == 0 {
            return Err(HazardError::config("training.n_trees and training.max_depth must be positive"));
        }
        if t.min_samples_split < 2 || t.min_samples_leaf == 0 {
            return Err(HazardError::config("training.min_samples_split must be ≥ 2 and min_samples_leaf ≥ 1"));
        }
        if t.max_features == MaxFeatures::Count(0) {
            return Err(HazardError::config("training.max_features must be positive"));
        }
        if !(t.decision_threshold > 0.0 && t.decision_threshold < 1.0) {
            return Err(HazardError::config("training.decision_threshold must be in (0, 1)"));
        }
        Ok(())
    }
}
