//! Pipeline and hazard configuration.

pub mod hazards;
pub mod pipeline;

pub use hazards::{HazardConfig, RuleOverride, RuleSettings};
pub use pipeline::{
    DatasetSettings, ExtractionSettings, MaxFeatures, MaxFeaturesRule, MiningSettings, PipelineConfig, SplitUnit,
    TrainingSettings,
};
