//! Error taxonomy shared by every stage of the hazard pipeline.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::classify::HazardKind;
use crate::grid::FieldKind;

/// Result type for hazard-core operations.
pub type Result<T> = std::result::Result<T, HazardError>;

#[derive(Error, Debug)]
pub enum HazardError {
    /// A rule needs a field the supplied grid set does not carry.
    /// Fatal for that hazard only; other hazards in the pass still evaluate.
    #[error("{hazard} rule requires field `{field}`, which is absent from the grid set")]
    MissingField { hazard: HazardKind, field: FieldKind },

    /// A timestep (or whole chunk) within a mining window is missing or corrupt.
    #[error("grid gap {start} .. {end}: {reason}")]
    GridGap {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        reason: String,
    },

    /// Inference-time feature set does not match the model's recorded schema.
    #[error("feature schema mismatch: model expects [{}], got [{}]", expected.join(", "), found.join(", "))]
    SchemaMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// Invalid threshold / window / pipeline setting. Raised before any grid is read.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// Grid construction violated an axis or shape invariant.
    #[error("invalid grid: {0}")]
    InvalidGrid(String),

    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    /// Model artifact could not be interpreted (format version, empty forest, ...).
    #[error("model artifact: {0}")]
    Artifact(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl HazardError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        HazardError::Configuration(msg.into())
    }

    pub(crate) fn grid(msg: impl Into<String>) -> Self {
        HazardError::InvalidGrid(msg.into())
    }
}
