//! Persisted, versioned model artifact and schema-checked inference.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::forest::RandomForest;
use super::metrics::EvaluationMetrics;
use crate::classify::HazardKind;
use crate::dataset::{Feature, FeatureSchema};
use crate::error::{HazardError, Result};

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format_version: u32,
    /// `<hazard>-<fingerprint prefix>-s<seed>`.
    pub model_version: String,
    pub hazard: HazardKind,
    pub feature_schema: FeatureSchema,
    /// SHA-256 of the dataset the model was fitted on.
    pub training_fingerprint: String,
    pub seed: u64,
    pub decision_threshold: f64,
    pub trained_at: DateTime<Utc>,
    pub metrics: EvaluationMetrics,
    pub feature_importance: BTreeMap<String, f64>,
    pub forest: RandomForest,
}

/// Named feature values for one inference call.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    pub names: Vec<String>,
    pub values: Vec<f32>,
}

impl FeatureVector {
    pub fn new(names: Vec<String>, values: Vec<f32>) -> Self {
        Self { names, values }
    }

    pub fn from_pairs<S: Into<String>>(pairs: impl IntoIterator<Item = (S, f32)>) -> Self {
        let (names, values) = pairs.into_iter().map(|(n, v)| (n.into(), v)).unzip();
        Self { names, values }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub probability: f32,
    pub occurred: bool,
}

impl ModelArtifact {
    pub fn save(&self, path: &Path) -> Result<()> {
        fs::write(path, serde_json::to_vec_pretty(self)?)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let artifact: ModelArtifact = serde_json::from_slice(&fs::read(path)?)?;
        if artifact.format_version != FORMAT_VERSION {
            return Err(HazardError::Artifact(format!(
                "format version {} is not supported (expected {FORMAT_VERSION})",
                artifact.format_version
            )));
        }
        if !artifact.forest.is_well_formed() {
            return Err(HazardError::Artifact("forest is empty or structurally invalid".into()));
        }
        if artifact.forest.n_features() != artifact.feature_schema.len() {
            return Err(HazardError::Artifact(format!(
                "forest expects {} features, schema lists {}",
                artifact.forest.n_features(),
                artifact.feature_schema.len()
            )));
        }
        Ok(artifact)
    }

    /// Predict one point. The vector must carry exactly the model's features,
    /// in schema order, all finite; anything else is a `SchemaMismatch`.
    pub fn predict(&self, input: &FeatureVector) -> Result<Prediction> {
        let expected = self.feature_schema.names();
        let mismatch = || HazardError::SchemaMismatch { expected: expected.clone(), found: input.names.clone() };

        let resolved: Option<Vec<Feature>> = input.names.iter().map(|n| Feature::parse(n)).collect();
        match resolved {
            Some(r) if r == self.feature_schema.features() => {}
            _ => return Err(mismatch()),
        }
        if input.values.len() != input.names.len() || input.values.iter().any(|v| !v.is_finite()) {
            return Err(mismatch());
        }

        let probability = self.forest.predict_proba(&input.values);
        Ok(Prediction { probability, occurred: probability as f64 >= self.decision_threshold })
    }
}
