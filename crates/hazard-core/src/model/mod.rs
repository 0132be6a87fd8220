//! Hazard occurrence classifier: training, evaluation and artifacts.

pub mod artifact;
pub mod forest;
pub mod metrics;
pub mod tree;

use chrono::Utc;

use crate::config::TrainingSettings;
use crate::dataset::PartitionedDataset;
use crate::error::{HazardError, Result};
pub use artifact::{FeatureVector, ModelArtifact, Prediction, FORMAT_VERSION};
pub use forest::RandomForest;
pub use metrics::{ClassReport, ConfusionMatrix, EvaluationMetrics};

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub artifact: ModelArtifact,
    pub metrics: EvaluationMetrics,
}

/// Fit on `dataset.train`, evaluate on `dataset.eval`. Deterministic for a
/// given dataset and settings (only `trained_at` differs between runs).
pub fn train_model(dataset: &PartitionedDataset, settings: &TrainingSettings) -> Result<TrainedModel> {
    if dataset.eval.is_empty() {
        return Err(HazardError::InsufficientData("evaluation split is empty".into()));
    }
    let x: Vec<Vec<f32>> = dataset.train.iter().map(|s| s.features.clone()).collect();
    let y: Vec<bool> = dataset.train.iter().map(|s| s.label).collect();
    let forest = RandomForest::fit(&x, &y, settings)?;
    if forest.n_features() != dataset.schema.len() {
        return Err(HazardError::InsufficientData(format!(
            "samples have {} features, schema lists {}",
            forest.n_features(),
            dataset.schema.len()
        )));
    }

    let labels: Vec<bool> = dataset.eval.iter().map(|s| s.label).collect();
    let predicted: Vec<bool> = dataset
        .eval
        .iter()
        .map(|s| forest.predict_proba(&s.features) as f64 >= settings.decision_threshold)
        .collect();
    let metrics = EvaluationMetrics::from_confusion(ConfusionMatrix::from_predictions(&labels, &predicted));

    let feature_importance = dataset.schema.names().into_iter().zip(forest.feature_importances()).collect();
    let fingerprint = dataset.fingerprint();
    let artifact = ModelArtifact {
        format_version: FORMAT_VERSION,
        model_version: format!("{}-{}-s{}", dataset.hazard, &fingerprint[..12], settings.seed),
        hazard: dataset.hazard,
        feature_schema: dataset.schema.clone(),
        training_fingerprint: fingerprint,
        seed: settings.seed,
        decision_threshold: settings.decision_threshold,
        trained_at: Utc::now(),
        metrics,
        feature_importance,
        forest,
    };
    log::info!(
        "trained {}: precision {:.3}, recall {:.3} on {} held-out samples",
        artifact.model_version,
        metrics.precision(),
        metrics.recall(),
        labels.len()
    );
    Ok(TrainedModel { artifact, metrics })
}
