//! Random forest of CART trees: bootstrap rows, random feature subsets per
//! split, probability = mean of tree leaf probabilities.
//!
//! Each tree draws from its own seed derived from the forest seed and the
//! tree index, so the fitted forest is identical with or without the
//! `threading` feature.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TreeParams};
use crate::config::TrainingSettings;
use crate::error::{HazardError, Result};

const TREE_SALT: u64 = 0x7472_6565_5F73_6565;
const TREE_MIX: u64 = 0x9E37_79B9_7F4A_7C15;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<DecisionTree>,
    n_features: usize,
}

impl RandomForest {
    pub fn fit(x: &[Vec<f32>], y: &[bool], settings: &TrainingSettings) -> Result<Self> {
        if x.is_empty() || x.len() != y.len() {
            return Err(HazardError::InsufficientData(format!("{} rows, {} labels", x.len(), y.len())));
        }
        let n_features = x[0].len();
        if n_features == 0 || x.iter().any(|r| r.len() != n_features) {
            return Err(HazardError::InsufficientData("rows must share a non-zero width".into()));
        }
        if !y.iter().any(|&l| l) || y.iter().all(|&l| l) {
            return Err(HazardError::InsufficientData("training split must contain both classes".into()));
        }

        let params = TreeParams {
            max_depth: settings.max_depth,
            min_samples_split: settings.min_samples_split,
            min_samples_leaf: settings.min_samples_leaf,
            max_features: settings.max_features.resolve(n_features),
        };
        let fit_tree = |t: usize| {
            let mut rng = StdRng::seed_from_u64(settings.seed ^ TREE_SALT ^ (t as u64).wrapping_mul(TREE_MIX));
            let rows = if settings.bootstrap {
                (0..x.len()).map(|_| rng.gen_range(0..x.len())).collect()
            } else {
                (0..x.len()).collect()
            };
            DecisionTree::fit(x, y, rows, params, &mut rng)
        };

        #[cfg(feature = "threading")]
        let trees: Vec<DecisionTree> = {
            use rayon::prelude::*;
            (0..settings.n_trees).into_par_iter().map(fit_tree).collect()
        };
        #[cfg(not(feature = "threading"))]
        let trees: Vec<DecisionTree> = (0..settings.n_trees).map(fit_tree).collect();

        Ok(Self { trees, n_features })
    }

    /// Mean positive-class probability over all trees.
    pub fn predict_proba(&self, row: &[f32]) -> f32 {
        let sum: f32 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        sum / self.trees.len().max(1) as f32
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn is_well_formed(&self) -> bool {
        !self.trees.is_empty() && self.trees.iter().all(|t| t.n_features() == self.n_features && t.is_well_formed())
    }

    /// Mean of per-tree normalised impurity decrease, renormalised to sum to 1.
    /// All zeros if no tree ever split.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut total = vec![0.0; self.n_features];
        for tree in &self.trees {
            let sum: f64 = tree.importance().iter().sum();
            if sum > 0.0 {
                for (acc, v) in total.iter_mut().zip(tree.importance()) {
                    *acc += v / sum;
                }
            }
        }
        let sum: f64 = total.iter().sum();
        if sum > 0.0 {
            total.iter_mut().for_each(|v| *v /= sum);
        }
        total
    }
}
