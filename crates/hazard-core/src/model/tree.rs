//! Binary CART classification tree (Gini impurity).
//!
//! Array-based node layout: `feature == -2` marks a leaf, children are node
//! indices, and `x[feature] <= threshold` goes left. Leaves store the
//! fraction of positive training samples that reached them.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

pub const LEAF: i32 = -2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    pub feature: i32,
    pub threshold: f32,
    pub left_child: i32,
    pub right_child: i32,
    /// P(positive) among the training samples at this node.
    pub value: f32,
    pub samples: usize,
}

impl TreeNode {
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.feature < 0
    }
}

/// Growth limits for one tree.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Features tried per split (already resolved, ≥ 1).
    pub max_features: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecisionTree {
    nodes: Vec<TreeNode>,
    n_features: usize,
    /// Impurity decrease per feature, weighted by node size. Not normalised.
    importance: Vec<f64>,
}

struct Builder<'a> {
    x: &'a [Vec<f32>],
    y: &'a [bool],
    params: TreeParams,
    nodes: Vec<TreeNode>,
    importance: Vec<f64>,
}

struct BestSplit {
    feature: usize,
    threshold: f32,
    gain: f64,
}

#[inline]
fn gini(pos: usize, n: usize) -> f64 {
    if n == 0 {
        return 0.0;
    }
    let p = pos as f64 / n as f64;
    2.0 * p * (1.0 - p)
}

impl DecisionTree {
    /// Grow a tree on the rows of `x` listed in `sample` (repeats allowed,
    /// as produced by bootstrapping).
    pub fn fit(x: &[Vec<f32>], y: &[bool], sample: Vec<usize>, params: TreeParams, rng: &mut StdRng) -> Self {
        let n_features = x.first().map_or(0, Vec::len);
        let mut b = Builder { x, y, params, nodes: Vec::new(), importance: vec![0.0; n_features] };
        b.grow(sample, 0, n_features, rng);
        Self { nodes: b.nodes, n_features, importance: b.importance }
    }

    pub fn predict_proba(&self, row: &[f32]) -> f32 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if node.is_leaf() {
                return node.value;
            }
            idx = if row[node.feature as usize] <= node.threshold {
                node.left_child as usize
            } else {
                node.right_child as usize
            };
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub fn importance(&self) -> &[f64] {
        &self.importance
    }

    pub fn depth(&self) -> usize {
        self.node_depth(0)
    }

    fn node_depth(&self, idx: usize) -> usize {
        let node = &self.nodes[idx];
        if node.is_leaf() {
            return 0;
        }
        1 + self.node_depth(node.left_child as usize).max(self.node_depth(node.right_child as usize))
    }

    /// Structural checks used when loading a persisted tree.
    pub fn is_well_formed(&self) -> bool {
        let n = self.nodes.len() as i32;
        !self.nodes.is_empty()
            && self.nodes.iter().all(|node| {
                node.is_leaf()
                    || ((node.feature as usize) < self.n_features
                        && (1..n).contains(&node.left_child)
                        && (1..n).contains(&node.right_child))
            })
    }
}

impl Builder<'_> {
    /// Appends the subtree for `idx` and returns its root index.
    fn grow(&mut self, idx: Vec<usize>, depth: usize, n_features: usize, rng: &mut StdRng) -> usize {
        let n = idx.len();
        let pos = idx.iter().filter(|&&i| self.y[i]).count();
        let node_id = self.nodes.len();
        self.nodes.push(TreeNode {
            feature: LEAF,
            threshold: 0.0,
            left_child: -1,
            right_child: -1,
            value: if n == 0 { 0.0 } else { pos as f32 / n as f32 },
            samples: n,
        });

        if depth >= self.params.max_depth || n < self.params.min_samples_split || pos == 0 || pos == n {
            return node_id;
        }
        let Some(best) = self.best_split(&idx, pos, n_features, rng) else {
            return node_id;
        };

        self.importance[best.feature] += n as f64 * best.gain;
        let (left, right): (Vec<usize>, Vec<usize>) =
            idx.into_iter().partition(|&i| self.x[i][best.feature] <= best.threshold);
        let l = self.grow(left, depth + 1, n_features, rng);
        let r = self.grow(right, depth + 1, n_features, rng);
        let node = &mut self.nodes[node_id];
        node.feature = best.feature as i32;
        node.threshold = best.threshold;
        node.left_child = l as i32;
        node.right_child = r as i32;
        node_id
    }

    fn best_split(&self, idx: &[usize], pos: usize, n_features: usize, rng: &mut StdRng) -> Option<BestSplit> {
        let n = idx.len();
        let parent = gini(pos, n);
        let min_leaf = self.params.min_samples_leaf;

        let mut features: Vec<usize> = (0..n_features).collect();
        features.shuffle(rng);
        features.truncate(self.params.max_features.clamp(1, n_features.max(1)));

        let mut best: Option<BestSplit> = None;
        let mut order: Vec<usize> = idx.to_vec();
        for f in features {
            order.sort_by(|&a, &b| self.x[a][f].total_cmp(&self.x[b][f]));
            let mut left_pos = 0usize;
            for k in 0..n - 1 {
                if self.y[order[k]] {
                    left_pos += 1;
                }
                let nl = k + 1;
                let nr = n - nl;
                if nl < min_leaf || nr < min_leaf {
                    continue;
                }
                let a = self.x[order[k]][f];
                let b = self.x[order[k + 1]][f];
                if a >= b {
                    continue;
                }
                let weighted = (nl as f64 * gini(left_pos, nl) + nr as f64 * gini(pos - left_pos, nr)) / n as f64;
                let gain = parent - weighted;
                if gain > 1e-12 && best.as_ref().map_or(true, |bs| gain > bs.gain) {
                    let mut threshold = a + (b - a) / 2.0;
                    if threshold >= b {
                        threshold = a;
                    }
                    best = Some(BestSplit { feature: f, threshold, gain });
                }
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn params() -> TreeParams {
        TreeParams { max_depth: 10, min_samples_split: 2, min_samples_leaf: 1, max_features: 2 }
    }

    #[test]
    fn separable_data_is_learned_exactly() {
        // Label = x0 > 5; x1 is noise.
        let x: Vec<Vec<f32>> = (0..40).map(|i| vec![(i % 10) as f32, ((i * 7) % 13) as f32]).collect();
        let y: Vec<bool> = x.iter().map(|r| r[0] > 5.0).collect();
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &y, (0..40).collect(), params(), &mut rng);
        for (r, &label) in x.iter().zip(&y) {
            assert_eq!(tree.predict_proba(r) >= 0.5, label);
        }
        assert!(tree.importance()[0] > tree.importance()[1]);
        assert!(tree.is_well_formed());
    }

    #[test]
    fn threshold_boundary_goes_left() {
        let x = vec![vec![1.0], vec![2.0]];
        let y = vec![false, true];
        let mut rng = StdRng::seed_from_u64(1);
        let tree = DecisionTree::fit(&x, &y, vec![0, 1], params(), &mut rng);
        assert_eq!(tree.predict_proba(&[1.5]), 0.0);
        assert_eq!(tree.predict_proba(&[1.6]), 1.0);
    }

    #[test]
    fn depth_limit_is_respected() {
        let x: Vec<Vec<f32>> = (0..64).map(|i| vec![i as f32]).collect();
        let y: Vec<bool> = (0..64).map(|i| i % 2 == 0).collect();
        let mut rng = StdRng::seed_from_u64(3);
        let p = TreeParams { max_depth: 3, ..params() };
        let tree = DecisionTree::fit(&x, &y, (0..64).collect(), p, &mut rng);
        assert!(tree.depth() <= 3);
    }

    #[test]
    fn pure_node_is_a_single_leaf() {
        let x = vec![vec![1.0], vec![2.0], vec![3.0]];
        let y = vec![true; 3];
        let mut rng = StdRng::seed_from_u64(0);
        let tree = DecisionTree::fit(&x, &y, vec![0, 1, 2], params(), &mut rng);
        assert_eq!(tree.n_nodes(), 1);
        assert_eq!(tree.predict_proba(&[10.0]), 1.0);
    }
}
