//! Binary classification metrics on the held-out split.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfusionMatrix {
    pub true_pos: usize,
    pub false_pos: usize,
    pub true_neg: usize,
    pub false_neg: usize,
}

impl ConfusionMatrix {
    pub fn from_predictions(labels: &[bool], predicted: &[bool]) -> Self {
        let mut m = Self::default();
        for (&l, &p) in labels.iter().zip(predicted) {
            match (l, p) {
                (true, true) => m.true_pos += 1,
                (false, true) => m.false_pos += 1,
                (false, false) => m.true_neg += 1,
                (true, false) => m.false_neg += 1,
            }
        }
        m
    }

    pub fn total(&self) -> usize {
        self.true_pos + self.false_pos + self.true_neg + self.false_neg
    }
}

impl fmt::Display for ConfusionMatrix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "              pred 0   pred 1")?;
        writeln!(f, "actual 0  {:>9} {:>8}", self.true_neg, self.false_pos)?;
        write!(f, "actual 1  {:>9} {:>8}", self.false_neg, self.true_pos)
    }
}

/// Precision / recall / F1 for one class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassReport {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
}

impl ClassReport {
    fn new(tp: usize, fp: usize, fn_: usize) -> Self {
        let ratio = |a: usize, b: usize| if b == 0 { 0.0 } else { a as f64 / b as f64 };
        let precision = ratio(tp, tp + fp);
        let recall = ratio(tp, tp + fn_);
        let f1 = if precision + recall == 0.0 { 0.0 } else { 2.0 * precision * recall / (precision + recall) };
        Self { precision, recall, f1, support: tp + fn_ }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub positive: ClassReport,
    pub negative: ClassReport,
    pub accuracy: f64,
    pub confusion: ConfusionMatrix,
}

impl EvaluationMetrics {
    pub fn from_confusion(m: ConfusionMatrix) -> Self {
        let accuracy = if m.total() == 0 { 0.0 } else { (m.true_pos + m.true_neg) as f64 / m.total() as f64 };
        Self {
            positive: ClassReport::new(m.true_pos, m.false_pos, m.false_neg),
            negative: ClassReport::new(m.true_neg, m.false_neg, m.false_pos),
            accuracy,
            confusion: m,
        }
    }

    pub fn precision(&self) -> f64 {
        self.positive.precision
    }

    pub fn recall(&self) -> f64 {
        self.positive.recall
    }
}

impl fmt::Display for EvaluationMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "class     precision  recall     f1  support")?;
        for (name, r) in [("0", &self.negative), ("1", &self.positive)] {
            writeln!(f, "{name:<9} {:>9.3} {:>7.3} {:>6.3} {:>8}", r.precision, r.recall, r.f1, r.support)?;
        }
        write!(f, "accuracy  {:>9.3}", self.accuracy)
    }
}
