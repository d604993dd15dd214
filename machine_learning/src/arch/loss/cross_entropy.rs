use ndarray::{Array2, ArrayView2, Axis};

use super::LossFn;

const EPSILON: f32 = 1e-7;

/// Softmax cross entropy over raw logits against one-hot (or soft) targets.
#[derive(Debug, Default, Clone, Copy)]
pub struct CrossEntropy;

impl CrossEntropy {
    /// Returns a new `CrossEntropy`.
    pub fn new() -> Self {
        Self
    }

    /// Row-wise numerically stable softmax.
    pub fn softmax(logits: ArrayView2<f32>) -> Array2<f32> {
        let mut probs = logits.to_owned();

        for mut row in probs.axis_iter_mut(Axis(0)) {
            let max = row.fold(f32::NEG_INFINITY, |m, &v| m.max(v));
            row.mapv_inplace(|v| (v - max).exp());
            let sum = row.sum();
            row.mapv_inplace(|v| v / sum);
        }

        probs
    }
}

impl LossFn for CrossEntropy {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        let nrows = y_pred.nrows().max(1) as f32;
        let probs = Self::softmax(y_pred);

        let total: f32 = probs
            .iter()
            .zip(y.iter())
            .map(|(&p, &t)| -t * (p + EPSILON).ln())
            .sum();

        total / nrows
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let nrows = y_pred.nrows().max(1) as f32;

        (Self::softmax(y_pred) - &y) / nrows
    }
}
