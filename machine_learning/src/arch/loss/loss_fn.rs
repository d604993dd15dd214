use ndarray::{Array2, ArrayView2};

/// A scalar loss over a batch of predictions, one row per sample.
pub trait LossFn {
    /// Computes the mean loss of the batch.
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32;

    /// Computes the gradient of `loss` with respect to `y_pred`.
    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32>;
}

impl<L: LossFn + ?Sized> LossFn for Box<L> {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        (**self).loss(y_pred, y)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        (**self).loss_prime(y_pred, y)
    }
}
