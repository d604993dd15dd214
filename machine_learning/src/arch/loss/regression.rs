use ndarray::{Array2, ArrayView2};

use super::LossFn;

/// Mean squared error, averaged over every element.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mse;

/// Mean absolute error, averaged over every element. Its subgradient at zero error is zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct Mae;

impl Mse {
    pub fn new() -> Self {
        Self
    }
}

impl Mae {
    pub fn new() -> Self {
        Self
    }
}

impl LossFn for Mse {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        mean_of(y_pred, y, |e| e * e)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;
        (&y_pred - &y).mapv(|e| 2. * e / n)
    }
}

impl LossFn for Mae {
    fn loss(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> f32 {
        mean_of(y_pred, y, f32::abs)
    }

    fn loss_prime(&self, y_pred: ArrayView2<f32>, y: ArrayView2<f32>) -> Array2<f32> {
        let n = y_pred.len().max(1) as f32;
        (&y_pred - &y).mapv(|e| if e == 0. { 0. } else { e.signum() / n })
    }
}

fn mean_of(y_pred: ArrayView2<f32>, y: ArrayView2<f32>, f: impl Fn(f32) -> f32) -> f32 {
    (&y_pred - &y).mapv(f).mean().unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn regression_losses() {
        let y_pred = array![[1.0], [4.0]];
        let y = array![[2.0], [2.0]];

        assert_eq!(Mse.loss(y_pred.view(), y.view()), 2.5);
        assert_eq!(Mae.loss(y_pred.view(), y.view()), 1.5);

        assert_eq!(Mse.loss_prime(y_pred.view(), y.view()), array![[-1.0], [2.0]]);
        assert_eq!(Mae.loss_prime(y_pred.view(), y.view()), array![[-0.5], [0.5]]);
    }
}
