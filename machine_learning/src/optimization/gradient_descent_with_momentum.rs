use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Gradient descent accumulating a velocity: `v = mu * v + g; w -= lr * v`.
#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<f32>,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` for `len` parameters.
    pub fn new(len: usize, learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: vec![0.; len],
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, Some(self.velocity.as_slice()))?;

        for ((w, g), v) in params.iter_mut().zip(grad).zip(&mut self.velocity) {
            *v = self.momentum * *v + g;
            *w -= self.learning_rate * *v;
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.velocity.fill(0.);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn velocity_accumulates_until_reset() {
        let mut opt = GradientDescentWithMomentum::new(1, 0.1, 0.5);
        let mut w = [1.0];

        opt.update_params(&mut w, &[1.0]).unwrap();
        assert!((w[0] - 0.9).abs() < 1e-6);

        // v = 0.5 * 1 + 1
        opt.update_params(&mut w, &[1.0]).unwrap();
        assert!((w[0] - 0.75).abs() < 1e-6);

        opt.reset();
        opt.update_params(&mut w, &[1.0]).unwrap();
        assert!((w[0] - 0.65).abs() < 1e-6);
    }
}
