use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Plain gradient descent: `w -= lr * g`.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
}

impl GradientDescent {
    pub fn new(learning_rate: f32) -> Self {
        Self { learning_rate }
    }
}

impl Optimizer for GradientDescent {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, None)?;

        for (w, g) in params.iter_mut().zip(grad) {
            *w -= self.learning_rate * g;
        }

        Ok(())
    }
}
