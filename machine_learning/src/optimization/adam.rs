use super::{Optimizer, optimizer::check_sizes};
use crate::Result;

/// Adam with bias corrected first and second moment estimates.
#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    epsilon: f32,
    t: i32,
    m: Vec<f32>,
    v: Vec<f32>,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `len` - The amount of parameters this instance updates.
    /// * `learning_rate` - The step size.
    /// * `beta1`, `beta2` - Decay rates of the first and second moment estimates.
    /// * `epsilon` - Keeps the update finite when the second moment vanishes.
    pub fn new(len: usize, learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            t: 0,
            m: vec![0.; len],
            v: vec![0.; len],
        }
    }
}

impl Optimizer for Adam {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        check_sizes(params, grad, Some(self.m.as_slice()))?;

        self.t += 1;
        let (b1, b2) = (self.beta1, self.beta2);
        let bc1 = 1. - b1.powi(self.t);
        let bc2 = 1. - b2.powi(self.t);

        for (((w, g), m), v) in params
            .iter_mut()
            .zip(grad)
            .zip(&mut self.m)
            .zip(&mut self.v)
        {
            *m = b1 * *m + (1. - b1) * g;
            *v = b2 * *v + (1. - b2) * g * g;

            let m_hat = *m / bc1;
            let v_hat = *v / bc2;
            *w -= self.learning_rate * m_hat / (v_hat.sqrt() + self.epsilon);
        }

        Ok(())
    }

    fn reset(&mut self) {
        self.t = 0;
        self.m.fill(0.);
        self.v.fill(0.);
    }
}
