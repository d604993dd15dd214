use machine_learning::{
    MlErr,
    arch::{Model, Sequential},
};
use ndarray::{Array2, ArrayView2};

use crate::ids::SupervisorId;

/// A frozen copy of a supervisor, evaluated by a student as a differentiable function of its
/// own parameters. Gradients flow into the student only, the copied parameters never change.
#[derive(Debug, Clone)]
pub struct Critic {
    supervisor_id: SupervisorId,
    model: Sequential,
    params: Vec<f32>,
    scratch: Vec<f32>,
}

impl Critic {
    pub(super) fn new(supervisor_id: SupervisorId, model: Sequential, params: Vec<f32>) -> Self {
        let scratch = vec![0.0; params.len()];

        Self {
            supervisor_id,
            model,
            params,
            scratch,
        }
    }

    pub fn supervisor_id(&self) -> SupervisorId {
        self.supervisor_id
    }

    /// Returns the amount of student parameters this critic scores.
    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// Predicts the validation loss of `weights`.
    ///
    /// # Arguments
    /// * `weights` - A student's flat parameter vector.
    /// * `grad` - Overwritten with the gradient of the prediction with respect to `weights`.
    ///
    /// # Returns
    /// The predicted loss, or an error if the sizes mismatch or the prediction diverged.
    pub fn surrogate(&mut self, weights: &[f32], grad: &mut [f32]) -> Result<f32, MlErr> {
        let expected = self.input_size();
        if weights.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "critic input",
                got: weights.len(),
                expected,
            });
        }

        if grad.len() != expected {
            return Err(MlErr::SizeMismatch {
                what: "critic gradient",
                got: grad.len(),
                expected,
            });
        }

        let x = ArrayView2::from_shape((1, weights.len()), weights)?;
        let y = self.model.forward(&self.params, x)?;
        let value = y[[0, 0]];
        if !value.is_finite() {
            return Err(MlErr::NonFinite { what: "surrogate" });
        }

        let dx = self
            .model
            .backward(&self.params, &mut self.scratch, Array2::ones((1, 1)))?;

        for (g, d) in grad.iter_mut().zip(dx.iter()) {
            *g = *d;
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::arch::layers::Layer;

    use super::*;

    #[test]
    fn linear_critic_gradient_is_its_kernel() {
        // y = 2 * w0 - w1 + 0.5
        let model = Sequential::new([Layer::dense((2, 1), None)]);
        let params = vec![2.0, -1.0, 0.5];
        let mut critic = Critic::new(SupervisorId(0), model, params.clone());

        let mut grad = [0.0; 2];
        let value = critic.surrogate(&[1.0, 3.0], &mut grad).unwrap();

        assert!((value - (-0.5)).abs() < 1e-6);
        assert_eq!(grad, [2.0, -1.0]);
        assert_eq!(critic.params(), params.as_slice());
    }

    #[test]
    fn rejects_foreign_weight_vectors() {
        let model = Sequential::new([Layer::dense((3, 1), None)]);
        let mut critic = Critic::new(SupervisorId(1), model, vec![0.0; 4]);

        let res = critic.surrogate(&[1.0, 2.0], &mut [0.0; 2]);
        assert!(matches!(res, Err(MlErr::SizeMismatch { .. })));
    }
}
