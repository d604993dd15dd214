use crate::{MlErr, Result};

/// Turns gradients into parameter updates, possibly keeping state between steps.
pub trait Optimizer {
    /// Updates the provided parameters using the gradient.
    ///
    /// # Arguments
    /// * `params` - The parameters that are going to be modified.
    /// * `grad` - The gradient used for taking the step.
    ///
    /// # Returns
    /// An error if there's a mismatch in the sizes of `params` and `grad`.
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()>;

    /// Forgets any state accumulated by previous updates.
    fn reset(&mut self) {}
}

impl<O: Optimizer + ?Sized> Optimizer for Box<O> {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) -> Result<()> {
        (**self).update_params(params, grad)
    }

    fn reset(&mut self) {
        (**self).reset()
    }
}

pub(super) fn check_sizes(params: &[f32], grad: &[f32], state: Option<&[f32]>) -> Result<()> {
    if params.len() != grad.len() {
        return Err(MlErr::SizeMismatch {
            what: "gradient",
            got: grad.len(),
            expected: params.len(),
        });
    }

    if let Some(state) = state {
        if state.len() != params.len() {
            return Err(MlErr::SizeMismatch {
                what: "optimizer state",
                got: params.len(),
                expected: state.len(),
            });
        }
    }

    Ok(())
}
