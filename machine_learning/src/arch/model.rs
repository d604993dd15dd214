use ndarray::{Array2, ArrayView2};

use crate::{MlErr, Result, arch::loss::LossFn};

/// Names a contiguous region of a model's flat parameter vector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamSlot {
    pub name: String,
    pub shape: Vec<usize>,
}

impl ParamSlot {
    /// Returns the amount of scalars in this slot.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub trait Model {
    /// Returns the amount of parameters in the model.
    fn size(&self) -> usize;

    /// Makes a forward pass through the model.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `x` - A batch of inputs, one per row.
    ///
    /// # Returns
    /// The predictions for the given inputs.
    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Makes a backward pass over the last forwarded batch.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer overwritten with the gradient with respect to `params`.
    /// * `d` - The gradient of the objective with respect to the model's output.
    ///
    /// # Returns
    /// The gradient of the objective with respect to the model's input.
    fn backward(&mut self, params: &[f32], grad: &mut [f32], d: Array2<f32>)
    -> Result<Array2<f32>>;

    /// Computes the loss of a single batch and writes its gradient into `grad`.
    ///
    /// # Arguments
    /// * `params` - The model's parameters.
    /// * `grad` - A buffer overwritten with the gradient of the loss.
    /// * `loss_fn` - The loss function.
    /// * `x` - The batch inputs.
    /// * `y` - The batch targets.
    ///
    /// # Returns
    /// The batch loss, or an error if the shapes mismatch or the loss diverged.
    fn backprop<L>(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        loss_fn: &L,
        x: ArrayView2<f32>,
        y: ArrayView2<f32>,
    ) -> Result<f32>
    where
        L: LossFn + ?Sized,
    {
        let y_pred = self.forward(params, x)?;
        if y_pred.dim() != y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: y.len(),
                expected: y_pred.len(),
            });
        }

        let loss = loss_fn.loss(y_pred.view(), y);
        if !loss.is_finite() {
            return Err(MlErr::NonFinite { what: "loss" });
        }

        let d = loss_fn.loss_prime(y_pred.view(), y);
        self.backward(params, grad, d)?;

        Ok(loss)
    }
}
