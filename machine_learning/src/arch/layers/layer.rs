use ndarray::{Array2, ArrayView2};

use super::Dense;
use crate::{Result, arch::activations::ActFn};

#[derive(Debug, Clone)]
pub enum Layer {
    Dense(Dense),
}

impl Layer {
    pub fn dense(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self::Dense(Dense::new(dim, act_fn))
    }

    pub fn size(&self) -> usize {
        match self {
            Self::Dense(l) => l.size(),
        }
    }

    /// Returns the (input, output) dimensions of the layer.
    pub fn dim(&self) -> (usize, usize) {
        match self {
            Self::Dense(l) => l.dim(),
        }
    }

    pub fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.forward(params, x),
        }
    }

    pub fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        match self {
            Self::Dense(l) => l.backward(params, grad, d),
        }
    }
}
