use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Model, ParamSlot, layers::Layer};
use crate::{MlErr, Result, initialization::ParamGen};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the *deltas* of its layers.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Layer>,
}

impl Sequential {
    /// Creates a new `Sequential`.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance.
    pub fn new<I>(layers: I) -> Self
    where
        I: IntoIterator<Item = Layer>,
    {
        Self {
            layers: layers.into_iter().collect(),
        }
    }

    /// Returns the width of the model's input, zero if it has no layers.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.dim().0)
    }

    /// Describes how the flat parameter vector splits into per layer kernels and biases.
    pub fn layout(&self) -> Vec<ParamSlot> {
        self.layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                let (n, m) = layer.dim();
                [
                    ParamSlot {
                        name: format!("dense_{i}/kernel"),
                        shape: vec![n, m],
                    },
                    ParamSlot {
                        name: format!("dense_{i}/bias"),
                        shape: vec![m],
                    },
                ]
            })
            .collect()
    }

    /// Generates a fresh parameter vector for this model.
    ///
    /// Kernels are sampled from `init` using each layer's fan in and fan out, biases start at zero.
    ///
    /// # Arguments
    /// * `init` - The kernel initialization scheme.
    /// * `rng` - A random number generator.
    ///
    /// # Returns
    /// The parameters or an error if the distribution is invalid.
    pub fn init_params<R>(&self, init: ParamGen, rng: &mut R) -> Result<Vec<f32>>
    where
        R: Rng + ?Sized,
    {
        let mut params = vec![0.0; self.size()];
        let mut offset = 0;

        for layer in &self.layers {
            let (fan_in, fan_out) = layer.dim();
            let w_size = fan_in * fan_out;
            init.fill(rng, fan_in, fan_out, &mut params[offset..offset + w_size])?;
            offset += layer.size();
        }

        Ok(params)
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        let expected = self.size();
        if got != expected {
            return Err(MlErr::SizeMismatch {
                what,
                got,
                expected,
            });
        }

        Ok(())
    }
}

impl Model for Sequential {
    fn size(&self) -> usize {
        self.layers.iter().map(|layer| layer.size()).sum()
    }

    fn forward(&mut self, params: &[f32], x: ArrayView2<f32>) -> Result<Array2<f32>> {
        self.check_len("parameters", params.len())?;

        let mut offset = 0;
        let mut a: Option<Array2<f32>> = None;

        for layer in self.layers.iter_mut() {
            let size = layer.size();
            let layer_params = &params[offset..offset + size];

            let next = match &a {
                Some(prev) => layer.forward(layer_params, prev.view())?,
                None => layer.forward(layer_params, x.view())?,
            };

            a = Some(next);
            offset += size;
        }

        a.ok_or(MlErr::EmptyModel)
    }

    fn backward(
        &mut self,
        params: &[f32],
        grad: &mut [f32],
        mut d: Array2<f32>,
    ) -> Result<Array2<f32>> {
        self.check_len("parameters", params.len())?;
        self.check_len("gradient", grad.len())?;

        let mut end = params.len();

        for layer in self.layers.iter_mut().rev() {
            let start = end - layer.size();
            d = layer.backward(&params[start..end], &mut grad[start..end], d)?;
            end = start;
        }

        Ok(d)
    }
}
