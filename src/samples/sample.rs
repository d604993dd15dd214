use machine_learning::arch::ParamSlot;
use serde::{Deserialize, Serialize};

use crate::ids::StudentId;

/// A named slice of a student's parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub name: String,
    pub shape: Vec<usize>,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleMeta {
    pub student_id: StudentId,
    pub epoch: usize,
    pub step: usize,
    /// Whether the student trained against a supervisor.
    pub supervised: bool,
}

/// A student's weights paired with the validation loss they reached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub weights: Vec<Tensor>,
    pub valid_loss: f32,
    pub meta: SampleMeta,
}

impl Sample {
    /// Cuts a flat parameter vector into one tensor per slot of `layout`.
    ///
    /// # Panics
    /// If `params` is shorter than the layout.
    pub fn from_params(
        layout: &[ParamSlot],
        params: &[f32],
        valid_loss: f32,
        meta: SampleMeta,
    ) -> Self {
        let mut offset = 0;
        let weights = layout
            .iter()
            .map(|slot| {
                let end = offset + slot.len();
                let values = params[offset..end].to_vec();
                offset = end;

                Tensor {
                    name: slot.name.clone(),
                    shape: slot.shape.clone(),
                    values,
                }
            })
            .collect();

        Self {
            weights,
            valid_loss,
            meta,
        }
    }

    /// Returns the total amount of scalars in the weights.
    pub fn weights_len(&self) -> usize {
        self.weights.iter().map(|t| t.values.len()).sum()
    }

    /// Writes the weights, tensor after tensor, into `out`.
    pub fn flatten_into(&self, out: &mut [f32]) {
        let mut offset = 0;
        for t in &self.weights {
            out[offset..offset + t.values.len()].copy_from_slice(&t.values);
            offset += t.values.len();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_follows_layout() {
        let layout = vec![
            ParamSlot {
                name: "dense_0/kernel".into(),
                shape: vec![2, 2],
            },
            ParamSlot {
                name: "dense_0/bias".into(),
                shape: vec![2],
            },
        ];
        let params = [1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
        let meta = SampleMeta {
            student_id: StudentId(3),
            epoch: 0,
            step: 2,
            supervised: false,
        };

        let sample = Sample::from_params(&layout, &params, 0.5, meta);
        assert_eq!(sample.weights[0].values, vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(sample.weights[1].values, vec![5.0, 6.0]);
        assert_eq!(sample.weights_len(), 6);

        let mut flat = [0.0; 6];
        sample.flatten_into(&mut flat);
        assert_eq!(flat, params);
    }
}
