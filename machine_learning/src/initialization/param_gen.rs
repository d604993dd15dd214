use rand::Rng;
use rand_distr::{Distribution, Normal, NormalError, Uniform, uniform::Error as UniformError};

use crate::{MlErr, Result};

/// A kernel initialization scheme.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamGen {
    Const { value: f32 },
    Uniform { low: f32, high: f32 },
    XavierUniform,
    LecunUniform,
    Normal { mean: f32, std_dev: f32 },
    Kaiming,
}

impl ParamGen {
    /// Fills `out` with values drawn from this scheme.
    ///
    /// # Arguments
    /// * `rng` - A random number generator.
    /// * `fan_in` - The number of input units of the tensor being initialized.
    /// * `fan_out` - The number of output units of the tensor being initialized.
    /// * `out` - The buffer to fill.
    ///
    /// # Returns
    /// An error if the scheme's distribution is invalid (e.g. `low > high`).
    pub fn fill<R>(&self, rng: &mut R, fan_in: usize, fan_out: usize, out: &mut [f32]) -> Result<()>
    where
        R: Rng + ?Sized,
    {
        match *self {
            ParamGen::Const { value } => {
                out.fill(value);
                Ok(())
            }
            ParamGen::Uniform { low, high } => sample_into(rng, Uniform::new(low, high)?, out),
            ParamGen::XavierUniform => {
                let range = (6. / (fan_in + fan_out).max(1) as f32).sqrt();
                sample_into(rng, Uniform::new(-range, range)?, out)
            }
            ParamGen::LecunUniform => {
                let range = (3. / fan_in.max(1) as f32).sqrt();
                sample_into(rng, Uniform::new(-range, range)?, out)
            }
            ParamGen::Normal { mean, std_dev } => {
                sample_into(rng, Normal::new(mean, std_dev)?, out)
            }
            ParamGen::Kaiming => {
                let std_dev = (2. / fan_in.max(1) as f32).sqrt();
                sample_into(rng, Normal::new(0., std_dev)?, out)
            }
        }
    }
}

fn sample_into<R, D>(rng: &mut R, distribution: D, out: &mut [f32]) -> Result<()>
where
    R: Rng + ?Sized,
    D: Distribution<f32>,
{
    for v in out.iter_mut() {
        *v = distribution.sample(rng);
    }

    Ok(())
}

impl From<NormalError> for MlErr {
    fn from(value: NormalError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}

impl From<UniformError> for MlErr {
    fn from(value: UniformError) -> Self {
        Self::InvalidDistribution(value.to_string())
    }
}
