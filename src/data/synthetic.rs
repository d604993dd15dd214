use ndarray::Array2;
use rand::{Rng, SeedableRng, rngs::StdRng};
use rand_distr::{Distribution, Normal, Uniform};

use super::InMemoryDataset;
use crate::error::{RebyvalErr, Result};

/// Draws gaussian blobs around `classes` random centers, one train/valid/test triple sharing
/// the same centers. Targets are one-hot encoded.
pub fn gaussian_blobs(
    features: usize,
    classes: usize,
    sizes: [usize; 3],
    spread: f32,
    seed: u64,
) -> Result<[InMemoryDataset; 3]> {
    let mut rng = StdRng::seed_from_u64(seed);
    let invalid = |e: &dyn std::fmt::Display| RebyvalErr::Config(format!("dataset: {e}"));

    let centers_dist = Uniform::new(-2.0f32, 2.0).map_err(|e| invalid(&e))?;
    let noise = Normal::new(0.0f32, spread).map_err(|e| invalid(&e))?;

    let centers = Array2::from_shape_fn((classes, features), |_| centers_dist.sample(&mut rng));

    let mut draw = |n: usize| {
        let mut x = Array2::zeros((n, features));
        let mut y = Array2::zeros((n, classes));

        for i in 0..n {
            let class = rng.random_range(0..classes);
            y[[i, class]] = 1.0;
            for j in 0..features {
                x[[i, j]] = centers[[class, j]] + noise.sample(&mut rng);
            }
        }

        InMemoryDataset::new(x, y)
    };

    let [train, valid, test] = sizes;
    Ok([draw(train)?, draw(valid)?, draw(test)?])
}
