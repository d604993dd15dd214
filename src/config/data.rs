use serde::{Deserialize, Serialize};

use super::ensure;
use crate::error::Result;

/// Where a student's train/valid/test data comes from and how much of it each phase consumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentDataConfig {
    pub dataset: DatasetConfig,
    pub batch_size: usize,
    pub epochs: usize,
    pub train_step: usize,
    pub valid_step: usize,
    pub test_step: usize,
    /// How many shuffled passes over each split the loader yields. When absent the loader
    /// yields just enough passes to cover the declared steps.
    #[serde(default)]
    pub passes: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum DatasetConfig {
    /// Gaussian class blobs around randomly placed centers.
    Synthetic {
        features: usize,
        classes: usize,
        train_size: usize,
        valid_size: usize,
        test_size: usize,
        #[serde(default = "default_spread")]
        spread: f32,
        #[serde(default)]
        seed: Option<u64>,
    },
    /// Row-major `x_size + y_size` wide rows, `y` being one-hot encoded.
    Inline {
        x_size: usize,
        y_size: usize,
        train: Vec<f32>,
        valid: Vec<f32>,
        test: Vec<f32>,
    },
}

/// How the supervisor batches its sample corpus.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorDataConfig {
    pub batch_size: usize,
    pub epochs: usize,
    #[serde(default = "default_valid_fraction")]
    pub valid_fraction: f32,
}

fn default_spread() -> f32 {
    0.5
}

fn default_valid_fraction() -> f32 {
    0.2
}

impl StudentDataConfig {
    pub(super) fn validate(&self) -> Result<()> {
        ensure(self.batch_size > 0, || "student batch_size must be > 0".into())?;
        ensure(self.epochs > 0, || "student epochs must be > 0".into())?;
        ensure(self.train_step > 0, || "student train_step must be > 0".into())?;
        ensure(self.valid_step > 0, || "student valid_step must be > 0".into())?;
        ensure(self.test_step > 0, || "student test_step must be > 0".into())?;
        ensure(self.passes != Some(0), || "student passes must be > 0".into())?;

        self.dataset.validate()
    }
}

impl DatasetConfig {
    fn validate(&self) -> Result<()> {
        match self {
            Self::Synthetic {
                features,
                classes,
                train_size,
                valid_size,
                test_size,
                spread,
                ..
            } => {
                ensure(*features > 0, || "dataset features must be > 0".into())?;
                ensure(*classes >= 2, || "dataset classes must be >= 2".into())?;
                ensure(*train_size > 0 && *valid_size > 0 && *test_size > 0, || {
                    "dataset split sizes must be > 0".into()
                })?;
                ensure(spread.is_finite() && *spread > 0.0, || {
                    format!("dataset spread must be positive, got {spread}")
                })
            }
            Self::Inline {
                x_size,
                y_size,
                train,
                valid,
                test,
            } => {
                let row = x_size + y_size;
                ensure(*x_size > 0 && *y_size > 0, || {
                    "x_size and y_size must be > 0".into()
                })?;

                for (name, data) in [("train", train), ("valid", valid), ("test", test)] {
                    ensure(!data.is_empty(), || format!("inline {name} split is empty"))?;
                    ensure(data.len() % row == 0, || {
                        format!(
                            "inline {name} split length ({}) is not divisible by x_size + y_size ({row})",
                            data.len()
                        )
                    })?;
                }

                Ok(())
            }
        }
    }
}

impl SupervisorDataConfig {
    pub(super) fn validate(&self) -> Result<()> {
        ensure(self.batch_size > 0, || "supervisor batch_size must be > 0".into())?;
        ensure(self.epochs > 0, || "supervisor epochs must be > 0".into())?;
        ensure((0.0..1.0).contains(&self.valid_fraction), || {
            format!(
                "supervisor valid_fraction must be in [0, 1), got {}",
                self.valid_fraction
            )
        })
    }
}
