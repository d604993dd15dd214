mod dataloader;
mod dataset;
mod synthetic;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use dataloader::{Batches, DataLoader, Splits, TaskData};
pub use dataset::{Batch, InMemoryDataset};
pub use synthetic::gaussian_blobs;

/// The data split a phase draws from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Split {
    Train,
    Valid,
    Test,
}

impl fmt::Display for Split {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Train => "train",
            Self::Valid => "valid",
            Self::Test => "test",
        };

        f.write_str(name)
    }
}
