use std::rc::Rc;

use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{Batch, InMemoryDataset, Split, gaussian_blobs};
use crate::{
    config::{DatasetConfig, StudentDataConfig},
    error::{RebyvalErr, Result},
    training::LoopPlan,
};

/// Cuts a dataset into shuffled batches.
#[derive(Debug, Clone)]
pub struct DataLoader {
    dataset: Rc<InMemoryDataset>,
    split: Split,
    batch_size: usize,
}

impl DataLoader {
    /// # Panics
    /// If `batch_size` is zero.
    pub fn new(dataset: Rc<InMemoryDataset>, split: Split, batch_size: usize) -> Self {
        assert!(batch_size > 0, "batch_size must be > 0");

        Self {
            dataset,
            split,
            batch_size,
        }
    }

    /// Returns the amount of batches a single pass over the dataset yields.
    #[inline]
    pub fn batches_per_pass(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Returns the smallest amount of passes yielding at least `needed` batches.
    #[inline]
    pub fn passes_for(&self, needed: usize) -> usize {
        needed.div_ceil(self.batches_per_pass()).max(1)
    }

    /// Yields `passes` passes over the dataset, each one in a fresh order drawn from `rng`.
    pub fn batches(&self, passes: usize, rng: &mut StdRng) -> Batches {
        let n = self.dataset.len();
        let mut chunks = Vec::with_capacity(passes * self.batches_per_pass());

        for _ in 0..passes {
            let mut order: Vec<usize> = (0..n).collect();
            order.shuffle(rng);
            chunks.extend(order.chunks(self.batch_size).map(<[usize]>::to_vec));
        }

        let dataset = Rc::clone(&self.dataset);
        Batches::new(
            self.split,
            chunks.into_iter().map(move |rows| dataset.select(&rows)),
        )
    }
}

/// A finite, non-restartable sequence of batches.
pub struct Batches {
    split: Split,
    served: usize,
    inner: Box<dyn Iterator<Item = Batch>>,
}

impl Batches {
    pub fn new<I>(split: Split, inner: I) -> Self
    where
        I: Iterator<Item = Batch> + 'static,
    {
        Self {
            split,
            served: 0,
            inner: Box::new(inner),
        }
    }

    /// A sequence over already built batches.
    pub fn from_vec(split: Split, batches: Vec<Batch>) -> Self {
        Self::new(split, batches.into_iter())
    }

    #[inline]
    pub fn split(&self) -> Split {
        self.split
    }

    /// Returns the amount of batches handed out so far.
    #[inline]
    pub fn served(&self) -> usize {
        self.served
    }

    /// Returns the next batch, or None once the sequence is exhausted.
    pub fn next_batch(&mut self) -> Option<Batch> {
        let batch = self.inner.next()?;
        self.served += 1;
        Some(batch)
    }

    /// Returns the next batch of a phase that declared `declared` batches in total.
    ///
    /// # Errors
    /// Returns `RebyvalErr::DataExhaustion` if the sequence ended early.
    pub fn require(&mut self, declared: usize) -> Result<Batch> {
        self.next_batch().ok_or(RebyvalErr::DataExhaustion {
            split: self.split,
            served: self.served,
            declared,
        })
    }
}

/// The three batch sequences a unit consumes in a run.
pub struct Splits {
    pub train: Batches,
    pub valid: Batches,
    pub test: Batches,
}

/// The task data every student of a run trains on, generated once.
#[derive(Debug, Clone)]
pub struct TaskData {
    train: Rc<InMemoryDataset>,
    valid: Rc<InMemoryDataset>,
    test: Rc<InMemoryDataset>,
}

impl TaskData {
    /// Builds the splits described by `dataset`, `seed` being used when the dataset
    /// doesn't pin its own.
    pub fn from_config(dataset: &DatasetConfig, seed: u64) -> Result<Self> {
        let [train, valid, test] = match dataset {
            DatasetConfig::Synthetic {
                features,
                classes,
                train_size,
                valid_size,
                test_size,
                spread,
                seed: own_seed,
            } => gaussian_blobs(
                *features,
                *classes,
                [*train_size, *valid_size, *test_size],
                *spread,
                own_seed.unwrap_or(seed),
            )?,
            DatasetConfig::Inline {
                x_size,
                y_size,
                train,
                valid,
                test,
            } => [
                InMemoryDataset::from_rows(*x_size, *y_size, train)?,
                InMemoryDataset::from_rows(*x_size, *y_size, valid)?,
                InMemoryDataset::from_rows(*x_size, *y_size, test)?,
            ],
        };

        Ok(Self::new(train, valid, test))
    }

    pub fn new(train: InMemoryDataset, valid: InMemoryDataset, test: InMemoryDataset) -> Self {
        Self {
            train: Rc::new(train),
            valid: Rc::new(valid),
            test: Rc::new(test),
        }
    }

    /// Returns the (input, output) widths of the samples.
    pub fn dims(&self) -> (usize, usize) {
        (self.train.x().ncols(), self.train.y().ncols())
    }

    /// Builds the batch sequences of a single student run.
    ///
    /// Without an explicit `passes` each split yields just enough passes to cover `plan`.
    pub fn splits(&self, cfg: &StudentDataConfig, plan: &LoopPlan, seed: u64) -> Splits {
        let mut rng = StdRng::seed_from_u64(seed);

        let mut sequence = |dataset: &Rc<InMemoryDataset>, split: Split, needed: usize| {
            let loader = DataLoader::new(Rc::clone(dataset), split, cfg.batch_size);
            let passes = cfg.passes.unwrap_or_else(|| loader.passes_for(needed));
            loader.batches(passes, &mut rng)
        };

        Splits {
            train: sequence(&self.train, Split::Train, plan.train_batches()),
            valid: sequence(&self.valid, Split::Valid, plan.valid_batches()),
            test: sequence(&self.test, Split::Test, plan.test_batches()),
        }
    }
}
