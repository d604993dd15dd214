use std::{collections::BTreeSet, num::NonZeroUsize};

use log::info;
use machine_learning::{
    MlErr,
    arch::{Model, Sequential, loss::LossFn},
    metrics::{MeanAbsErr, Metric},
    optimization::Optimizer,
};
use ndarray::{Array2, ArrayView1, ArrayView2};
use rand::{SeedableRng, rngs::StdRng, seq::SliceRandom};

use super::{
    Critic, LoopPlan, RunSummary, StudentHandle, TraceSteps, TrainLoss, TrainableUnit, ValidSchedule,
    run_unit,
};
use crate::{
    config::SupervisorConfig,
    data::{Batch, Batches, InMemoryDataset, Split, Splits},
    error::{PersistenceErr, RebyvalErr, Result},
    ids::{StudentId, SupervisorId},
    samples::{Sample, SampleSource},
    trace::TraceSink,
};

/// What a single supervisor training call did.
#[derive(Debug, Clone, PartialEq)]
pub struct SupervisorReport {
    pub id: SupervisorId,
    pub keep_train: bool,
    /// The amount of samples in the snapshot trained on.
    pub corpus: usize,
    pub new_students: Vec<StudentId>,
    pub summary: RunSummary,
}

/// Learns to predict a student's validation loss from its flat weight vector.
pub struct Supervisor {
    id: SupervisorId,
    name: String,
    cfg: SupervisorConfig,
    seed: u64,
    valid_gap: NonZeroUsize,

    model: Sequential,
    params: Vec<f32>,
    grad: Vec<f32>,
    optimizer: Box<dyn Optimizer>,
    loss_fn: Box<dyn LossFn>,
    mae: MeanAbsErr,
    rng: StdRng,

    plan: LoopPlan,
    runs: usize,
    trace_steps: TraceSteps,
    students_seen: BTreeSet<StudentId>,
}

impl Supervisor {
    /// Creates a new, untrained `Supervisor`.
    ///
    /// # Arguments
    /// * `id` - The supervisor's run-wide id.
    /// * `cfg` - The supervisor section of the experiment.
    /// * `input_size` - The amount of weights of the students it scores.
    /// * `seed` - Seeds the parameter initialization and the corpus shuffling.
    pub fn new(
        id: SupervisorId,
        cfg: SupervisorConfig,
        input_size: usize,
        seed: u64,
    ) -> Result<Self> {
        let valid_gap = NonZeroUsize::new(cfg.train_loop.valid.valid_gap)
            .ok_or_else(|| RebyvalErr::Config("supervisor valid_gap must be > 0".into()))?;

        let model = cfg.model.build(input_size, 1);
        let size = model.size();

        let mut supervisor = Self {
            id,
            name: id.to_string(),
            optimizer: cfg.optimizer.build(size),
            loss_fn: cfg.loss.build(),
            cfg,
            seed,
            valid_gap,
            model,
            params: Vec::new(),
            grad: vec![0.0; size],
            mae: MeanAbsErr::new(),
            rng: StdRng::seed_from_u64(seed),
            plan: LoopPlan {
                epochs: 0,
                train_step: 0,
                valid_step: 0,
                test_step: 0,
                valid: ValidSchedule::new(valid_gap),
            },
            runs: 0,
            trace_steps: TraceSteps::default(),
            students_seen: BTreeSet::new(),
        };

        supervisor.reset()?;
        Ok(supervisor)
    }

    pub fn id(&self) -> SupervisorId {
        self.id
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    pub fn input_size(&self) -> usize {
        self.model.input_size()
    }

    /// Returns how many times `run` completed.
    pub fn trained_runs(&self) -> usize {
        self.runs
    }

    /// Returns the students whose samples were announced through `run`.
    pub fn students_seen(&self) -> &BTreeSet<StudentId> {
        &self.students_seen
    }

    /// Predicts the validation loss of a flat weight vector with the current parameters.
    pub fn predict(&mut self, weights: &[f32]) -> std::result::Result<f32, MlErr> {
        let x = ArrayView2::from_shape((1, weights.len()), weights)?;
        let y = self.model.forward(&self.params, x)?;
        Ok(y[[0, 0]])
    }

    /// Returns a frozen copy of the current parameters for students to train against.
    ///
    /// # Errors
    /// `RebyvalErr::UntrainedSupervisor` if `run` never completed.
    pub fn critic(&self) -> Result<Critic> {
        if self.runs == 0 {
            return Err(RebyvalErr::UntrainedSupervisor {
                supervisor_id: self.id,
            });
        }

        Ok(Critic::new(self.id, self.model.clone(), self.params.clone()))
    }

    /// Trains on every sample `source` holds.
    ///
    /// # Arguments
    /// * `keep_train` - Continue from the current parameters, or start over from the seed.
    /// * `new_students` - Students finished since the last call. Each one must have all of its
    ///   samples in the snapshot.
    /// * `source` - The sample pool.
    /// * `trace` - Receives the loss series.
    ///
    /// # Errors
    /// * `Persistence` if the pool can't be read, misses announced samples or holds weight
    ///   vectors of the wrong size.
    /// * `DataExhaustion` if the pool is empty.
    /// * `StepCompute` if a step fails.
    pub fn run<S>(
        &mut self,
        keep_train: bool,
        new_students: &[StudentHandle],
        source: &S,
        trace: &mut dyn TraceSink,
    ) -> Result<SupervisorReport>
    where
        S: SampleSource + ?Sized,
    {
        if !keep_train {
            self.reset()?;
        }

        let corpus = source.snapshot()?;
        check_announced(&corpus, new_students)?;

        if corpus.is_empty() {
            return Err(RebyvalErr::DataExhaustion {
                split: Split::Train,
                served: 0,
                declared: 1,
            });
        }

        let dataset = self.corpus_dataset(&corpus)?;
        let splits = self.plan_run(&dataset);

        info!(
            "{}: training on {} samples (keep_train: {keep_train}, new students: {})",
            self.name,
            corpus.len(),
            new_students.len()
        );

        let summary = run_unit(self, splits, trace)?;
        self.runs += 1;
        self.trace_steps = summary.trace_end;
        self.students_seen.extend(new_students.iter().map(|h| h.id));

        Ok(SupervisorReport {
            id: self.id,
            keep_train,
            corpus: corpus.len(),
            new_students: new_students.iter().map(|h| h.id).collect(),
            summary,
        })
    }

    /// Starts over from the seeded initial state.
    fn reset(&mut self) -> Result<()> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        self.params = self
            .model
            .init_params(self.cfg.model.init.resolve(), &mut rng)
            .map_err(|e| RebyvalErr::Config(format!("supervisor init: {e}")))?;

        self.optimizer.reset();
        self.rng = rng;
        Ok(())
    }

    fn corpus_dataset(&self, corpus: &[Sample]) -> Result<InMemoryDataset> {
        let expected = self.input_size();
        let mut x = Array2::zeros((corpus.len(), expected));
        let mut y = Array2::zeros((corpus.len(), 1));

        for (i, sample) in corpus.iter().enumerate() {
            let got = sample.weights_len();
            if got != expected {
                return Err(PersistenceErr::InconsistentWeights {
                    student_id: sample.meta.student_id,
                    got,
                    expected,
                }
                .into());
            }

            let mut row = vec![0.0; expected];
            sample.flatten_into(&mut row);
            x.row_mut(i).assign(&ArrayView1::from(row.as_slice()));
            y[[i, 0]] = sample.valid_loss;
        }

        InMemoryDataset::new(x, y)
    }

    /// Splits the corpus into train and validation rows and lays out the batches of a run.
    fn plan_run(&mut self, dataset: &InMemoryDataset) -> Splits {
        let n = dataset.len();
        let bs = self.cfg.dataloader.batch_size;
        let epochs = self.cfg.dataloader.epochs;

        let mut order: Vec<usize> = (0..n).collect();
        order.shuffle(&mut self.rng);

        let n_valid = ((n as f32 * self.cfg.dataloader.valid_fraction) as usize).min(n - 1);
        let (valid_rows, train_rows) = order.split_at(n_valid);
        let mut train_rows = train_rows.to_vec();

        self.plan = LoopPlan {
            epochs,
            train_step: train_rows.len().div_ceil(bs),
            valid_step: valid_rows.len().div_ceil(bs),
            test_step: n.div_ceil(bs),
            valid: ValidSchedule::new(self.valid_gap),
        };

        let mut train = Vec::with_capacity(self.plan.train_batches());
        for _ in 0..epochs {
            train_rows.shuffle(&mut self.rng);
            train.extend(train_rows.chunks(bs).map(|rows| dataset.select(rows)));
        }

        let valid_pass: Vec<Batch> = valid_rows
            .chunks(bs)
            .map(|rows| dataset.select(rows))
            .collect();
        let passes = epochs * self.plan.valid.passes_per_epoch(self.plan.train_step);
        let valid = (0..passes).flat_map(|_| valid_pass.iter().cloned()).collect();

        let all: Vec<usize> = (0..n).collect();
        let test = all.chunks(bs).map(|rows| dataset.select(rows)).collect();

        Splits {
            train: Batches::from_vec(Split::Train, train),
            valid: Batches::from_vec(Split::Valid, valid),
            test: Batches::from_vec(Split::Test, test),
        }
    }

    fn evaluate(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
        let y_pred = self.model.forward(&self.params, batch.x.view())?;
        let loss = self.loss_fn.loss(y_pred.view(), batch.y.view());
        if !loss.is_finite() {
            return Err(MlErr::NonFinite { what: "loss" });
        }

        self.mae.update(y_pred.view(), batch.y.view());
        Ok(loss)
    }
}

impl TrainableUnit for Supervisor {
    fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self) -> &LoopPlan {
        &self.plan
    }

    fn trace_steps(&self) -> TraceSteps {
        self.trace_steps
    }

    fn train_step(&mut self, batch: &Batch) -> std::result::Result<TrainLoss, MlErr> {
        let task = self.model.backprop(
            &self.params,
            &mut self.grad,
            &self.loss_fn,
            batch.x.view(),
            batch.y.view(),
        )?;

        self.optimizer.update_params(&mut self.params, &self.grad)?;
        Ok(TrainLoss {
            task,
            surrogate: None,
        })
    }

    fn valid_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
        self.evaluate(batch)
    }

    fn reset_metrics(&mut self) {
        self.mae.reset();
    }

    fn metric(&self) -> f32 {
        self.mae.result()
    }
}

/// Every announced student must have all of its samples in the snapshot.
fn check_announced(corpus: &[Sample], new_students: &[StudentHandle]) -> Result<()> {
    for handle in new_students {
        let found = corpus
            .iter()
            .filter(|s| s.meta.student_id == handle.id)
            .count();

        if found < handle.samples {
            return Err(PersistenceErr::MissingSamples {
                student_id: handle.id,
                expected: handle.samples,
                found,
            }
            .into());
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        samples::{MemorySampleStore, SampleMeta, SampleWriter, Tensor},
        trace::{MemoryTrace, NullTrace},
    };

    fn config() -> SupervisorConfig {
        serde_json::from_value(json!({
            "dataloader": { "batch_size": 2, "epochs": 3, "valid_fraction": 0.25 },
            "model": { "hidden": [4], "act_fn": "tanh" },
            "optimizer": { "adam": { "learning_rate": 0.01 } },
            "train_loop": { "valid": { "valid_gap": 1 } }
        }))
        .unwrap()
    }

    fn sample(id: u64, step: usize, weights: [f32; 3], loss: f32) -> Sample {
        Sample {
            weights: vec![Tensor {
                name: "dense_0/kernel".into(),
                shape: vec![3],
                values: weights.to_vec(),
            }],
            valid_loss: loss,
            meta: SampleMeta {
                student_id: StudentId(id),
                epoch: 0,
                step,
                supervised: false,
            },
        }
    }

    fn store() -> MemorySampleStore {
        let mut store = MemorySampleStore::new();
        for i in 0..8 {
            let w = i as f32 / 8.0;
            store
                .append(&sample(i / 4, (i % 4) as usize, [w, -w, 0.5], 1.0 - w))
                .unwrap();
        }
        store
    }

    fn handle(id: u64, samples: usize) -> StudentHandle {
        StudentHandle {
            id: StudentId(id),
            samples,
            supervised: false,
            valid_loss: None,
            test_loss: 0.0,
        }
    }

    #[test]
    fn trace_steps_keep_growing_across_runs() {
        let mut supervisor = Supervisor::new(SupervisorId(0), config(), 3, 0).unwrap();
        let mut trace = MemoryTrace::new();

        supervisor.run(false, &[], &store(), &mut trace).unwrap();
        supervisor.run(true, &[], &store(), &mut trace).unwrap();
        supervisor.run(false, &[], &store(), &mut trace).unwrap();

        let steps = |tag: &str| {
            trace
                .records()
                .iter()
                .filter(|r| r.tag == tag)
                .map(|r| r.step)
                .collect::<Vec<_>>()
        };

        for tag in ["train_loss", "valid_loss", "test_loss"] {
            let series = steps(&format!("supervisor-0/{tag}"));
            assert!(!series.is_empty());
            assert!(series.windows(2).all(|w| w[0] < w[1]), "{tag}: {series:?}");
        }
        assert_eq!(steps("supervisor-0/test_metric"), vec![0, 1, 2]);
        assert_eq!(steps("supervisor-0/train_loss").len(), 3 * supervisor.plan().train_batches());
    }

    #[test]
    fn untrained_supervisor_has_no_critic() {
        let supervisor = Supervisor::new(SupervisorId(0), config(), 3, 0).unwrap();
        assert!(matches!(
            supervisor.critic(),
            Err(RebyvalErr::UntrainedSupervisor { .. })
        ));
    }

    #[test]
    fn run_reports_the_corpus_and_splits_it() {
        let mut supervisor = Supervisor::new(SupervisorId(0), config(), 3, 0).unwrap();
        let report = supervisor.run(false, &[], &store(), &mut NullTrace).unwrap();

        assert_eq!(report.corpus, 8);
        // 2 valid rows, 6 train rows in batches of 2
        assert_eq!(supervisor.plan().train_step, 3);
        assert_eq!(supervisor.plan().valid_step, 1);
        assert_eq!(supervisor.plan().test_step, 4);
        assert_eq!(report.summary.validations.len(), 9);
        assert_eq!(supervisor.trained_runs(), 1);
        assert!(supervisor.critic().is_ok());
    }

    #[test]
    fn announced_students_must_be_in_the_pool() {
        let mut supervisor = Supervisor::new(SupervisorId(0), config(), 3, 0).unwrap();

        let res = supervisor.run(true, &[handle(1, 4)], &store(), &mut NullTrace);
        assert!(res.is_ok());
        assert!(supervisor.students_seen().contains(&StudentId(1)));

        let res = supervisor.run(true, &[handle(5, 1)], &store(), &mut NullTrace);
        assert!(matches!(
            res,
            Err(RebyvalErr::Persistence(PersistenceErr::MissingSamples { found: 0, .. }))
        ));
    }

    #[test]
    fn empty_pool_is_data_exhaustion() {
        let mut supervisor = Supervisor::new(SupervisorId(0), config(), 3, 0).unwrap();
        let res = supervisor.run(false, &[], &MemorySampleStore::new(), &mut NullTrace);
        assert!(matches!(res, Err(RebyvalErr::DataExhaustion { .. })));
    }

    #[test]
    fn foreign_weight_vectors_are_rejected() {
        let mut supervisor = Supervisor::new(SupervisorId(0), config(), 4, 0).unwrap();
        let res = supervisor.run(false, &[], &store(), &mut NullTrace);
        assert!(matches!(
            res,
            Err(RebyvalErr::Persistence(PersistenceErr::InconsistentWeights {
                got: 3,
                expected: 4,
                ..
            }))
        ));
    }

    #[test]
    fn critic_matches_the_supervisor_prediction() {
        let mut supervisor = Supervisor::new(SupervisorId(2), config(), 3, 1).unwrap();
        supervisor.run(false, &[], &store(), &mut NullTrace).unwrap();

        let weights = [0.25, -0.25, 0.5];
        let mut critic = supervisor.critic().unwrap();
        let mut grad = [0.0; 3];

        let surrogate = critic.surrogate(&weights, &mut grad).unwrap();
        assert_eq!(surrogate, supervisor.predict(&weights).unwrap());
        assert_eq!(critic.supervisor_id(), SupervisorId(2));
    }
}
