use log::{debug, error, info};
use machine_learning::{MlErr, metrics::Mean};

use super::LoopPlan;
use crate::{
    data::{Batch, Batches, Split, Splits},
    error::{RebyvalErr, Result},
    trace::TraceSink,
};

/// The losses of a single training step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrainLoss {
    /// The loss against the batch targets.
    pub task: f32,
    /// The critic's term, for units trained against one.
    pub surrogate: Option<f32>,
}

/// The outcome of a single validation pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub epoch: usize,
    pub step: usize,
    /// Mean loss over the pass.
    pub loss: f32,
    /// The unit's metric over the pass only.
    pub metric: f32,
}

/// The trace steps a unit's next run starts at, so series keep growing across runs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TraceSteps {
    pub train: usize,
    pub valid: usize,
    pub test: usize,
    pub runs: usize,
}

/// What a finished run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSummary {
    pub train_steps: usize,
    pub validations: Vec<Validation>,
    pub test_loss: f32,
    pub test_metric: f32,
    /// Where the next run of the same unit continues its trace.
    pub trace_end: TraceSteps,
}

impl RunSummary {
    pub fn last_validation(&self) -> Option<&Validation> {
        self.validations.last()
    }
}

/// Something trained for a fixed amount of epochs and steps, validated along the way and
/// tested at the end. Shared by students and supervisors, the loop itself lives in `run_unit`.
pub trait TrainableUnit {
    /// The prefix of every trace tag and log line of this unit.
    fn name(&self) -> &str;

    fn plan(&self) -> &LoopPlan;

    /// Computes the loss and gradient of a batch and applies an optimizer update.
    fn train_step(&mut self, batch: &Batch) -> std::result::Result<TrainLoss, MlErr>;

    /// Computes the loss of a batch and accumulates it into the metric, without updating.
    fn valid_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr>;

    fn reset_metrics(&mut self);

    fn metric(&self) -> f32;

    fn test_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
        self.valid_step(batch)
    }

    /// Where this run's trace series start.
    fn trace_steps(&self) -> TraceSteps {
        TraceSteps::default()
    }

    /// Called after every validation pass.
    fn on_validation(&mut self, _validation: &Validation) -> Result<()> {
        Ok(())
    }
}

/// Runs the train, validation and test phases of `unit` over `splits`.
///
/// A validation pass runs after every train step whose index within the epoch is a multiple of
/// the unit's `valid_gap`, units declaring no valid steps skip validation. Metrics are reset
/// before each pass.
///
/// # Errors
/// * `DataExhaustion` if a split yields fewer batches than the plan declares.
/// * `StepCompute` if a step fails, after logging it with its context.
/// * Whatever `on_validation` returns.
pub fn run_unit<U>(unit: &mut U, splits: Splits, trace: &mut dyn TraceSink) -> Result<RunSummary>
where
    U: TrainableUnit + ?Sized,
{
    let plan = *unit.plan();
    let name = unit.name().to_string();
    let origin = unit.trace_steps();
    let Splits {
        mut train,
        mut valid,
        mut test,
    } = splits;

    let passes = plan.epochs * plan.valid.passes_per_epoch(plan.train_step);
    let mut validations = Vec::with_capacity(passes);

    for epoch in 0..plan.epochs {
        let mut last_loss = None;

        for step in 0..plan.train_step {
            let batch = train.require(plan.train_batches())?;
            let loss = unit
                .train_step(&batch)
                .map_err(|e| step_failed(&name, Split::Train, epoch, step, e))?;

            let global = origin.train + epoch * plan.train_step + step;
            trace.record(&format!("{name}/train_loss"), loss.task, global);
            if let Some(surrogate) = loss.surrogate {
                trace.record(&format!("{name}/surrogate_loss"), surrogate, global);
            }
            last_loss = Some(loss.task);

            if plan.valid_step > 0 && plan.valid.should_validate(step) {
                let v = validation_pass(unit, &name, &mut valid, &plan, epoch, step)?;

                let index = origin.valid + validations.len();
                trace.record(&format!("{name}/valid_loss"), v.loss, index);
                trace.record(&format!("{name}/valid_metric"), v.metric, index);
                debug!(
                    "{name}: epoch {epoch} step {step} valid_loss {:.5} metric {:.4}",
                    v.loss, v.metric
                );

                unit.on_validation(&v)?;
                validations.push(v);
            }
        }

        if let (Some(train_loss), Some(v)) = (last_loss, validations.last()) {
            info!(
                "{name}: epoch {}/{} train_loss {train_loss:.5} valid_loss {:.5} metric {:.4}",
                epoch + 1,
                plan.epochs,
                v.loss,
                v.metric
            );
        }
    }

    unit.reset_metrics();
    let mut test_loss = Mean::new();
    for step in 0..plan.test_step {
        let batch = test.require(plan.test_batches())?;
        let loss = unit
            .test_step(&batch)
            .map_err(|e| step_failed(&name, Split::Test, plan.epochs, step, e))?;

        trace.record(&format!("{name}/test_loss"), loss, origin.test + step);
        test_loss.add(loss);
    }

    let test_loss = test_loss.result();
    let test_metric = unit.metric();
    trace.record(&format!("{name}/test_metric"), test_metric, origin.runs);
    info!("{name}: test_loss {test_loss:.5} metric {test_metric:.4}");

    let trace_end = TraceSteps {
        train: origin.train + plan.train_batches(),
        valid: origin.valid + validations.len(),
        test: origin.test + plan.test_step,
        runs: origin.runs + 1,
    };

    Ok(RunSummary {
        train_steps: plan.train_batches(),
        validations,
        test_loss,
        test_metric,
        trace_end,
    })
}

fn validation_pass<U>(
    unit: &mut U,
    name: &str,
    valid: &mut Batches,
    plan: &LoopPlan,
    epoch: usize,
    step: usize,
) -> Result<Validation>
where
    U: TrainableUnit + ?Sized,
{
    unit.reset_metrics();
    let mut loss = Mean::new();

    for _ in 0..plan.valid_step {
        let batch = valid.require(plan.valid_batches())?;
        let l = unit
            .valid_step(&batch)
            .map_err(|e| step_failed(name, Split::Valid, epoch, step, e))?;
        loss.add(l);
    }

    Ok(Validation {
        epoch,
        step,
        loss: loss.result(),
        metric: unit.metric(),
    })
}

fn step_failed(unit: &str, split: Split, epoch: usize, step: usize, source: MlErr) -> RebyvalErr {
    error!("{unit}: {split} step error at epoch {epoch} step {step}: {source}");

    RebyvalErr::StepCompute {
        unit: unit.to_string(),
        split,
        epoch,
        step,
        source,
    }
}

#[cfg(test)]
mod tests {
    use std::num::NonZeroUsize;

    use ndarray::{Array2, array};

    use super::*;
    use crate::{trace::MemoryTrace, training::ValidSchedule};

    /// Counts calls and fails on a chosen train step.
    struct Probe {
        plan: LoopPlan,
        train_calls: usize,
        valid_calls: usize,
        test_calls: usize,
        resets: usize,
        window: Vec<f32>,
        fail_at: Option<usize>,
        seen: Vec<Validation>,
        origin: TraceSteps,
    }

    impl Probe {
        fn new(plan: LoopPlan) -> Self {
            Self {
                plan,
                train_calls: 0,
                valid_calls: 0,
                test_calls: 0,
                resets: 0,
                window: Vec::new(),
                fail_at: None,
                seen: Vec::new(),
                origin: TraceSteps::default(),
            }
        }
    }

    impl TrainableUnit for Probe {
        fn name(&self) -> &str {
            "probe"
        }

        fn plan(&self) -> &LoopPlan {
            &self.plan
        }

        fn train_step(&mut self, _: &Batch) -> std::result::Result<TrainLoss, MlErr> {
            if self.fail_at == Some(self.train_calls) {
                return Err(MlErr::NonFinite { what: "loss" });
            }

            self.train_calls += 1;
            Ok(TrainLoss {
                task: 1.0,
                surrogate: None,
            })
        }

        fn valid_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
            self.valid_calls += 1;
            let value = batch.x[[0, 0]];
            self.window.push(value);
            Ok(value)
        }

        fn test_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
            self.test_calls += 1;
            self.window.push(batch.x[[0, 0]]);
            Ok(batch.x[[0, 0]])
        }

        fn reset_metrics(&mut self) {
            self.resets += 1;
            self.window.clear();
        }

        fn metric(&self) -> f32 {
            self.window.len() as f32
        }

        fn trace_steps(&self) -> TraceSteps {
            self.origin
        }

        fn on_validation(&mut self, v: &Validation) -> Result<()> {
            self.seen.push(*v);
            Ok(())
        }
    }

    fn plan(epochs: usize, train_step: usize, valid_step: usize, gap: usize) -> LoopPlan {
        LoopPlan {
            epochs,
            train_step,
            valid_step,
            test_step: 1,
            valid: ValidSchedule::new(NonZeroUsize::new(gap).unwrap()),
        }
    }

    fn batches(split: Split, values: impl IntoIterator<Item = f32>) -> Batches {
        let batches = values
            .into_iter()
            .map(|v| Batch {
                x: array![[v]],
                y: Array2::zeros((1, 1)),
            })
            .collect();

        Batches::from_vec(split, batches)
    }

    fn splits(train: usize, valid: impl IntoIterator<Item = f32>, test: usize) -> Splits {
        Splits {
            train: batches(Split::Train, (0..train).map(|i| i as f32)),
            valid: batches(Split::Valid, valid),
            test: batches(Split::Test, (0..test).map(|i| i as f32)),
        }
    }

    #[test]
    fn runs_every_phase_in_order() {
        let mut unit = Probe::new(plan(2, 4, 2, 2));
        let mut trace = MemoryTrace::new();

        let summary = run_unit(
            &mut unit,
            splits(8, (0..8).map(|i| i as f32), 1),
            &mut trace,
        )
        .unwrap();

        assert_eq!(unit.train_calls, 8);
        assert_eq!(unit.valid_calls, 8);
        assert_eq!(unit.test_calls, 1);
        assert_eq!(summary.validations.len(), 4);
        assert_eq!(unit.seen, summary.validations);
        assert_eq!(
            summary
                .validations
                .iter()
                .map(|v| (v.epoch, v.step))
                .collect::<Vec<_>>(),
            vec![(0, 0), (0, 2), (1, 0), (1, 2)]
        );
        assert_eq!(trace.values("probe/train_loss").len(), 8);
        assert_eq!(trace.values("probe/test_loss").len(), 1);
        assert_eq!(summary.test_metric, 1.0);
    }

    #[test]
    fn trace_continues_from_the_unit_origin() {
        let mut unit = Probe::new(plan(1, 2, 1, 1));
        let mut trace = MemoryTrace::new();

        let first = run_unit(&mut unit, splits(2, [0.0, 1.0], 1), &mut trace).unwrap();
        assert_eq!(
            first.trace_end,
            TraceSteps {
                train: 2,
                valid: 2,
                test: 1,
                runs: 1
            }
        );

        unit.origin = first.trace_end;
        let second = run_unit(&mut unit, splits(2, [0.0, 1.0], 1), &mut trace).unwrap();
        assert_eq!(second.trace_end.train, 4);

        let steps = |tag: &str| {
            trace
                .records()
                .iter()
                .filter(|r| r.tag == tag)
                .map(|r| r.step)
                .collect::<Vec<_>>()
        };
        assert_eq!(steps("probe/train_loss"), vec![0, 1, 2, 3]);
        assert_eq!(steps("probe/valid_loss"), vec![0, 1, 2, 3]);
        assert_eq!(steps("probe/test_loss"), vec![0, 1]);
        assert_eq!(steps("probe/test_metric"), vec![0, 1]);
    }

    #[test]
    fn validation_metrics_are_windowed() {
        let mut unit = Probe::new(plan(1, 2, 3, 1));

        let summary = run_unit(
            &mut unit,
            splits(2, [1.0, 2.0, 3.0, 10.0, 20.0, 30.0], 1),
            &mut MemoryTrace::new(),
        )
        .unwrap();

        let v = &summary.validations;
        assert_eq!(v[0].loss, 2.0);
        assert_eq!(v[0].metric, 3.0);
        assert_eq!(v[1].loss, 20.0);
        assert_eq!(v[1].metric, 3.0);
        // one reset per validation pass plus the test phase
        assert_eq!(unit.resets, 3);
    }

    #[test]
    fn short_train_sequence_is_data_exhaustion() {
        let mut unit = Probe::new(plan(1, 5, 1, 5));

        let res = run_unit(&mut unit, splits(3, [0.0], 1), &mut MemoryTrace::new());

        match res {
            Err(RebyvalErr::DataExhaustion {
                split,
                served,
                declared,
            }) => {
                assert_eq!(split, Split::Train);
                assert_eq!(served, 3);
                assert_eq!(declared, 5);
            }
            other => panic!("expected DataExhaustion, got {other:?}"),
        }
        assert_eq!(unit.train_calls, 3);
    }

    #[test]
    fn short_valid_sequence_is_data_exhaustion() {
        let mut unit = Probe::new(plan(1, 4, 2, 2));

        let res = run_unit(&mut unit, splits(4, [0.0, 1.0, 2.0], 1), &mut MemoryTrace::new());
        assert!(matches!(
            res,
            Err(RebyvalErr::DataExhaustion {
                split: Split::Valid,
                served: 3,
                declared: 4,
            })
        ));
    }

    #[test]
    fn failing_step_is_step_compute_with_context() {
        let mut unit = Probe::new(plan(2, 3, 1, 3));
        unit.fail_at = Some(4);

        let res = run_unit(
            &mut unit,
            splits(6, (0..2).map(|i| i as f32), 1),
            &mut MemoryTrace::new(),
        );

        match res {
            Err(RebyvalErr::StepCompute {
                unit, epoch, step, ..
            }) => {
                assert_eq!(unit, "probe");
                assert_eq!((epoch, step), (1, 1));
            }
            other => panic!("expected StepCompute, got {other:?}"),
        }
    }
}
