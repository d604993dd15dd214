use std::num::NonZeroUsize;

use log::info;
use machine_learning::{
    MlErr,
    arch::{Model, ParamSlot, Sequential, loss::LossFn},
    metrics::{Accuracy, Metric},
    optimization::Optimizer,
};
use rand::{SeedableRng, rngs::StdRng};

use super::{Critic, LoopPlan, TrainLoss, TrainableUnit, Validation, run_unit};
use crate::{
    config::StudentConfig,
    data::{Batch, Splits},
    error::{RebyvalErr, Result},
    ids::StudentId,
    samples::{Sample, SampleMeta, SampleWriter},
    trace::TraceSink,
};

/// What the controller keeps of a finished student.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudentHandle {
    pub id: StudentId,
    /// The amount of samples the student appended to the pool.
    pub samples: usize,
    pub supervised: bool,
    pub valid_loss: Option<f32>,
    pub test_loss: f32,
}

/// Trains a model on the task data, appending a sample after every validation pass.
///
/// With a critic attached the training objective becomes `task + weight * critic(params)`.
pub struct Student<'w, W: SampleWriter + ?Sized> {
    id: StudentId,
    name: String,
    plan: LoopPlan,

    model: Sequential,
    layout: Vec<ParamSlot>,
    params: Vec<f32>,
    grad: Vec<f32>,
    surrogate_grad: Vec<f32>,
    optimizer: Box<dyn Optimizer>,
    loss_fn: Box<dyn LossFn>,
    accuracy: Accuracy,

    critic: Option<Critic>,
    surrogate_weight: f32,

    writer: &'w mut W,
    emitted: usize,
}

impl<'w, W: SampleWriter + ?Sized> Student<'w, W> {
    /// Creates a new `Student`.
    ///
    /// # Arguments
    /// * `id` - The student's run-wide id.
    /// * `cfg` - The student section of the experiment.
    /// * `dims` - The (input, output) widths of the task data.
    /// * `critic` - A frozen supervisor to train against, if any.
    /// * `writer` - Where the student's samples go.
    /// * `seed` - Seeds the parameter initialization.
    ///
    /// # Errors
    /// `RebyvalErr::Config` if the critic doesn't score this student's weights or the
    /// initialization is invalid.
    pub fn new(
        id: StudentId,
        cfg: &StudentConfig,
        dims: (usize, usize),
        critic: Option<Critic>,
        writer: &'w mut W,
        seed: u64,
    ) -> Result<Self> {
        let valid_gap = NonZeroUsize::new(cfg.train_loop.valid.valid_gap)
            .ok_or_else(|| RebyvalErr::Config("student valid_gap must be > 0".into()))?;

        let model = cfg.model.build(dims.0, dims.1);
        let mut rng = StdRng::seed_from_u64(seed);
        let params = model
            .init_params(cfg.model.init.resolve(), &mut rng)
            .map_err(|e| RebyvalErr::Config(format!("student init: {e}")))?;

        if let Some(critic) = &critic {
            if critic.input_size() != params.len() {
                return Err(RebyvalErr::Config(format!(
                    "{} scores {} weights but {id} has {}",
                    critic.supervisor_id(),
                    critic.input_size(),
                    params.len()
                )));
            }
        }

        let size = params.len();
        Ok(Self {
            id,
            name: id.to_string(),
            plan: LoopPlan::from_student(&cfg.dataloader, valid_gap),
            layout: model.layout(),
            model,
            params,
            grad: vec![0.0; size],
            surrogate_grad: vec![0.0; size],
            optimizer: cfg.optimizer.build(size),
            loss_fn: cfg.loss.build(),
            accuracy: Accuracy::new(),
            critic,
            surrogate_weight: cfg.surrogate.weight,
            writer,
            emitted: 0,
        })
    }

    pub fn id(&self) -> StudentId {
        self.id
    }

    pub fn params(&self) -> &[f32] {
        &self.params
    }

    /// The gradient of the last computed step.
    pub fn gradient(&self) -> &[f32] {
        &self.grad
    }

    pub fn is_supervised(&self) -> bool {
        self.critic.is_some()
    }

    /// Computes the objective's gradient for `batch` without updating the parameters.
    ///
    /// A plain step only differentiates the task loss. A supervised step adds the critic's
    /// gradient, scaled by the surrogate weight, while the critic stays frozen.
    pub fn compute_gradient(&mut self, batch: &Batch) -> std::result::Result<TrainLoss, MlErr> {
        let task = self.model.backprop(
            &self.params,
            &mut self.grad,
            &self.loss_fn,
            batch.x.view(),
            batch.y.view(),
        )?;

        let Some(critic) = self.critic.as_mut() else {
            return Ok(TrainLoss {
                task,
                surrogate: None,
            });
        };

        let surrogate = critic.surrogate(&self.params, &mut self.surrogate_grad)?;
        for (g, s) in self.grad.iter_mut().zip(&self.surrogate_grad) {
            *g += self.surrogate_weight * s;
        }

        Ok(TrainLoss {
            task,
            surrogate: Some(surrogate),
        })
    }

    /// Trains, validates and tests the student, consuming it.
    ///
    /// # Returns
    /// A handle naming the samples this student appended.
    pub fn run(mut self, splits: Splits, trace: &mut dyn TraceSink) -> Result<StudentHandle> {
        let summary = run_unit(&mut self, splits, trace)?;

        info!(
            "{}: finished, {} samples written{}",
            self.name,
            self.emitted,
            match &self.critic {
                Some(critic) => format!(" against {}", critic.supervisor_id()),
                None => String::new(),
            }
        );

        Ok(StudentHandle {
            id: self.id,
            samples: self.emitted,
            supervised: self.is_supervised(),
            valid_loss: summary.last_validation().map(|v| v.loss),
            test_loss: summary.test_loss,
        })
    }

    fn evaluate(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
        let y_pred = self.model.forward(&self.params, batch.x.view())?;
        if y_pred.dim() != batch.y.dim() {
            return Err(MlErr::SizeMismatch {
                what: "targets",
                got: batch.y.len(),
                expected: y_pred.len(),
            });
        }

        let loss = self.loss_fn.loss(y_pred.view(), batch.y.view());
        if !loss.is_finite() {
            return Err(MlErr::NonFinite { what: "loss" });
        }

        self.accuracy.update(y_pred.view(), batch.y.view());
        Ok(loss)
    }
}

impl<W: SampleWriter + ?Sized> TrainableUnit for Student<'_, W> {
    fn name(&self) -> &str {
        &self.name
    }

    fn plan(&self) -> &LoopPlan {
        &self.plan
    }

    fn train_step(&mut self, batch: &Batch) -> std::result::Result<TrainLoss, MlErr> {
        let loss = self.compute_gradient(batch)?;
        self.optimizer.update_params(&mut self.params, &self.grad)?;
        Ok(loss)
    }

    fn valid_step(&mut self, batch: &Batch) -> std::result::Result<f32, MlErr> {
        self.evaluate(batch)
    }

    fn reset_metrics(&mut self) {
        self.accuracy.reset();
    }

    fn metric(&self) -> f32 {
        self.accuracy.result()
    }

    fn on_validation(&mut self, v: &Validation) -> Result<()> {
        let meta = SampleMeta {
            student_id: self.id,
            epoch: v.epoch,
            step: v.step,
            supervised: self.critic.is_some(),
        };

        let sample = Sample::from_params(&self.layout, &self.params, v.loss, meta);
        self.writer.append(&sample)?;
        self.emitted += 1;

        Ok(())
    }
}
