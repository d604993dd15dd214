use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use super::{
    LossFnConfig, ModelConfig, OptimizerConfig, StudentDataConfig, SupervisorDataConfig, ensure,
};
use crate::error::{RebyvalErr, Result};

/// The parsed experiment document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExperimentConfig {
    pub experiment: Experiment,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Experiment {
    pub context: ContextConfig,
    pub student: StudentConfig,
    pub supervisor: SupervisorConfig,
    pub main_loop: MainLoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ContextConfig {
    pub name: String,
    pub log_path: PathBuf,
    #[serde(default)]
    pub seed: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StudentConfig {
    pub dataloader: StudentDataConfig,
    pub model: ModelConfig,
    #[serde(default = "default_student_optimizer")]
    pub optimizer: OptimizerConfig,
    #[serde(default = "default_student_loss")]
    pub loss: LossFnConfig,
    pub train_loop: TrainLoopConfig,
    #[serde(default)]
    pub surrogate: SurrogateConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    pub dataloader: SupervisorDataConfig,
    pub model: ModelConfig,
    #[serde(default = "default_supervisor_optimizer")]
    pub optimizer: OptimizerConfig,
    #[serde(default = "default_supervisor_loss")]
    pub loss: LossFnConfig,
    pub train_loop: TrainLoopConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TrainLoopConfig {
    pub valid: ValidConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ValidConfig {
    /// A validation pass runs every `valid_gap` train steps.
    pub valid_gap: usize,
}

/// Scales the supervisor's term in a supervised student's loss.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SurrogateConfig {
    #[serde(default = "default_surrogate_weight")]
    pub weight: f32,
}

impl Default for SurrogateConfig {
    fn default() -> Self {
        Self {
            weight: default_surrogate_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MainLoopConfig {
    #[serde(default)]
    pub warmup: Option<WarmupConfig>,
    pub nums: usize,
    pub student_nums: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WarmupConfig {
    pub student_nums: usize,
    pub supervisor_trains: usize,
}

fn default_student_optimizer() -> OptimizerConfig {
    OptimizerConfig::GradientDescent {
        learning_rate: 0.1,
    }
}

fn default_student_loss() -> LossFnConfig {
    LossFnConfig::CrossEntropy
}

fn default_supervisor_optimizer() -> OptimizerConfig {
    OptimizerConfig::Adam {
        learning_rate: 1e-3,
        beta1: 0.9,
        beta2: 0.999,
        epsilon: 1e-7,
    }
}

fn default_supervisor_loss() -> LossFnConfig {
    LossFnConfig::Mse
}

fn default_surrogate_weight() -> f32 {
    1.0
}

impl ExperimentConfig {
    /// Reads, parses and validates an experiment document.
    ///
    /// # Errors
    /// Returns `RebyvalErr::Config` if the file can't be read, is not a valid experiment
    /// document or holds out of range values.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .map_err(|e| RebyvalErr::Config(format!("cannot read '{}': {e}", path.display())))?;

        Self::from_json_str(&content).map_err(|e| match e {
            RebyvalErr::Config(msg) => RebyvalErr::Config(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    /// Parses and validates an experiment document.
    pub fn from_json_str(content: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(content)
            .map_err(|e| RebyvalErr::Config(format!("invalid experiment document: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Parses and validates an already decoded experiment document.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value)
            .map_err(|e| RebyvalErr::Config(format!("invalid experiment document: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// The directory this experiment writes its samples, trace and resolved config to.
    pub fn run_dir(&self) -> PathBuf {
        let context = &self.experiment.context;
        context.log_path.join(&context.name)
    }

    /// Checks every range and cross-field constraint.
    pub fn validate(&self) -> Result<()> {
        let Experiment {
            context,
            student,
            supervisor,
            main_loop,
        } = &self.experiment;

        ensure(!context.name.trim().is_empty(), || {
            "context.name must not be empty".into()
        })?;

        student.dataloader.validate()?;
        student.model.validate("student")?;
        student.optimizer.validate("student")?;
        ensure(student.train_loop.valid.valid_gap > 0, || {
            "student valid_gap must be > 0".into()
        })?;
        ensure(
            student.surrogate.weight.is_finite() && student.surrogate.weight >= 0.0,
            || {
                format!(
                    "surrogate weight must be a non negative number, got {}",
                    student.surrogate.weight
                )
            },
        )?;

        supervisor.dataloader.validate()?;
        supervisor.model.validate("supervisor")?;
        supervisor.optimizer.validate("supervisor")?;
        ensure(supervisor.train_loop.valid.valid_gap > 0, || {
            "supervisor valid_gap must be > 0".into()
        })?;
        ensure(!matches!(supervisor.loss, LossFnConfig::CrossEntropy), || {
            "supervisor loss must be a regression loss (mse or mae)".into()
        })?;

        main_loop.validate()
    }
}

impl MainLoopConfig {
    fn validate(&self) -> Result<()> {
        if let Some(warmup) = &self.warmup {
            ensure(warmup.supervisor_trains == 0 || warmup.student_nums > 0, || {
                "warmup.supervisor_trains needs warmup.student_nums > 0 to have samples".into()
            })?;
        }

        let builds_supervised_students = self.nums > 0 && self.student_nums > 0;
        let supervisor_warmed_up = self
            .warmup
            .as_ref()
            .is_some_and(|w| w.supervisor_trains > 0);

        ensure(!builds_supervised_students || supervisor_warmed_up, || {
            "main_loop builds supervised students, a warmup with supervisor_trains >= 1 is required"
                .into()
        })
    }
}
