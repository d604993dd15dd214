mod data;
mod experiment;
mod model;

pub use data::{DatasetConfig, StudentDataConfig, SupervisorDataConfig};
pub use experiment::{
    ContextConfig, Experiment, ExperimentConfig, MainLoopConfig, StudentConfig, SupervisorConfig,
    SurrogateConfig, TrainLoopConfig, ValidConfig, WarmupConfig,
};
pub use model::{ActFnConfig, LossFnConfig, ModelConfig, OptimizerConfig, ParamGenConfig};

use crate::error::RebyvalErr;

/// Builds a `RebyvalErr::Config` when `cond` does not hold.
pub(crate) fn ensure(cond: bool, msg: impl FnOnce() -> String) -> Result<(), RebyvalErr> {
    if cond {
        Ok(())
    } else {
        Err(RebyvalErr::Config(msg()))
    }
}
