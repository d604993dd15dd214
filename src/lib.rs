pub mod config;
pub mod controller;
pub mod data;
pub mod error;
pub mod ids;
pub mod samples;
pub mod trace;
pub mod training;

pub use controller::{Controller, ControllerEvent, Phase, RunOutcome};
pub use error::{PersistenceErr, RebyvalErr, Result};
pub use ids::{StudentId, SupervisorId};

use std::path::Path;

use config::ExperimentConfig;

/// Loads the experiment at `config_path` and runs it to completion.
///
/// # Errors
/// Returns a `RebyvalErr` if the config is invalid or any phase of the run fails.
pub fn run_experiment(config_path: impl AsRef<Path>) -> Result<RunOutcome> {
    let config = ExperimentConfig::from_path(config_path)?;
    log::info!("loaded experiment {}", config.experiment.context.name);

    let mut controller = Controller::new(config)?;
    controller.run()
}
