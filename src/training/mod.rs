mod critic;
mod schedule;
mod student;
mod supervisor;
mod unit;

pub use critic::Critic;
pub use schedule::{LoopPlan, ValidSchedule};
pub use student::{Student, StudentHandle};
pub use supervisor::{Supervisor, SupervisorReport};
pub use unit::{RunSummary, TraceSteps, TrainLoss, TrainableUnit, Validation, run_unit};
