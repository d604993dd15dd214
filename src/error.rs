use std::{error::Error, fmt, io, path::PathBuf};

use machine_learning::MlErr;

use crate::{
    data::Split,
    ids::{StudentId, SupervisorId},
};

/// The result type used across the crate.
pub type Result<T> = std::result::Result<T, RebyvalErr>;

/// Every failure is fatal for the run, there is no retry policy.
#[derive(Debug)]
pub enum RebyvalErr {
    /// Missing or invalid configuration, caught before any training starts.
    Config(String),
    /// A batch sequence ran out before the declared step count.
    DataExhaustion {
        split: Split,
        served: usize,
        declared: usize,
    },
    /// A forward/backward computation failed (shape mismatch or numeric divergence).
    StepCompute {
        unit: String,
        split: Split,
        epoch: usize,
        step: usize,
        source: MlErr,
    },
    /// A sample could not be written or read back.
    Persistence(PersistenceErr),
    /// A student asked for a critic from a supervisor that never trained.
    UntrainedSupervisor { supervisor_id: SupervisorId },
    Io(io::Error),
}

impl fmt::Display for RebyvalErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "invalid config: {msg}"),
            Self::DataExhaustion {
                split,
                served,
                declared,
            } => write!(
                f,
                "{split} data exhausted after {served} batches, {declared} were declared"
            ),
            Self::StepCompute {
                unit,
                split,
                epoch,
                step,
                source,
            } => write!(
                f,
                "{unit}: {split} step failed at epoch {epoch} step {step}: {source}"
            ),
            Self::Persistence(e) => write!(f, "sample persistence failed: {e}"),
            Self::UntrainedSupervisor { supervisor_id } => {
                write!(f, "{supervisor_id} has not been trained yet")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for RebyvalErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::StepCompute { source, .. } => Some(source),
            Self::Persistence(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RebyvalErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<PersistenceErr> for RebyvalErr {
    fn from(value: PersistenceErr) -> Self {
        Self::Persistence(value)
    }
}

/// Failures of the sample store.
#[derive(Debug)]
pub enum PersistenceErr {
    Io {
        path: PathBuf,
        source: io::Error,
    },
    Encode(serde_json::Error),
    Corrupt {
        line: usize,
        reason: String,
    },
    MissingSamples {
        student_id: StudentId,
        expected: usize,
        found: usize,
    },
    InconsistentWeights {
        student_id: StudentId,
        got: usize,
        expected: usize,
    },
}

impl fmt::Display for PersistenceErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Encode(e) => write!(f, "failed to encode sample: {e}"),
            Self::Corrupt { line, reason } => write!(f, "corrupt record at line {line}: {reason}"),
            Self::MissingSamples {
                student_id,
                expected,
                found,
            } => write!(
                f,
                "{student_id} reported {expected} samples but the store holds {found}"
            ),
            Self::InconsistentWeights {
                student_id,
                got,
                expected,
            } => write!(
                f,
                "sample from {student_id} has {got} weights, expected {expected}"
            ),
        }
    }
}

impl Error for PersistenceErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}
