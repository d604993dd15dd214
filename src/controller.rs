use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use log::{info, warn};
use machine_learning::arch::Model;

use crate::{
    config::ExperimentConfig,
    data::TaskData,
    error::{PersistenceErr, RebyvalErr, Result},
    ids::{IdCounter, StudentId, SupervisorId},
    samples::{JsonlSampleStore, Sample, SampleStore},
    trace::{JsonlTrace, TraceSink},
    training::{LoopPlan, Student, StudentHandle, Supervisor},
};

const SAMPLES_FILE: &str = "samples.jsonl";
const TRACE_FILE: &str = "trace.jsonl";
const CONFIG_FILE: &str = "config.json";

/// Where the controller is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Warmup: students train without a critic, then the supervisor bootstraps.
    Init,
    /// Main loop: students train against the supervisor, which then retrains.
    Steady { iteration: usize },
    Done,
}

/// Something the controller did, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum ControllerEvent {
    StudentBuilt {
        id: StudentId,
        supervised: bool,
        phase: Phase,
    },
    StudentFinished {
        handle: StudentHandle,
    },
    SupervisorTrained {
        id: SupervisorId,
        keep_train: bool,
        corpus: usize,
        new_students: Vec<StudentId>,
    },
}

/// What a completed run reports.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    pub students: u64,
    pub supervisor_trains: usize,
    pub samples: usize,
    pub elapsed: Duration,
}

/// Sequences the students and the supervisor of an experiment.
pub struct Controller {
    config: ExperimentConfig,
    run_dir: Option<PathBuf>,
    data: TaskData,

    student_ids: IdCounter<StudentId>,
    supervisor_ids: IdCounter<SupervisorId>,
    supervisor: Supervisor,

    store: Box<dyn SampleStore>,
    trace: Box<dyn TraceSink>,

    phase: Phase,
    history: Vec<ControllerEvent>,
    supervisor_trains: usize,
    samples: usize,
}

impl Controller {
    /// Creates the run directory and a controller writing its samples and trace there.
    ///
    /// # Errors
    /// Returns an error if the config is invalid or the run directory can't be written.
    pub fn new(config: ExperimentConfig) -> Result<Self> {
        config.validate()?;

        let run_dir = config.run_dir();
        fs::create_dir_all(&run_dir)?;
        write_config(&config, &run_dir.join(CONFIG_FILE))?;

        let store = JsonlSampleStore::create(run_dir.join(SAMPLES_FILE))?;
        let trace = JsonlTrace::create(run_dir.join(TRACE_FILE))?;
        info!("writing run artifacts to {}", run_dir.display());

        let mut controller = Self::with_backends(config, Box::new(store), Box::new(trace))?;
        controller.run_dir = Some(run_dir);
        Ok(controller)
    }

    /// Creates a controller over the given sample pool and trace sink, touching no files.
    pub fn with_backends(
        config: ExperimentConfig,
        store: Box<dyn SampleStore>,
        trace: Box<dyn TraceSink>,
    ) -> Result<Self> {
        config.validate()?;

        let experiment = &config.experiment;
        let seed = experiment.context.seed;
        let data = TaskData::from_config(&experiment.student.dataloader.dataset, seed)?;

        let (input, output) = data.dims();
        let student_size = experiment.student.model.build(input, output).size();

        let mut supervisor_ids = IdCounter::new();
        let supervisor_id: SupervisorId = supervisor_ids.next_id();
        let supervisor = Supervisor::new(
            supervisor_id,
            experiment.supervisor.clone(),
            student_size,
            derive_seed(seed, Stream::Supervisor, supervisor_id.0),
        )?;

        Ok(Self {
            config,
            run_dir: None,
            data,
            student_ids: IdCounter::new(),
            supervisor_ids,
            supervisor,
            store,
            trace,
            phase: Phase::Init,
            history: Vec::new(),
            supervisor_trains: 0,
            samples: 0,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn history(&self) -> &[ControllerEvent] {
        &self.history
    }

    pub fn supervisor(&self) -> &Supervisor {
        &self.supervisor
    }

    pub fn run_dir(&self) -> Option<&Path> {
        self.run_dir.as_deref()
    }

    /// Returns how many supervisors were built so far.
    pub fn supervisors_built(&self) -> u64 {
        self.supervisor_ids.issued()
    }

    /// Reads back every sample of the pool.
    pub fn samples(&self) -> Result<Vec<Sample>> {
        Ok(self.store.snapshot()?)
    }

    /// Runs the warmup and the main loop to completion.
    pub fn run(&mut self) -> Result<RunOutcome> {
        let start = Instant::now();
        let name = self.config.experiment.context.name.clone();
        info!("starting experiment {name}");

        self.warmup()?;
        self.main_loop()?;
        self.phase = Phase::Done;

        if let Err(e) = self.trace.flush() {
            warn!("failed to flush the trace: {e}");
        }

        let outcome = RunOutcome {
            students: self.student_ids.issued(),
            supervisor_trains: self.supervisor_trains,
            samples: self.samples,
            elapsed: start.elapsed(),
        };

        info!(
            "experiment {name} done: {} students, {} supervisor trainings, {} samples in {:.2?}",
            outcome.students, outcome.supervisor_trains, outcome.samples, outcome.elapsed
        );

        Ok(outcome)
    }

    /// Trains the critic-less students, then bootstraps the supervisor on their samples.
    pub fn warmup(&mut self) -> Result<()> {
        self.phase = Phase::Init;
        let Some(warmup) = self.config.experiment.main_loop.warmup.clone() else {
            info!("no warmup configured");
            return Ok(());
        };

        info!(
            "warmup: {} students, {} supervisor trainings",
            warmup.student_nums, warmup.supervisor_trains
        );

        for _ in 0..warmup.student_nums {
            self.train_student(false)?;
        }

        for i in 0..warmup.supervisor_trains {
            self.train_supervisor(i > 0, &[])?;
        }

        Ok(())
    }

    /// Runs the configured iterations of supervised students followed by a supervisor update.
    pub fn main_loop(&mut self) -> Result<()> {
        let main_loop = self.config.experiment.main_loop.clone();

        for iteration in 0..main_loop.nums {
            self.phase = Phase::Steady { iteration };
            info!("main loop iteration {}/{}", iteration + 1, main_loop.nums);

            let mut handles = Vec::with_capacity(main_loop.student_nums);
            for _ in 0..main_loop.student_nums {
                handles.push(self.train_student(true)?);
            }

            self.train_supervisor(true, &handles)?;
        }

        Ok(())
    }

    fn train_student(&mut self, supervised: bool) -> Result<StudentHandle> {
        let id = self.student_ids.next_id();
        let seed = self.config.experiment.context.seed;
        let cfg = &self.config.experiment.student;

        let critic = if supervised {
            Some(self.supervisor.critic()?)
        } else {
            None
        };

        self.history.push(ControllerEvent::StudentBuilt {
            id,
            supervised,
            phase: self.phase,
        });
        info!(
            "built {id}{}",
            if supervised { " with a critic" } else { "" }
        );

        let valid_gap = NonZeroUsize::new(cfg.train_loop.valid.valid_gap)
            .ok_or_else(|| RebyvalErr::Config("student valid_gap must be > 0".into()))?;
        let plan = LoopPlan::from_student(&cfg.dataloader, valid_gap);
        let splits = self.data.splits(
            &cfg.dataloader,
            &plan,
            derive_seed(seed, Stream::StudentData, id.0),
        );

        let student = Student::new(
            id,
            cfg,
            self.data.dims(),
            critic,
            &mut *self.store,
            derive_seed(seed, Stream::StudentInit, id.0),
        )?;
        let handle = student.run(splits, &mut *self.trace)?;

        self.samples += handle.samples;
        self.history.push(ControllerEvent::StudentFinished { handle });
        Ok(handle)
    }

    fn train_supervisor(
        &mut self,
        keep_train: bool,
        new_students: &[StudentHandle],
    ) -> Result<()> {
        let report = self.supervisor.run(
            keep_train,
            new_students,
            &*self.store,
            &mut *self.trace,
        )?;

        self.supervisor_trains += 1;
        self.history.push(ControllerEvent::SupervisorTrained {
            id: report.id,
            keep_train,
            corpus: report.corpus,
            new_students: report.new_students,
        });

        Ok(())
    }
}

/// Independent seed streams derived from the experiment seed.
#[derive(Debug, Clone, Copy)]
enum Stream {
    StudentInit = 1,
    StudentData = 2,
    Supervisor = 3,
}

/// Mixes the experiment seed with a stream and an index (splitmix64 finalizer).
fn derive_seed(seed: u64, stream: Stream, index: u64) -> u64 {
    let mut z = seed
        .wrapping_add((stream as u64) << 32)
        .wrapping_add(index)
        .wrapping_add(0x9e37_79b9_7f4a_7c15);

    z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
    z ^ (z >> 31)
}

fn write_config(config: &ExperimentConfig, path: &Path) -> Result<()> {
    let content = serde_json::to_string_pretty(config)
        .map_err(|e| RebyvalErr::Persistence(PersistenceErr::Encode(e)))?;
    fs::write(path, content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seed_streams_differ() {
        let a = derive_seed(0, Stream::StudentInit, 0);
        let b = derive_seed(0, Stream::StudentData, 0);
        let c = derive_seed(0, Stream::StudentInit, 1);

        assert_ne!(a, b);
        assert_ne!(a, c);
        assert_eq!(a, derive_seed(0, Stream::StudentInit, 0));
    }
}
