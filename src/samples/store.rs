use std::{
    fs::{File, OpenOptions},
    io::{BufRead, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};

use super::Sample;
use crate::error::PersistenceErr;

/// The append side of the sample pool, used by students.
pub trait SampleWriter {
    /// Durably records a sample. A sample is never silently dropped.
    fn append(&mut self, sample: &Sample) -> Result<(), PersistenceErr>;
}

/// The read side of the sample pool, used by the supervisor.
pub trait SampleSource {
    /// Returns every sample recorded so far, in append order.
    fn snapshot(&self) -> Result<Vec<Sample>, PersistenceErr>;
}

/// A sample pool students append to and the supervisor reads from.
pub trait SampleStore: SampleWriter + SampleSource {}

impl<S: SampleWriter + SampleSource + ?Sized> SampleStore for S {}

/// Keeps every sample in memory.
#[derive(Debug, Default, Clone)]
pub struct MemorySampleStore {
    samples: Vec<Sample>,
}

impl MemorySampleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }
}

impl SampleWriter for MemorySampleStore {
    fn append(&mut self, sample: &Sample) -> Result<(), PersistenceErr> {
        self.samples.push(sample.clone());
        Ok(())
    }
}

impl SampleSource for MemorySampleStore {
    fn snapshot(&self) -> Result<Vec<Sample>, PersistenceErr> {
        Ok(self.samples.clone())
    }
}

/// An append-only JSON Lines file, one sample per line.
#[derive(Debug)]
pub struct JsonlSampleStore {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlSampleStore {
    /// Creates the file at `path`, truncating any previous content.
    pub fn create(path: impl AsRef<Path>) -> Result<Self, PersistenceErr> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)
            .map_err(|source| PersistenceErr::Io {
                path: path.clone(),
                source,
            })?;

        Ok(Self {
            path,
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> PersistenceErr {
        PersistenceErr::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl SampleWriter for JsonlSampleStore {
    fn append(&mut self, sample: &Sample) -> Result<(), PersistenceErr> {
        let line = serde_json::to_string(sample).map_err(PersistenceErr::Encode)?;

        writeln!(self.writer, "{line}").map_err(|e| self.io_err(e))?;
        self.writer.flush().map_err(|e| self.io_err(e))
    }
}

impl SampleSource for JsonlSampleStore {
    fn snapshot(&self) -> Result<Vec<Sample>, PersistenceErr> {
        let file = File::open(&self.path).map_err(|e| self.io_err(e))?;
        let mut samples = Vec::new();

        for (i, line) in BufReader::new(file).lines().enumerate() {
            let line = line.map_err(|e| self.io_err(e))?;
            if line.trim().is_empty() {
                continue;
            }

            let sample = serde_json::from_str(&line).map_err(|e| PersistenceErr::Corrupt {
                line: i + 1,
                reason: e.to_string(),
            })?;
            samples.push(sample);
        }

        Ok(samples)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;
    use crate::{
        ids::StudentId,
        samples::{SampleMeta, Tensor},
    };

    fn sample(id: u64, loss: f32) -> Sample {
        Sample {
            weights: vec![Tensor {
                name: "dense_0/kernel".into(),
                shape: vec![1, 2],
                values: vec![0.25, -1.5],
            }],
            valid_loss: loss,
            meta: SampleMeta {
                student_id: StudentId(id),
                epoch: 0,
                step: 0,
                supervised: false,
            },
        }
    }

    #[test]
    fn jsonl_store_reads_back_appended_samples() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonlSampleStore::create(dir.path().join("samples.jsonl")).unwrap();

        store.append(&sample(0, 0.7)).unwrap();
        store.append(&sample(1, 0.4)).unwrap();

        let read = store.snapshot().unwrap();
        assert_eq!(read, vec![sample(0, 0.7), sample(1, 0.4)]);

        let raw = fs::read_to_string(store.path()).unwrap();
        assert_eq!(raw.lines().count(), 2);
    }

    #[test]
    fn jsonl_store_truncates_previous_runs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.jsonl");
        fs::write(&path, "stale\n").unwrap();

        let store = JsonlSampleStore::create(&path).unwrap();
        assert!(store.snapshot().unwrap().is_empty());
    }

    #[test]
    fn corrupt_line_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.jsonl");
        let mut store = JsonlSampleStore::create(&path).unwrap();
        store.append(&sample(0, 0.7)).unwrap();

        let mut raw = fs::read_to_string(&path).unwrap();
        raw.push_str("{not json}\n");
        fs::write(&path, raw).unwrap();

        match store.snapshot() {
            Err(PersistenceErr::Corrupt { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected a corrupt record, got {other:?}"),
        }
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("samples.jsonl");
        let store = JsonlSampleStore::create(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert!(matches!(store.snapshot(), Err(PersistenceErr::Io { .. })));
    }
}
