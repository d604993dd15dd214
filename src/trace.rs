use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use log::warn;
use serde::{Deserialize, Serialize};

/// A scalar observation keyed by step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub tag: String,
    pub value: f32,
    pub step: usize,
}

/// Receives loss and metric series for external observability.
pub trait TraceSink {
    fn write_scalar(&mut self, tag: &str, value: f32, step: usize) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    /// Writes a scalar, a failure only being logged.
    fn record(&mut self, tag: &str, value: f32, step: usize) {
        if let Err(e) = self.write_scalar(tag, value, step) {
            warn!("dropping trace record {tag}@{step}: {e}");
        }
    }
}

/// Discards every record.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullTrace;

impl TraceSink for NullTrace {
    fn write_scalar(&mut self, _: &str, _: f32, _: usize) -> io::Result<()> {
        Ok(())
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default, Clone)]
pub struct MemoryTrace {
    records: Vec<TraceRecord>,
}

impl MemoryTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> &[TraceRecord] {
        &self.records
    }

    /// Returns the values recorded under `tag`, in order.
    pub fn values(&self, tag: &str) -> Vec<f32> {
        self.records
            .iter()
            .filter(|r| r.tag == tag)
            .map(|r| r.value)
            .collect()
    }
}

impl TraceSink for MemoryTrace {
    fn write_scalar(&mut self, tag: &str, value: f32, step: usize) -> io::Result<()> {
        self.records.push(TraceRecord {
            tag: tag.to_string(),
            value,
            step,
        });

        Ok(())
    }
}

/// Writes one JSON object per line.
#[derive(Debug)]
pub struct JsonlTrace {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl JsonlTrace {
    pub fn create(path: impl AsRef<Path>) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let writer = BufWriter::new(File::create(&path)?);
        Ok(Self { path, writer })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl TraceSink for JsonlTrace {
    fn write_scalar(&mut self, tag: &str, value: f32, step: usize) -> io::Result<()> {
        let record = TraceRecord {
            tag: tag.to_string(),
            value,
            step,
        };

        serde_json::to_writer(&mut self.writer, &record)?;
        self.writer.write_all(b"\n")
    }

    fn flush(&mut self) -> io::Result<()> {
        self.writer.flush()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    #[test]
    fn memory_trace_filters_by_tag() {
        let mut trace = MemoryTrace::new();
        trace.record("student-0/train_loss", 1.0, 0);
        trace.record("student-0/valid_loss", 0.5, 0);
        trace.record("student-0/train_loss", 0.8, 1);

        assert_eq!(trace.values("student-0/train_loss"), vec![1.0, 0.8]);
        assert_eq!(trace.records().len(), 3);
    }

    #[test]
    fn jsonl_trace_writes_one_record_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let mut trace = JsonlTrace::create(dir.path().join("trace.jsonl")).unwrap();

        trace.record("supervisor-0/train_loss", 0.25, 3);
        trace.record("supervisor-0/valid_loss", 0.5, 0);
        trace.flush().unwrap();

        let raw = fs::read_to_string(trace.path()).unwrap();
        let records: Vec<TraceRecord> = raw
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].tag, "supervisor-0/train_loss");
        assert_eq!(records[0].step, 3);
    }
}
