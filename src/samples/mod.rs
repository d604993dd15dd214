mod sample;
mod store;

pub use sample::{Sample, SampleMeta, Tensor};
pub use store::{JsonlSampleStore, MemorySampleStore, SampleSource, SampleStore, SampleWriter};
