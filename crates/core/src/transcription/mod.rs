pub mod model;
pub mod worker;

pub use model::{testing, DeviceProbe, HttpTranscriber, ModelError, ModelOutput, ModelSegment, ResidentDevice, Transcriber};
pub use worker::TranscriptionWorker;
