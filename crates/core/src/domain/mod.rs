//! Core data model: [`Job`], [`Chunk`], [`TranscriptionSegment`] and their
//! status enums. A strict tree — job owns chunks, chunks own segments — with
//! no cycles, so serialize/deserialize is direct.

mod chunk;
mod job;

pub use chunk::{Chunk, ChunkStatus, TranscriptionSegment};
pub use job::{Job, JobStatus};
