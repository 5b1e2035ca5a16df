use chrono::{DateTime, Utc};
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl ChunkStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Processing => "processing",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => ChunkStatus::Pending,
            "processing" => ChunkStatus::Processing,
            "completed" => ChunkStatus::Completed,
            "failed" => ChunkStatus::Failed,
            _ => return None,
        })
    }
}

/// A timestamped span of transcribed text, in original-audio time base.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionSegment {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
}

impl TranscriptionSegment {
    pub fn midpoint(&self) -> f64 {
        (self.start + self.end) / 2.0
    }
}

/// A contiguous, overlap-aware audio interval carved from the extracted WAV.
#[derive(Debug, Clone)]
pub struct Chunk {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub overlap_start: f64,
    pub file_path: Option<PathBuf>,
    pub status: ChunkStatus,
    pub text: Option<String>,
    pub segments: Vec<TranscriptionSegment>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl Chunk {
    pub fn new(index: usize, start_time: f64, end_time: f64, overlap_start: f64) -> Self {
        Self {
            index,
            start_time,
            end_time,
            overlap_start,
            file_path: None,
            status: ChunkStatus::Pending,
            text: None,
            segments: Vec::new(),
            completed_at: None,
            error: None,
        }
    }

    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}
