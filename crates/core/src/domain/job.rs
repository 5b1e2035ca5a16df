use chrono::{DateTime, Utc};
use std::path::PathBuf;

use super::chunk::{Chunk, ChunkStatus, TranscriptionSegment};

/// Ordered job lifecycle. Resume is valid only from the non-bracketing,
/// non-terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum JobStatus {
    Pending,
    Extracting,
    Chunking,
    Transcribing,
    Merging,
    Diarizing,
    Generating,
    Completed,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Extracting => "extracting",
            JobStatus::Chunking => "chunking",
            JobStatus::Transcribing => "transcribing",
            JobStatus::Merging => "merging",
            JobStatus::Diarizing => "diarizing",
            JobStatus::Generating => "generating",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "pending" => JobStatus::Pending,
            "extracting" => JobStatus::Extracting,
            "chunking" => JobStatus::Chunking,
            "transcribing" => JobStatus::Transcribing,
            "merging" => JobStatus::Merging,
            "diarizing" => JobStatus::Diarizing,
            "generating" => JobStatus::Generating,
            "completed" => JobStatus::Completed,
            "failed" => JobStatus::Failed,
            "cancelled" => JobStatus::Cancelled,
            _ => return None,
        })
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Statuses from which the orchestrator can continue without restarting
    /// earlier stages.
    pub fn is_resumable(&self) -> bool {
        matches!(
            self,
            JobStatus::Extracting
                | JobStatus::Chunking
                | JobStatus::Transcribing
                | JobStatus::Merging
                | JobStatus::Generating
        )
    }
}

/// A transcription job: immutable identity plus mutable progress fields,
/// mutated only by the orchestrator.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: String,
    pub video_path: PathBuf,
    pub video_name: String,
    pub created_at: DateTime<Utc>,
    pub duration_seconds: f64,

    pub status: JobStatus,
    pub updated_at: DateTime<Utc>,
    pub error: Option<String>,
    pub audio_path: Option<PathBuf>,
    pub chunks_dir: Option<PathBuf>,
    pub chunks: Vec<Chunk>,
    pub output_path: Option<PathBuf>,
    pub transcription_text: Option<String>,
    pub segments: Vec<TranscriptionSegment>,

    /// The chunk-sizing parameters this job was planned with, fixed at
    /// creation so a resume stays consistent even if the process-wide
    /// configuration changes between runs.
    pub chunk_duration_seconds: u32,
    pub chunk_overlap_seconds: u32,
    pub min_chunk_seconds: u32,
}

impl Job {
    pub fn new(id: String, video_path: PathBuf, duration_seconds: f64) -> Self {
        let now = Utc::now();
        let video_name = video_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            id,
            video_path,
            video_name,
            created_at: now,
            duration_seconds,
            status: JobStatus::Pending,
            updated_at: now,
            error: None,
            audio_path: None,
            chunks_dir: None,
            chunks: Vec::new(),
            output_path: None,
            transcription_text: None,
            segments: Vec::new(),
            chunk_duration_seconds: 300,
            chunk_overlap_seconds: 10,
            min_chunk_seconds: 30,
        }
    }

    /// Fixes the chunk-sizing parameters this job is planned with. Called
    /// once at creation from the process configuration.
    pub fn with_chunk_config(mut self, duration_seconds: u32, overlap_seconds: u32, min_chunk_seconds: u32) -> Self {
        self.chunk_duration_seconds = duration_seconds;
        self.chunk_overlap_seconds = overlap_seconds;
        self.min_chunk_seconds = min_chunk_seconds;
        self
    }

    pub fn total_chunks(&self) -> usize {
        self.chunks.len()
    }

    pub fn completed_chunks(&self) -> usize {
        self.chunks
            .iter()
            .filter(|c| c.status == ChunkStatus::Completed)
            .count()
    }

    /// Fraction complete per invariant 6 of the data model: ratio of
    /// completed chunks while not yet terminal, 1.0 once completed, 0.0 if
    /// failed or no chunks exist yet.
    pub fn progress(&self) -> f64 {
        match self.status {
            JobStatus::Completed => 1.0,
            JobStatus::Failed => 0.0,
            _ if self.chunks.is_empty() => 0.0,
            _ => self.completed_chunks() as f64 / self.total_chunks() as f64,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
