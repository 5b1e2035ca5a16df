//! Job checkpoint persistence: one JSON file per job under `jobs/<id>.json`,
//! written atomically (write to a `.tmp` sibling, then rename) so a crash
//! mid-write never leaves a corrupt checkpoint behind — strictly stronger
//! than the plain `json.dump` the pipeline this was modeled on uses.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{Chunk, ChunkStatus, Job, JobStatus, TranscriptionSegment};
use crate::error::{BoutError, Result};

/// On-disk representation of a [`Job`]. Kept as a distinct type from the
/// in-memory `Job`/`Chunk` so the wire format can evolve independently of
/// the orchestrator's working types.
#[derive(Debug, Serialize, Deserialize)]
pub struct JobRecord {
    pub id: String,
    pub video_path: PathBuf,
    pub video_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub duration_seconds: f64,
    pub status: String,
    pub error: Option<String>,
    pub audio_path: Option<PathBuf>,
    pub chunks_dir: Option<PathBuf>,
    pub chunk_config: ChunkConfigRecord,
    pub chunks: Vec<ChunkRecord>,
    pub output_path: Option<PathBuf>,
    pub transcription_text: Option<String>,
    pub segments: Vec<SegmentRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkConfigRecord {
    pub duration_seconds: u32,
    pub overlap_seconds: u32,
    pub min_chunk_seconds: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChunkRecord {
    pub index: usize,
    pub start_time: f64,
    pub end_time: f64,
    pub overlap_start: f64,
    pub file_path: Option<PathBuf>,
    pub status: String,
    pub text: Option<String>,
    pub segments: Vec<SegmentRecord>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub start: f64,
    pub end: f64,
    pub text: String,
    pub speaker: Option<String>,
}

impl From<&Job> for JobRecord {
    fn from(job: &Job) -> Self {
        JobRecord {
            id: job.id.clone(),
            video_path: job.video_path.clone(),
            video_name: job.video_name.clone(),
            created_at: job.created_at,
            updated_at: job.updated_at,
            duration_seconds: job.duration_seconds,
            status: job.status.as_str().to_string(),
            error: job.error.clone(),
            audio_path: job.audio_path.clone(),
            chunks_dir: job.chunks_dir.clone(),
            chunk_config: ChunkConfigRecord {
                duration_seconds: job.chunk_duration_seconds,
                overlap_seconds: job.chunk_overlap_seconds,
                min_chunk_seconds: job.min_chunk_seconds,
            },
            chunks: job.chunks.iter().map(ChunkRecord::from).collect(),
            output_path: job.output_path.clone(),
            transcription_text: job.transcription_text.clone(),
            segments: job.segments.iter().map(SegmentRecord::from).collect(),
        }
    }
}

impl From<&Chunk> for ChunkRecord {
    fn from(chunk: &Chunk) -> Self {
        ChunkRecord {
            index: chunk.index,
            start_time: chunk.start_time,
            end_time: chunk.end_time,
            overlap_start: chunk.overlap_start,
            file_path: chunk.file_path.clone(),
            status: chunk.status.as_str().to_string(),
            text: chunk.text.clone(),
            segments: chunk.segments.iter().map(SegmentRecord::from).collect(),
            completed_at: chunk.completed_at,
            error: chunk.error.clone(),
        }
    }
}

impl From<&TranscriptionSegment> for SegmentRecord {
    fn from(seg: &TranscriptionSegment) -> Self {
        SegmentRecord {
            start: seg.start,
            end: seg.end,
            text: seg.text.clone(),
            speaker: seg.speaker.clone(),
        }
    }
}

impl JobRecord {
    pub fn into_job(self) -> Job {
        Job {
            id: self.id,
            video_path: self.video_path,
            video_name: self.video_name,
            created_at: self.created_at,
            duration_seconds: self.duration_seconds,
            status: JobStatus::from_str(&self.status).unwrap_or(JobStatus::Pending),
            updated_at: self.updated_at,
            error: self.error,
            audio_path: self.audio_path,
            chunks_dir: self.chunks_dir,
            chunks: self.chunks.into_iter().map(ChunkRecord::into_chunk).collect(),
            output_path: self.output_path,
            transcription_text: self.transcription_text,
            segments: self.segments.into_iter().map(SegmentRecord::into_segment).collect(),
            chunk_duration_seconds: self.chunk_config.duration_seconds,
            chunk_overlap_seconds: self.chunk_config.overlap_seconds,
            min_chunk_seconds: self.chunk_config.min_chunk_seconds,
        }
    }
}

impl ChunkRecord {
    fn into_chunk(self) -> Chunk {
        Chunk {
            index: self.index,
            start_time: self.start_time,
            end_time: self.end_time,
            overlap_start: self.overlap_start,
            file_path: self.file_path,
            status: ChunkStatus::from_str(&self.status).unwrap_or(ChunkStatus::Pending),
            text: self.text,
            segments: self.segments.into_iter().map(SegmentRecord::into_segment).collect(),
            completed_at: self.completed_at,
            error: self.error,
        }
    }
}

impl SegmentRecord {
    fn into_segment(self) -> TranscriptionSegment {
        TranscriptionSegment {
            start: self.start,
            end: self.end,
            text: self.text,
            speaker: self.speaker,
        }
    }
}

/// Reads and writes [`JobRecord`]s under `jobs_dir`.
pub struct CheckpointStore {
    jobs_dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(jobs_dir: PathBuf) -> Self {
        Self { jobs_dir }
    }

    fn path_for(&self, job_id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{job_id}.json"))
    }

    /// Serializes `job` and writes it atomically: the full JSON is written
    /// to a `.tmp` sibling first, then renamed over the final path, so
    /// readers never observe a partially-written file.
    pub fn save_job(&self, job: &Job) -> Result<()> {
        std::fs::create_dir_all(&self.jobs_dir)?;
        let record = JobRecord::from(job);
        let json = serde_json::to_string_pretty(&record)?;

        let final_path = self.path_for(&job.id);
        let tmp_path = self.jobs_dir.join(format!("{}.json.tmp", job.id));
        std::fs::write(&tmp_path, json)?;
        std::fs::rename(&tmp_path, &final_path)?;
        Ok(())
    }

    pub fn load_job(&self, job_id: &str) -> Result<Job> {
        let path = self.path_for(job_id);
        let json = std::fs::read_to_string(&path).map_err(|_| BoutError::JobNotFound(job_id.to_string()))?;
        let record: JobRecord = serde_json::from_str(&json)?;
        Ok(record.into_job())
    }

    /// All persisted jobs, newest first by `created_at`.
    pub fn get_all_jobs(&self) -> Result<Vec<Job>> {
        if !self.jobs_dir.exists() {
            return Ok(Vec::new());
        }

        let mut jobs = Vec::new();
        for entry in std::fs::read_dir(&self.jobs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Ok(json) = std::fs::read_to_string(&path) {
                if let Ok(record) = serde_json::from_str::<JobRecord>(&json) {
                    jobs.push(record.into_job());
                }
            }
        }

        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(jobs)
    }

    /// Jobs whose status is in the resumable set (§3 of the data model) —
    /// narrower than simply non-terminal, since `Diarizing` is excluded.
    pub fn get_incomplete_jobs(&self) -> Result<Vec<Job>> {
        Ok(self
            .get_all_jobs()?
            .into_iter()
            .filter(|j| j.status.is_resumable())
            .collect())
    }

    /// Loads the job, applies `patch` to the chunk at `chunk_index`, and
    /// saves it back — the read-modify-write cycle the worker uses to
    /// persist one chunk's result without re-serializing from a full
    /// in-memory job the caller may not be holding.
    pub fn save_chunk_result(&self, job_id: &str, chunk_index: usize, patch: impl FnOnce(&mut Chunk)) -> Result<()> {
        let mut job = self.load_job(job_id)?;
        if let Some(chunk) = job.chunks.iter_mut().find(|c| c.index == chunk_index) {
            patch(chunk);
        }
        job.touch();
        self.save_job(&job)
    }

    /// Deletes checkpoint files for terminal jobs whose file modification
    /// time is older than `max_age_seconds`. Returns the ids that were (or,
    /// in a dry run, would be) removed.
    pub fn cleanup_old_jobs(&self, max_age_seconds: u64, dry_run: bool) -> Result<Vec<String>> {
        if !self.jobs_dir.exists() {
            return Ok(Vec::new());
        }

        let now = std::time::SystemTime::now();
        let mut removed = Vec::new();

        for entry in std::fs::read_dir(&self.jobs_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let json = match std::fs::read_to_string(&path) {
                Ok(j) => j,
                Err(_) => continue,
            };
            let record: JobRecord = match serde_json::from_str(&json) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let status = JobStatus::from_str(&record.status).unwrap_or(JobStatus::Pending);
            if !status.is_terminal() {
                continue;
            }

            let age = entry
                .metadata()
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| now.duration_since(modified).ok())
                .map(|d| d.as_secs())
                .unwrap_or(0);

            if age >= max_age_seconds {
                if !dry_run {
                    std::fs::remove_file(&path)?;
                }
                removed.push(record.id);
            }
        }

        Ok(removed)
    }
}
