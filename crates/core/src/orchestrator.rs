//! The orchestrator: drives a job through its stage cascade
//! (extract -> chunk -> transcribe -> merge -> diarize -> generate),
//! checkpointing at every stage boundary so a crash or cancellation resumes
//! instead of restarting from scratch.
//!
//! Each `stage_*` method transitions the job into that stage, does the
//! work, and on success advances and persists `job.status` to the next
//! stage. `drive` chains these as a sequence of independent `if` checks
//! rather than a big match — a resume simply re-enters the cascade at
//! whatever status was last persisted and falls through the rest.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use crate::audio::{plan_chunks, AudioExtractor, ChunkSplitter};
use crate::checkpoint::CheckpointStore;
use crate::config::Config;
use crate::diarization::{self, DiarizationProvider};
use crate::document::DocumentWriter;
use crate::domain::{Job, JobStatus};
use crate::error::{BoutError, Result};
use crate::merge;
use crate::paths::FfmpegTools;
use crate::progress::{ProgressTracker, Stage};
use crate::transcription::{Transcriber, TranscriptionWorker};

pub struct Orchestrator {
    config: Config,
    store: CheckpointStore,
    tools: FfmpegTools,
}

impl Orchestrator {
    pub fn new(config: Config, tools: FfmpegTools) -> Self {
        let store = CheckpointStore::new(config.jobs_dir.clone());
        Self { config, store, tools }
    }

    pub fn store(&self) -> &CheckpointStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates and persists a new job for `video_path`, probing its
    /// duration via ffprobe and fixing this job's chunk-sizing parameters
    /// from the current configuration so a later config change can't shift
    /// a resumed job's chunk boundaries out from under it.
    pub async fn create_job(&self, video_path: PathBuf) -> Result<Job> {
        if !video_path.exists() {
            return Err(BoutError::VideoNotFound(video_path.display().to_string()));
        }

        let duration = self.tools.probe_duration(&video_path).await?;
        let job = Job::new(new_job_id(), video_path, duration).with_chunk_config(
            self.config.chunk.duration_seconds,
            self.config.chunk.overlap_seconds,
            self.config.chunk.min_chunk_seconds,
        );
        self.store.save_job(&job)?;
        Ok(job)
    }

    /// Drives `job` through every remaining stage of its lifecycle. Safe to
    /// call on a job in any non-terminal status — already-finished stages
    /// are skipped, and a job already in a terminal status is returned
    /// unchanged. On any stage error the job is persisted as `Failed` with
    /// the error recorded before the error is propagated.
    ///
    /// `cancel`, when set and observed true between chunks during
    /// transcription, stops the job in place (left at `Transcribing`, not
    /// failed) rather than continuing — the sole cancellation point in the
    /// pipeline.
    pub async fn run<T: Transcriber>(
        &self,
        mut job: Job,
        worker: &mut TranscriptionWorker<T>,
        writer: &dyn DocumentWriter,
        diarizer: Option<&dyn DiarizationProvider>,
        progress: &mut ProgressTracker,
        cancel: Option<&AtomicBool>,
    ) -> Result<Job> {
        if job.status.is_terminal() {
            return Ok(job);
        }

        match self.drive(&mut job, worker, writer, diarizer, progress, cancel).await {
            Ok(()) => Ok(job),
            Err(e) => {
                job.status = JobStatus::Failed;
                job.error = Some(e.to_string());
                job.touch();
                self.store.save_job(&job)?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive<T: Transcriber>(
        &self,
        job: &mut Job,
        worker: &mut TranscriptionWorker<T>,
        writer: &dyn DocumentWriter,
        diarizer: Option<&dyn DiarizationProvider>,
        progress: &mut ProgressTracker,
        cancel: Option<&AtomicBool>,
    ) -> Result<()> {
        if matches!(job.status, JobStatus::Pending | JobStatus::Extracting) {
            self.stage_extract(job, progress).await?;
        }
        if job.status == JobStatus::Chunking {
            self.stage_chunk(job, progress).await?;
        }
        if job.status == JobStatus::Transcribing {
            let cancelled = self.stage_transcribe(job, worker, progress, cancel).await?;
            if cancelled {
                return Ok(());
            }
        }
        if job.status == JobStatus::Merging {
            self.stage_merge(job, progress)?;
        }
        if job.status == JobStatus::Diarizing {
            self.stage_diarize(job, diarizer, progress).await?;
        }
        if job.status == JobStatus::Generating {
            self.stage_generate(job, writer, progress)?;
        }
        Ok(())
    }

    async fn stage_extract(&self, job: &mut Job, progress: &mut ProgressTracker) -> Result<()> {
        job.status = JobStatus::Extracting;
        job.touch();
        self.store.save_job(job)?;

        progress.start_stage(Stage::Extract, 1.0);
        let extractor = AudioExtractor::new(self.tools.clone(), self.config.audio.clone());
        let audio_path = extractor
            .extract(&job.video_path, &self.config.temp_dir, |frac| {
                progress.update_stage(Stage::Extract, frac)
            })
            .await?;

        job.audio_path = Some(audio_path);
        job.status = JobStatus::Chunking;
        job.touch();
        self.store.save_job(job)
    }

    async fn stage_chunk(&self, job: &mut Job, progress: &mut ProgressTracker) -> Result<()> {
        progress.start_stage(Stage::Chunk, 1.0);

        let audio_path = job.audio_path.clone().ok_or_else(|| {
            BoutError::Chunking("cannot chunk a job with no extracted audio".to_string())
        })?;

        let mut chunks = plan_chunks(
            job.duration_seconds,
            job.chunk_duration_seconds as f64,
            job.chunk_overlap_seconds as f64,
            job.min_chunk_seconds as f64,
        );

        let chunks_dir = self.config.chunks_dir_for(&job.id);

        if chunks.len() <= 1 {
            // A single-chunk plan already covers the whole job; the
            // extracted audio file doubles as its one chunk file.
            if let Some(chunk) = chunks.get_mut(0) {
                chunk.file_path = Some(audio_path);
            }
            progress.update_stage(Stage::Chunk, 1.0);
        } else {
            let splitter = ChunkSplitter::new(self.tools.clone(), self.config.audio.clone());
            splitter
                .split(&audio_path, &chunks_dir, &mut chunks, |done, total| {
                    progress.update_stage(Stage::Chunk, done as f64 / total.max(1) as f64)
                })
                .await?;
        }

        job.chunks_dir = Some(chunks_dir);
        job.chunks = chunks;
        job.status = JobStatus::Transcribing;
        job.touch();
        self.store.save_job(job)
    }

    /// Transcribes every not-yet-completed chunk in order, checkpointing
    /// each one individually via `save_chunk_result` as it finishes — a
    /// crash mid-stage resumes from the first incomplete chunk rather than
    /// re-transcribing everything. Returns `true` if `cancel` stopped the
    /// stage before it finished.
    async fn stage_transcribe<T: Transcriber>(
        &self,
        job: &mut Job,
        worker: &mut TranscriptionWorker<T>,
        progress: &mut ProgressTracker,
        cancel: Option<&AtomicBool>,
    ) -> Result<bool> {
        progress.start_stage(Stage::Transcribe, job.total_chunks() as f64);
        progress.update_stage(Stage::Transcribe, job.completed_chunks() as f64);

        let job_id = job.id.clone();
        let store = &self.store;

        let cancelled = worker
            .transcribe_all(
                &mut job.chunks,
                |chunk| {
                    let index = chunk.index;
                    let status = chunk.status;
                    let text = chunk.text.clone();
                    let segments = chunk.segments.clone();
                    let completed_at = chunk.completed_at;
                    let error = chunk.error.clone();
                    if let Err(e) = store.save_chunk_result(&job_id, index, move |c| {
                        c.status = status;
                        c.text = text;
                        c.segments = segments;
                        c.completed_at = completed_at;
                        c.error = error;
                    }) {
                        tracing::error!(chunk = index, "failed to checkpoint chunk: {e}");
                    }
                },
                |done, total| progress.update_stage(Stage::Transcribe, (done.min(total)) as f64),
                cancel,
            )
            .await?;

        if cancelled {
            job.touch();
            self.store.save_job(job)?;
            return Ok(true);
        }

        job.status = JobStatus::Merging;
        job.touch();
        self.store.save_job(job)?;
        Ok(false)
    }

    fn stage_merge(&self, job: &mut Job, progress: &mut ProgressTracker) -> Result<()> {
        progress.start_stage(Stage::Merge, 1.0);

        let (text, segments) = merge::merge_segments(&job.chunks, job.chunk_overlap_seconds as f64);
        job.transcription_text = Some(text);
        job.segments = segments;

        progress.complete_stage(Stage::Merge);
        job.status = JobStatus::Diarizing;
        job.touch();
        self.store.save_job(job)
    }

    /// Diarization is optional: when unavailable (no `HF_TOKEN`) the stage
    /// is marked complete without running — its weight still counts toward
    /// overall progress, and the job proceeds with undiarized segments.
    async fn stage_diarize(
        &self,
        job: &mut Job,
        diarizer: Option<&dyn DiarizationProvider>,
        progress: &mut ProgressTracker,
    ) -> Result<()> {
        progress.start_stage(Stage::Diarize, 1.0);

        let can_diarize = diarizer.is_some() && diarization::is_available(&self.config.diarization);

        if can_diarize {
            let audio_path = job.audio_path.clone().ok_or_else(|| {
                BoutError::Pipeline("cannot diarize a job with no extracted audio".to_string())
            })?;

            match diarizer.unwrap().diarize(&audio_path).await {
                Ok(turns) => {
                    let assigned = diarization::merge_with_transcription(&job.segments, &turns);
                    job.segments =
                        diarization::consolidate_segments(&assigned, self.config.diarization.gap_threshold_seconds);
                }
                Err(e) => {
                    // Diarization failure is recoverable in place: the job
                    // proceeds with undiarized segments rather than failing.
                    tracing::warn!("diarization failed, continuing without speaker labels: {e}");
                }
            }
        }

        progress.complete_stage(Stage::Diarize);
        job.status = JobStatus::Generating;
        job.touch();
        self.store.save_job(job)
    }

    fn stage_generate(&self, job: &mut Job, writer: &dyn DocumentWriter, progress: &mut ProgressTracker) -> Result<()> {
        progress.start_stage(Stage::Generate, 1.0);

        let output_path = self
            .config
            .output_dir
            .join(format!("{}.{}", stem_of(&job.video_name), writer.extension()));
        writer.write(&output_path, job.transcription_text.as_deref().unwrap_or(""), &job.segments)?;

        job.output_path = Some(output_path);
        progress.complete_stage(Stage::Generate);
        job.status = JobStatus::Completed;
        job.touch();
        self.store.save_job(job)
    }

    /// Cancels a job's transcription-chunk audio and chunk files once its
    /// document has been generated — mirrors the host's post-encode
    /// cleanup of intermediate recordings.
    pub fn cleanup_job_files(&self, job: &Job) {
        if let Some(audio_path) = &job.audio_path {
            if audio_path.exists() {
                if let Err(e) = std::fs::remove_file(audio_path) {
                    tracing::warn!("could not clean up {}: {e}", audio_path.display());
                }
            }
        }
        if let Some(chunks_dir) = &job.chunks_dir {
            if chunks_dir.exists() {
                if let Err(e) = std::fs::remove_dir_all(chunks_dir) {
                    tracing::warn!("could not clean up {}: {e}", chunks_dir.display());
                }
            }
        }
    }
}

fn stem_of(video_name: &str) -> String {
    std::path::Path::new(video_name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "transcript".to_string())
}

/// Job ids are timestamp-prefixed so `get_all_jobs`'s newest-first sort
/// and a plain directory listing agree, matching the host's convention for
/// recording session ids.
fn new_job_id() -> String {
    let now = chrono::Utc::now();
    let nanos = now.timestamp_subsec_nanos();
    format!("{}-{:09}", now.format("%Y%m%dT%H%M%S"), nanos)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Device;
    use crate::document::PlainTextWriter;
    use crate::domain::{Chunk, ChunkStatus};
    use crate::transcription::testing::StubTranscriber;
    use crate::transcription::TranscriptionWorker;
    use std::path::PathBuf;
    use tempfile::tempdir;

    fn orchestrator_with_base_dir(base_dir: PathBuf) -> Orchestrator {
        let config = Config::from_base_dir(base_dir);
        config.ensure_directories().unwrap();
        let tools = FfmpegTools {
            ffmpeg_path: PathBuf::from("ffmpeg"),
            ffprobe_path: PathBuf::from("ffprobe"),
        };
        Orchestrator::new(config, tools)
    }

    fn job_in_transcribing(id: &str, mut chunks: Vec<Chunk>, duration: f64) -> Job {
        for chunk in &mut chunks {
            chunk.file_path = Some(PathBuf::from(format!("chunk_{:03}.wav", chunk.index)));
        }
        let mut job = Job::new(id.to_string(), PathBuf::from("talk.mp4"), duration).with_chunk_config(300, 10, 30);
        job.audio_path = Some(PathBuf::from("talk_audio.wav"));
        job.chunks = chunks;
        job.status = JobStatus::Transcribing;
        job
    }

    fn worker() -> TranscriptionWorker<StubTranscriber> {
        let chunks = vec![Chunk::new(0, 0.0, 50.0, 0.0), Chunk::new(1, 50.0, 100.0, 10.0)];
        TranscriptionWorker::new(
            StubTranscriber::from_chunks(&chunks),
            crate::config::TranscriptionConfig { device: Device::Cpu, ..Default::default() },
        )
    }

    #[tokio::test]
    async fn single_chunk_job_runs_to_completion() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let chunks = vec![Chunk::new(0, 0.0, 80.0, 0.0)];
        let mut job = job_in_transcribing("job-a", chunks, 80.0);

        let stub = StubTranscriber::from_chunks(&job.chunks);
        let mut w = TranscriptionWorker::new(
            stub,
            crate::config::TranscriptionConfig { device: Device::Cpu, ..Default::default() },
        );
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();

        job = orchestrator
            .run(job, &mut w, &writer, None, &mut progress, None)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcription_text.as_deref(), Some("T_0"));
        assert!(job.output_path.as_ref().unwrap().exists());
        assert!((progress.overall_progress() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn two_chunk_overlap_merges_into_one_transcript() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let chunks = vec![Chunk::new(0, 0.0, 50.0, 0.0), Chunk::new(1, 50.0, 100.0, 40.0)];
        let mut job = job_in_transcribing("job-b", chunks, 100.0);

        let stub = StubTranscriber::from_chunks(&job.chunks);
        let mut w = TranscriptionWorker::new(
            stub,
            crate::config::TranscriptionConfig { device: Device::Cpu, ..Default::default() },
        );
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();

        job = orchestrator
            .run(job, &mut w, &writer, None, &mut progress, None)
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.transcription_text.as_deref(), Some("T_0 T_1"));
    }

    #[tokio::test]
    async fn resuming_a_completed_job_is_a_no_op() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let mut job = job_in_transcribing("job-c", vec![Chunk::new(0, 0.0, 10.0, 0.0)], 10.0);
        job.status = JobStatus::Completed;
        job.output_path = Some(PathBuf::from("already/done.txt"));

        let mut w = worker();
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();

        let returned = orchestrator
            .run(job.clone(), &mut w, &writer, None, &mut progress, None)
            .await
            .unwrap();

        assert_eq!(returned.status, JobStatus::Completed);
        assert_eq!(returned.output_path, job.output_path);
    }

    #[tokio::test]
    async fn cancelling_between_chunks_leaves_job_resumable() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let chunks = vec![Chunk::new(0, 0.0, 50.0, 0.0), Chunk::new(1, 50.0, 100.0, 10.0)];
        let job = job_in_transcribing("job-d", chunks, 100.0);
        orchestrator.store().save_job(&job).unwrap();

        let mut w = worker();
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();
        let cancel = AtomicBool::new(true);

        let stopped = orchestrator
            .run(job, &mut w, &writer, None, &mut progress, Some(&cancel))
            .await
            .unwrap();

        assert_eq!(stopped.status, JobStatus::Transcribing);
        assert!(stopped.chunks.iter().all(|c| c.status == ChunkStatus::Pending));

        // A fresh run with cancellation cleared picks up exactly where it left off.
        let resumed = orchestrator
            .run(stopped, &mut w, &writer, None, &mut progress, None)
            .await
            .unwrap();
        assert_eq!(resumed.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn oom_retry_then_success_matches_clean_run_output() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let chunks = vec![Chunk::new(0, 0.0, 50.0, 0.0)];

        let retried_job = job_in_transcribing("job-e", chunks.clone(), 50.0);
        let mut retried_worker = TranscriptionWorker::new(
            StubTranscriber::from_chunks(&chunks).with_oom_once_for(vec![0]),
            crate::config::TranscriptionConfig { device: Device::Cpu, max_retries: 2, ..Default::default() },
        );
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();
        let retried = orchestrator
            .run(retried_job, &mut retried_worker, &writer, None, &mut progress, None)
            .await
            .unwrap();

        let clean_job = job_in_transcribing("job-f", chunks.clone(), 50.0);
        let mut clean_worker = TranscriptionWorker::new(
            StubTranscriber::from_chunks(&chunks),
            crate::config::TranscriptionConfig { device: Device::Cpu, ..Default::default() },
        );
        let mut progress2 = ProgressTracker::new();
        let clean = orchestrator
            .run(clean_job, &mut clean_worker, &writer, None, &mut progress2, None)
            .await
            .unwrap();

        assert_eq!(retried.transcription_text, clean.transcription_text);
        assert_eq!(retried.status, clean.status);
    }

    #[tokio::test]
    async fn diarization_unavailable_still_completes_job() {
        let dir = tempdir().unwrap();
        let orchestrator = orchestrator_with_base_dir(dir.path().to_path_buf());

        let chunks = vec![Chunk::new(0, 0.0, 20.0, 0.0)];
        let job = job_in_transcribing("job-g", chunks.clone(), 20.0);

        let mut w = TranscriptionWorker::new(
            StubTranscriber::from_chunks(&chunks),
            crate::config::TranscriptionConfig { device: Device::Cpu, ..Default::default() },
        );
        let writer = PlainTextWriter::new(false);
        let mut progress = ProgressTracker::new();

        let done = orchestrator
            .run(job, &mut w, &writer, None, &mut progress, None)
            .await
            .unwrap();

        assert_eq!(done.status, JobStatus::Completed);
        assert!(done.segments.iter().all(|s| s.speaker.is_none()));
    }
}
