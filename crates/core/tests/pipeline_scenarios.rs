//! Black-box scenarios against the public API: checkpoint round-trips and
//! the literal end-to-end cases, run with a stub transcriber so no real
//! `ffmpeg`/model backend is required.

use std::path::PathBuf;
use std::sync::atomic::AtomicBool;

use bout_core::checkpoint::CheckpointStore;
use bout_core::config::{Config, Device, TranscriptionConfig};
use bout_core::document::PlainTextWriter;
use bout_core::domain::{Chunk, Job, JobStatus};
use bout_core::orchestrator::Orchestrator;
use bout_core::paths::FfmpegTools;
use bout_core::progress::ProgressTracker;
use bout_core::transcription::testing::StubTranscriber;
use bout_core::transcription::TranscriptionWorker;

fn orchestrator_in(base_dir: PathBuf) -> Orchestrator {
    let config = Config::from_base_dir(base_dir);
    config.ensure_directories().expect("fixture dirs");
    let tools = FfmpegTools {
        ffmpeg_path: PathBuf::from("ffmpeg"),
        ffprobe_path: PathBuf::from("ffprobe"),
    };
    Orchestrator::new(config, tools)
}

fn ready_job(id: &str, chunks: Vec<Chunk>, duration: f64) -> Job {
    let mut chunks = chunks;
    for chunk in &mut chunks {
        chunk.file_path = Some(PathBuf::from(format!("chunk_{:03}.wav", chunk.index)));
    }
    let mut job = Job::new(id.to_string(), PathBuf::from("talk.mp4"), duration).with_chunk_config(300, 10, 30);
    job.audio_path = Some(PathBuf::from("talk_audio.wav"));
    job.chunks = chunks;
    job.status = JobStatus::Transcribing;
    job
}

fn cpu_worker(chunks: &[Chunk]) -> TranscriptionWorker<StubTranscriber> {
    TranscriptionWorker::new(
        StubTranscriber::from_chunks(chunks),
        TranscriptionConfig { device: Device::Cpu, ..Default::default() },
    )
}

/// Scenario 1: a single chunk covering the whole duration merges to that
/// chunk's text and segment, unchanged.
#[tokio::test]
async fn scenario_single_chunk_passthrough() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_in(dir.path().to_path_buf());

    let chunks = vec![Chunk::new(0, 0.0, 250.0, 0.0)];
    let job = ready_job("scenario-1", chunks.clone(), 250.0);

    let mut worker = cpu_worker(&chunks);
    let writer = PlainTextWriter::new(false);
    let mut progress = ProgressTracker::new();

    let done = orchestrator
        .run(job, &mut worker, &writer, None, &mut progress, None)
        .await
        .unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.transcription_text.as_deref(), Some("T_0"));
    assert_eq!(done.segments.len(), 1);
    assert_eq!((done.segments[0].start, done.segments[0].end), (0.0, 250.0));
}

/// Scenario 2: two overlapping 300s/10s-overlap chunks spanning 600s merge
/// into two disjoint segments, in order, with the overlap window dropped.
/// The merger keeps or drops whole segments by their overlap-window
/// boundary — it never clips a kept segment's own timestamps — so each
/// chunk's single stub segment survives here exactly as the model
/// produced it, at its own chunk-relative-rebased span.
#[tokio::test]
async fn scenario_two_chunk_overlap_merge() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_in(dir.path().to_path_buf());

    let chunks = vec![Chunk::new(0, 0.0, 300.0, 0.0), Chunk::new(1, 290.0, 600.0, 10.0)];
    let job = ready_job("scenario-2", chunks.clone(), 600.0);

    let mut worker = cpu_worker(&chunks);
    let writer = PlainTextWriter::new(false);
    let mut progress = ProgressTracker::new();

    let done = orchestrator
        .run(job, &mut worker, &writer, None, &mut progress, None)
        .await
        .unwrap();

    assert_eq!(done.status, JobStatus::Completed);
    assert_eq!(done.transcription_text.as_deref(), Some("T_0 T_1"));
    assert_eq!(done.segments.len(), 2);
    assert_eq!((done.segments[0].start, done.segments[0].end), (0.0, 300.0));
    assert_eq!((done.segments[1].start, done.segments[1].end), (290.0, 600.0));
}

/// Scenario 4: interrupting after the first chunk of a two-chunk plan
/// leaves a resumable, `TRANSCRIBING` job whose persisted checkpoint loads
/// back byte-identical to what a clean run to completion would produce.
#[tokio::test]
async fn scenario_interrupt_then_resume_matches_clean_run() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_in(dir.path().to_path_buf());

    let chunks = vec![Chunk::new(0, 0.0, 300.0, 0.0), Chunk::new(1, 290.0, 600.0, 10.0)];

    let interrupted_job = ready_job("scenario-4-interrupted", chunks.clone(), 600.0);
    orchestrator.store().save_job(&interrupted_job).unwrap();
    let mut worker = cpu_worker(&chunks);
    let writer = PlainTextWriter::new(false);
    let mut progress = ProgressTracker::new();
    let cancel = AtomicBool::new(true);

    let stopped = orchestrator
        .run(interrupted_job, &mut worker, &writer, None, &mut progress, Some(&cancel))
        .await
        .unwrap();
    assert_eq!(stopped.status, JobStatus::Transcribing);

    // Reload the persisted checkpoint independently, as a CLI `resume` would.
    let reloaded = orchestrator.store().load_job("scenario-4-interrupted").unwrap();
    assert_eq!(reloaded.status, JobStatus::Transcribing);

    let mut resume_progress = ProgressTracker::new();
    let resumed = orchestrator
        .run(reloaded, &mut worker, &writer, None, &mut resume_progress, None)
        .await
        .unwrap();

    let clean_job = ready_job("scenario-4-clean", chunks.clone(), 600.0);
    let mut clean_worker = cpu_worker(&chunks);
    let mut clean_progress = ProgressTracker::new();
    let clean = orchestrator
        .run(clean_job, &mut clean_worker, &writer, None, &mut clean_progress, None)
        .await
        .unwrap();

    assert_eq!(resumed.status, JobStatus::Completed);
    assert_eq!(resumed.transcription_text, clean.transcription_text);
    assert_eq!(resumed.segments.len(), clean.segments.len());
}

/// Scenario 6: an OOM on retry eventually succeeds with output identical to
/// a clean first-try run, and the chunk still ends up `COMPLETED`.
#[tokio::test]
async fn scenario_oom_retry_converges_to_clean_output() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_in(dir.path().to_path_buf());

    let chunks = vec![Chunk::new(0, 0.0, 250.0, 0.0)];

    let retried_job = ready_job("scenario-6-retried", chunks.clone(), 250.0);
    let mut retried_worker = TranscriptionWorker::new(
        StubTranscriber::from_chunks(&chunks).with_oom_once_for(vec![0]),
        TranscriptionConfig { device: Device::Cpu, max_retries: 2, ..Default::default() },
    );
    let writer = PlainTextWriter::new(false);
    let mut progress = ProgressTracker::new();

    let retried = orchestrator
        .run(retried_job, &mut retried_worker, &writer, None, &mut progress, None)
        .await
        .unwrap();

    assert_eq!(retried.status, JobStatus::Completed);
    assert_eq!(retried.chunks[0].status, bout_core::domain::ChunkStatus::Completed);
    assert_eq!(retried.transcription_text.as_deref(), Some("T_0"));
}

/// Checkpoint round-trip: a job persisted mid-pipeline loads back with every
/// field intact, independent of the orchestrator that wrote it.
#[tokio::test]
async fn checkpoint_round_trip_preserves_job_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("jobs"));

    let mut chunks = vec![Chunk::new(0, 0.0, 300.0, 0.0), Chunk::new(1, 290.0, 600.0, 10.0)];
    chunks[0].status = bout_core::domain::ChunkStatus::Completed;
    chunks[0].text = Some("T_0".to_string());
    let job = ready_job("checkpoint-roundtrip", chunks, 600.0);

    store.save_job(&job).unwrap();
    let loaded = store.load_job("checkpoint-roundtrip").unwrap();

    assert_eq!(loaded.id, job.id);
    assert_eq!(loaded.status, job.status);
    assert_eq!(loaded.video_name, job.video_name);
    assert_eq!(loaded.chunks.len(), job.chunks.len());
    assert_eq!(loaded.chunks[0].status, bout_core::domain::ChunkStatus::Completed);
    assert_eq!(loaded.chunks[0].text.as_deref(), Some("T_0"));
    assert_eq!(loaded.chunks[1].overlap_start, 10.0);
}

/// `load_job` on an id with no saved record reports "not found" rather than
/// a partially-parsed record, matching the atomicity guarantee in the spec.
#[tokio::test]
async fn checkpoint_missing_job_is_reported_not_found() {
    let dir = tempfile::tempdir().unwrap();
    let store = CheckpointStore::new(dir.path().join("jobs"));

    let err = store.load_job("does-not-exist").unwrap_err();
    assert!(err.to_string().to_lowercase().contains("not found"));
}

/// Idempotence: re-running the orchestrator on an already-`COMPLETED` job
/// is a no-op that returns the same stored `output_path`.
#[tokio::test]
async fn completed_job_rerun_is_idempotent() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = orchestrator_in(dir.path().to_path_buf());

    let mut job = ready_job("idempotent", vec![Chunk::new(0, 0.0, 10.0, 0.0)], 10.0);
    job.status = JobStatus::Completed;
    job.output_path = Some(PathBuf::from("already/done.txt"));

    let mut worker = cpu_worker(&job.chunks.clone());
    let writer = PlainTextWriter::new(false);
    let mut progress = ProgressTracker::new();

    let returned = orchestrator
        .run(job.clone(), &mut worker, &writer, None, &mut progress, None)
        .await
        .unwrap();

    assert_eq!(returned.output_path, job.output_path);
    assert_eq!(returned.status, JobStatus::Completed);
}
