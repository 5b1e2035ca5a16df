//! Command handlers: each wires the orchestrator's collaborators together
//! for one subcommand. No pipeline logic lives here — only construction and
//! argument plumbing.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bout_core::checkpoint::CheckpointStore;
use bout_core::config::{Config, Device};
use bout_core::diarization::{DiarizationProvider, HttpDiarizationProvider};
use bout_core::document::PlainTextWriter;
use bout_core::logging;
use bout_core::orchestrator::Orchestrator;
use bout_core::output::UserOutput;
use bout_core::paths::FfmpegTools;
use bout_core::progress::ProgressTracker;
use bout_core::transcription::{HttpTranscriber, TranscriptionWorker};

pub enum CommandError {
    Failed(String),
    Interrupted,
}

impl From<bout_core::error::BoutError> for CommandError {
    fn from(e: bout_core::error::BoutError) -> Self {
        let mut message = e.to_string();
        for suggestion in e.suggestions() {
            message.push_str("\n  - ");
            message.push_str(suggestion);
        }
        CommandError::Failed(message)
    }
}

fn load_config(device: Option<String>, model: Option<String>, language: Option<String>, chunk_duration: Option<u32>) -> Config {
    let mut config = Config::from_env();
    if let Some(device) = device {
        config.transcription.device = match device.to_ascii_lowercase().as_str() {
            "cuda" => Device::Cuda,
            "cpu" => Device::Cpu,
            _ => Device::Auto,
        };
    }
    if let Some(model) = model {
        config.transcription.model = model;
    }
    if let Some(language) = language {
        config.transcription.language = language;
    }
    if let Some(chunk_duration) = chunk_duration {
        config.chunk.duration_seconds = chunk_duration;
    }
    config
}

fn init(config: &Config) -> Result<(), CommandError> {
    config
        .ensure_directories()
        .map_err(|e| CommandError::Failed(format!("could not create working directories: {e}")))?;
    let level = logging::parse_log_level(&config.log.level).unwrap_or(tracing::Level::INFO);
    let _ = logging::init_cli_logging(&config.logs_dir, level);
    Ok(())
}

/// A ctrl-c watcher that flips `cancel` once, the sole cancellation signal
/// the orchestrator observes between chunks.
fn spawn_cancel_watcher() -> Arc<AtomicBool> {
    let cancel = Arc::new(AtomicBool::new(false));
    let watched = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            watched.store(true, Ordering::SeqCst);
        }
    });
    cancel
}

fn diarizer_for(config: &Config) -> Option<Box<dyn DiarizationProvider>> {
    config
        .diarization
        .hf_token
        .clone()
        .map(|token| Box::new(HttpDiarizationProvider::new(config.diarization.endpoint.clone(), token)) as Box<dyn DiarizationProvider>)
}

async fn run_job(
    orchestrator: &Orchestrator,
    job: bout_core::domain::Job,
    diarize: bool,
    output: &UserOutput,
) -> Result<(), CommandError> {
    let config = orchestrator.config();
    let transcriber = HttpTranscriber::new(config.transcription.endpoint.clone(), config.transcription.model.clone());
    let mut worker = TranscriptionWorker::new(transcriber, config.transcription.clone());
    let writer = PlainTextWriter::new(true);
    let diarizer = if diarize { diarizer_for(config) } else { None };

    let cancel = spawn_cancel_watcher();
    let mut progress = ProgressTracker::new();
    let output_for_progress = output.clone();
    progress.on_progress(move |fraction, text| {
        output_for_progress.status(format!("{:>5.1}%  {text}", fraction * 100.0));
    });

    let result = orchestrator
        .run(job, &mut worker, &writer, diarizer.as_deref(), &mut progress, Some(&*cancel))
        .await;

    output.clear_status();

    let job = result?;

    if cancel.load(Ordering::SeqCst) && job.status != bout_core::domain::JobStatus::Completed {
        output.warning(format!("Interrupted — job {} is resumable from `bout resume {}`", job.id, job.id));
        return Err(CommandError::Interrupted);
    }

    if job.status == bout_core::domain::JobStatus::Completed {
        orchestrator.cleanup_job_files(&job);
        output.success(format!(
            "Transcribed {} -> {}",
            job.video_name,
            job.output_path.map(|p| p.display().to_string()).unwrap_or_default()
        ));
    }

    Ok(())
}

pub async fn transcribe(
    video: PathBuf,
    model: Option<String>,
    language: Option<String>,
    device: Option<String>,
    chunk_duration: Option<u32>,
    diarize: bool,
) -> Result<(), CommandError> {
    let config = load_config(device, model, language, chunk_duration);
    init(&config)?;
    let output = UserOutput::new();

    let tools = FfmpegTools::locate(config.ffmpeg_path.as_deref())?;
    let orchestrator = Orchestrator::new(config, tools);
    let job = orchestrator.create_job(video).await?;
    output.info(format!("Created job {} ({:.1}s)", job.id, job.duration_seconds));

    run_job(&orchestrator, job, diarize, &output).await
}

pub async fn resume(job_id: String, diarize: bool) -> Result<(), CommandError> {
    let config = load_config(None, None, None, None);
    init(&config)?;
    let output = UserOutput::new();

    let tools = FfmpegTools::locate(config.ffmpeg_path.as_deref())?;
    let store = CheckpointStore::new(config.jobs_dir.clone());
    let job = store.load_job(&job_id)?;

    if job.status.is_terminal() {
        output.info(format!("Job {job_id} is already {}", job.status.as_str()));
        return Ok(());
    }

    output.info(format!("Resuming job {job_id} from `{}`", job.status.as_str()));
    let orchestrator = Orchestrator::new(config, tools);
    run_job(&orchestrator, job, diarize, &output).await
}

pub fn list() -> Result<(), CommandError> {
    let config = load_config(None, None, None, None);
    let store = CheckpointStore::new(config.jobs_dir);
    let output = UserOutput::new();

    let jobs = store.get_all_jobs()?;
    if jobs.is_empty() {
        output.info("No jobs recorded yet.");
        return Ok(());
    }

    for job in jobs {
        output.info(format!(
            "{}  {:<12} {:>6.1}%  {}",
            job.id,
            job.status.as_str(),
            job.progress() * 100.0,
            job.video_name
        ));
    }
    Ok(())
}

pub fn cleanup(max_age_days: u64, dry_run: bool) -> Result<(), CommandError> {
    let config = load_config(None, None, None, None);
    let store = CheckpointStore::new(config.jobs_dir);
    let output = UserOutput::new();

    let removed = store.cleanup_old_jobs(max_age_days * 24 * 60 * 60, dry_run)?;
    if removed.is_empty() {
        output.info("Nothing to clean up.");
    } else if dry_run {
        output.info(format!("Would remove {} job record(s): {}", removed.len(), removed.join(", ")));
    } else {
        output.success(format!("Removed {} job record(s): {}", removed.len(), removed.join(", ")));
    }
    Ok(())
}
