//! Thin CLI shell for the bout transcription pipeline. Owns no pipeline
//! logic — only argument parsing, wiring the orchestrator's collaborators
//! together, and translating the result into an exit code.

mod commands;

use std::process::ExitCode;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "bout", version, about = "Transcribe long-form video into timestamped text")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Transcribe a video file, creating a new job.
    Transcribe {
        /// Path to the video file.
        video: std::path::PathBuf,
        /// Override the transcription model (or set BOUT_MODEL).
        #[arg(long)]
        model: Option<String>,
        /// Override the transcription language (or set BOUT_LANGUAGE).
        #[arg(long)]
        language: Option<String>,
        /// Override the device: auto, cuda, or cpu (or set BOUT_DEVICE).
        #[arg(long)]
        device: Option<String>,
        /// Override the chunk duration in seconds (or set BOUT_CHUNK_DURATION).
        #[arg(long)]
        chunk_duration: Option<u32>,
        /// Run speaker diarization after transcription (requires HF_TOKEN).
        #[arg(long)]
        diarize: bool,
    },
    /// Resume a job by id from its last checkpoint.
    Resume {
        job_id: String,
        #[arg(long)]
        diarize: bool,
    },
    /// List all jobs, newest first.
    List,
    /// Delete checkpoint records for terminal jobs older than the given age.
    Cleanup {
        #[arg(long, default_value_t = 30)]
        max_age_days: u64,
        #[arg(long)]
        dry_run: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli.command).await {
        Ok(()) => ExitCode::from(0),
        Err(commands::CommandError::Interrupted) => ExitCode::from(130),
        Err(commands::CommandError::Failed(e)) => {
            eprintln!("[Error] {e}");
            ExitCode::from(1)
        }
    }
}

async fn run(command: Command) -> Result<(), commands::CommandError> {
    match command {
        Command::Transcribe { video, model, language, device, chunk_duration, diarize } => {
            commands::transcribe(video, model, language, device, chunk_duration, diarize).await
        }
        Command::Resume { job_id, diarize } => commands::resume(job_id, diarize).await,
        Command::List => commands::list(),
        Command::Cleanup { max_age_days, dry_run } => commands::cleanup(max_age_days, dry_run),
    }
}
