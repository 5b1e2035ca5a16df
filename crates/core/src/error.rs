//! Error taxonomy for the transcription pipeline.

use thiserror::Error;

/// Closed error taxonomy for the pipeline. Each variant carries a
/// human-readable message; some carry suggestions a CLI can surface directly.
#[derive(Debug, Error)]
pub enum BoutError {
    #[error("FFmpeg not found. Please install FFmpeg to process videos.")]
    FfmpegNotFound,

    #[error("Failed to extract audio from {video_path}: {detail}")]
    AudioExtraction { video_path: String, detail: String },

    #[error("Audio chunking failed: {0}")]
    Chunking(String),

    #[error("Failed to load transcription model '{model}': {detail}")]
    ModelLoad { model: String, detail: String },

    #[error("GPU memory exhausted during transcription")]
    OutOfMemory,

    #[error("Chunk {index}: {detail}")]
    Transcription { index: usize, detail: String },

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Video file not found: {0}")]
    VideoNotFound(String),

    #[error("Pipeline failed: {0}")]
    Pipeline(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl BoutError {
    /// User-actionable suggestions for the error, mirroring the host's
    /// practice of attaching remediation hints to domain errors.
    pub fn suggestions(&self) -> Vec<&'static str> {
        match self {
            BoutError::FfmpegNotFound => vec![
                "Ensure FFmpeg is installed: https://ffmpeg.org/download.html",
                "Add FFmpeg to your system PATH",
                "Or set FFMPEG_PATH environment variable",
            ],
            BoutError::OutOfMemory => vec![
                "Use a smaller transcription model",
                "Close other GPU-intensive applications",
                "Set BOUT_DEVICE=cpu to use CPU instead",
                "Reduce chunk size with BOUT_CHUNK_DURATION",
            ],
            BoutError::ModelLoad { .. } => vec![
                "Check your network connection if the model needs to be fetched",
                "Ensure you have enough disk space",
            ],
            BoutError::JobNotFound(_) => vec!["Check the job ID is correct"],
            _ => vec![],
        }
    }

    /// Whether this error class is fatal for the whole job (vs. recoverable
    /// in place, like OOM or diarization failure, which never become a
    /// `BoutError` at all).
    pub fn is_fatal(&self) -> bool {
        true
    }
}

pub type Result<T> = std::result::Result<T, BoutError>;
