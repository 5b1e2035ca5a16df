//! Pipeline configuration.
//!
//! One immutable [`Config`] value is built once, from defaults overridden by
//! environment variables, and threaded through the orchestrator explicitly —
//! there is no global singleton.

use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub channels: u16,
    pub codec: &'static str,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16000,
            channels: 1,
            codec: "pcm_s16le",
        }
    }
}

#[derive(Debug, Clone)]
pub struct ChunkConfig {
    pub duration_seconds: u32,
    pub overlap_seconds: u32,
    pub min_chunk_seconds: u32,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            duration_seconds: 300,
            overlap_seconds: 10,
            min_chunk_seconds: 30,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Auto,
    Cuda,
    Cpu,
}

impl Device {
    fn from_str(s: &str) -> Self {
        match s.to_ascii_lowercase().as_str() {
            "cuda" => Device::Cuda,
            "cpu" => Device::Cpu,
            _ => Device::Auto,
        }
    }
}

#[derive(Debug, Clone)]
pub struct TranscriptionConfig {
    pub model: String,
    pub language: String,
    pub device: Device,
    pub max_retries: u32,
    /// Local inference endpoint `HttpTranscriber` posts chunk audio to.
    pub endpoint: String,
}

impl Default for TranscriptionConfig {
    fn default() -> Self {
        Self {
            model: "medium".to_string(),
            language: "en".to_string(),
            device: Device::Auto,
            max_retries: 3,
            endpoint: "http://127.0.0.1:8008/v1/transcribe".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DiarizationConfig {
    pub hf_token: Option<String>,
    pub gap_threshold_seconds: f64,
    /// HuggingFace-Inference-style endpoint `HttpDiarizationProvider` posts
    /// the extracted audio to.
    pub endpoint: String,
}

impl Default for DiarizationConfig {
    fn default() -> Self {
        Self {
            hf_token: None,
            gap_threshold_seconds: 1.0,
            endpoint: "https://api-inference.huggingface.co/models/pyannote/speaker-diarization".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MergeConfig {
    /// Similarity threshold above which a text-only overlap candidate is accepted.
    pub similarity_threshold: f64,
    /// Step size (characters) used while searching for the best overlap length.
    pub search_step: usize,
    /// Upper bound on the searched overlap length.
    pub max_search_len: usize,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            similarity_threshold: 0.80,
            search_step: 10,
            max_search_len: 200,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub level: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Top-level, immutable pipeline configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub base_dir: PathBuf,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub jobs_dir: PathBuf,

    pub audio: AudioConfig,
    pub chunk: ChunkConfig,
    pub transcription: TranscriptionConfig,
    pub diarization: DiarizationConfig,
    pub merge: MergeConfig,
    pub log: LogConfig,

    pub ffmpeg_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_base_dir(Self::default_base_dir())
    }
}

impl Config {
    fn default_base_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("bout")
    }

    pub fn from_base_dir(base_dir: PathBuf) -> Self {
        Self {
            input_dir: base_dir.join("input"),
            output_dir: base_dir.join("output"),
            temp_dir: base_dir.join("temp"),
            logs_dir: base_dir.join("logs"),
            jobs_dir: base_dir.join("jobs"),
            base_dir,
            audio: AudioConfig::default(),
            chunk: ChunkConfig::default(),
            transcription: TranscriptionConfig::default(),
            diarization: DiarizationConfig::default(),
            merge: MergeConfig::default(),
            log: LogConfig::default(),
            ffmpeg_path: None,
        }
    }

    /// Build configuration from defaults overridden by environment variables.
    /// Construction-time is the only place environment is consulted.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("BOUT_MODEL") {
            self.transcription.model = model;
        }
        if let Ok(language) = std::env::var("BOUT_LANGUAGE") {
            self.transcription.language = language;
        }
        if let Ok(device) = std::env::var("BOUT_DEVICE") {
            self.transcription.device = Device::from_str(&device);
        }
        if let Ok(level) = std::env::var("BOUT_LOG_LEVEL") {
            self.log.level = level;
        }
        if let Ok(duration) = std::env::var("BOUT_CHUNK_DURATION") {
            if let Ok(secs) = duration.parse::<u32>() {
                self.chunk.duration_seconds = secs;
            }
        }
        if let Ok(ffmpeg_path) = std::env::var("FFMPEG_PATH") {
            self.ffmpeg_path = Some(PathBuf::from(ffmpeg_path));
        }
        if let Ok(token) = std::env::var("HF_TOKEN") {
            if !token.is_empty() {
                self.diarization.hf_token = Some(token);
            }
        }
    }

    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for dir in [
            &self.input_dir,
            &self.output_dir,
            &self.temp_dir,
            &self.logs_dir,
            &self.jobs_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }
        Ok(())
    }

    pub fn chunks_dir_for(&self, job_id: &str) -> PathBuf {
        self.temp_dir.join(format!("{job_id}_chunks"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_defaults() {
        std::env::set_var("BOUT_CHUNK_DURATION", "120");
        std::env::set_var("BOUT_DEVICE", "cpu");
        let config = Config::from_env();
        assert_eq!(config.chunk.duration_seconds, 120);
        assert_eq!(config.transcription.device, Device::Cpu);
        std::env::remove_var("BOUT_CHUNK_DURATION");
        std::env::remove_var("BOUT_DEVICE");
    }

    #[test]
    fn unset_device_defaults_to_auto() {
        std::env::remove_var("BOUT_DEVICE");
        let config = Config::from_env();
        assert_eq!(config.transcription.device, Device::Auto);
    }
}
