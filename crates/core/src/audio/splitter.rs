//! Chunk splitter: cuts the extracted WAV into one file per planned chunk.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::config::AudioConfig;
use crate::domain::Chunk;
use crate::error::{BoutError, Result};
use crate::paths::FfmpegTools;

pub struct ChunkSplitter {
    tools: FfmpegTools,
    audio: AudioConfig,
}

impl ChunkSplitter {
    pub fn new(tools: FfmpegTools, audio: AudioConfig) -> Self {
        Self { tools, audio }
    }

    /// Splits `audio_path` into one file per chunk under `output_dir`,
    /// setting each chunk's `file_path`. Single-chunk plans are expected to
    /// bypass this entirely and reuse the extracted WAV (see the
    /// orchestrator).
    pub async fn split(
        &self,
        audio_path: &Path,
        output_dir: &Path,
        chunks: &mut [Chunk],
        mut progress_cb: impl FnMut(usize, usize),
    ) -> Result<()> {
        std::fs::create_dir_all(output_dir)?;
        let total = chunks.len();

        for (i, chunk) in chunks.iter_mut().enumerate() {
            let chunk_path = output_dir.join(format!("chunk_{:03}.wav", chunk.index));
            self.extract_chunk(audio_path, &chunk_path, chunk.start_time, chunk.duration())
                .await
                .map_err(|e| BoutError::Chunking(format!("chunk {}: {e}", chunk.index)))?;
            chunk.file_path = Some(chunk_path);
            progress_cb(i + 1, total);
        }

        Ok(())
    }

    async fn extract_chunk(
        &self,
        audio_path: &Path,
        output_path: &Path,
        start: f64,
        duration: f64,
    ) -> Result<()> {
        let output = Command::new(&self.tools.ffmpeg_path)
            .arg("-y")
            .arg("-ss")
            .arg(start.to_string())
            .arg("-i")
            .arg(audio_path)
            .arg("-t")
            .arg(duration.to_string())
            .arg("-acodec")
            .arg(self.audio.codec)
            .arg("-ar")
            .arg(self.audio.sample_rate.to_string())
            .arg("-ac")
            .arg(self.audio.channels.to_string())
            .arg(output_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await?;

        if !output.status.success() {
            return Err(BoutError::Chunking(format!(
                "ffmpeg failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        if !output_path.exists() {
            return Err(BoutError::Chunking(format!(
                "chunk file not created: {}",
                output_path.display()
            )));
        }

        Ok(())
    }
}
