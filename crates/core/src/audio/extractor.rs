//! Audio extractor: invokes `ffmpeg` to decode a video into 16 kHz/mono PCM
//! WAV, reporting monotonically non-decreasing progress in `[0, 1]`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;

use crate::config::AudioConfig;
use crate::error::{BoutError, Result};
use crate::paths::FfmpegTools;

pub struct AudioExtractor {
    tools: FfmpegTools,
    audio: AudioConfig,
}

impl AudioExtractor {
    pub fn new(tools: FfmpegTools, audio: AudioConfig) -> Self {
        Self { tools, audio }
    }

    /// Extracts `video_path` into `temp/<stem>_audio.wav`, invoking
    /// `progress_cb` with a fraction in `[0, 1]` as ffmpeg reports
    /// `out_time=`. Duration is probed once via ffprobe up front.
    pub async fn extract(
        &self,
        video_path: &Path,
        temp_dir: &Path,
        mut progress_cb: impl FnMut(f64),
    ) -> Result<PathBuf> {
        let stem = video_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio".to_string());
        let output_path = temp_dir.join(format!("{stem}_audio.wav"));
        std::fs::create_dir_all(temp_dir)?;

        let duration = self.tools.probe_duration(video_path).await.unwrap_or(0.0);

        let mut cmd = Command::new(&self.tools.ffmpeg_path);
        cmd.arg("-y")
            .arg("-i")
            .arg(video_path)
            .arg("-vn")
            .arg("-acodec")
            .arg(self.audio.codec)
            .arg("-ar")
            .arg(self.audio.sample_rate.to_string())
            .arg("-ac")
            .arg(self.audio.channels.to_string())
            .arg("-progress")
            .arg("pipe:1")
            .arg(&output_path)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd.spawn().map_err(|e| BoutError::AudioExtraction {
            video_path: video_path.display().to_string(),
            detail: e.to_string(),
        })?;

        let stdout = child.stdout.take().expect("stdout piped");
        let stderr = child.stderr.take().expect("stderr piped");

        // ffmpeg's own status banner goes to stderr throughout the run, not
        // just at the end; it has to be drained concurrently with stdout or
        // ffmpeg blocks on a full pipe buffer and progress stalls with it.
        let stderr_task = tokio::spawn(async move {
            let mut lines = BufReader::new(stderr).lines();
            let mut collected = String::new();
            while let Ok(Some(line)) = lines.next_line().await {
                collected.push_str(&line);
                collected.push('\n');
            }
            collected
        });

        let mut lines = BufReader::new(stdout).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if let Some(time_str) = line.strip_prefix("out_time=") {
                if let Some(seconds) = parse_ffmpeg_time(time_str) {
                    if duration > 0.0 {
                        progress_cb((seconds / duration).min(1.0));
                    }
                }
            }
        }

        let status = child.wait().await.map_err(|e| BoutError::AudioExtraction {
            video_path: video_path.display().to_string(),
            detail: e.to_string(),
        })?;
        let stderr_output = stderr_task.await.unwrap_or_default();

        if !status.success() {
            return Err(BoutError::AudioExtraction {
                video_path: video_path.display().to_string(),
                detail: stderr_output,
            });
        }

        if !output_path.exists() {
            return Err(BoutError::AudioExtraction {
                video_path: video_path.display().to_string(),
                detail: "output file not created".to_string(),
            });
        }

        progress_cb(1.0);
        Ok(output_path)
    }

    pub fn cleanup(&self, audio_path: &Path) {
        if audio_path.exists() {
            if let Err(e) = std::fs::remove_file(audio_path) {
                tracing::warn!("could not clean up {}: {e}", audio_path.display());
            }
        }
    }
}

/// Parses `HH:MM:SS.cs` into seconds.
fn parse_ffmpeg_time(time_str: &str) -> Option<f64> {
    let parts: Vec<&str> = time_str.trim().split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let hours: f64 = parts[0].parse().ok()?;
    let minutes: f64 = parts[1].parse().ok()?;
    let seconds: f64 = parts[2].parse().ok()?;
    Some(hours * 3600.0 + minutes * 60.0 + seconds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_well_formed_timestamp() {
        assert_eq!(parse_ffmpeg_time("00:05:32.45"), Some(332.45));
    }

    #[test]
    fn rejects_malformed_timestamp() {
        assert_eq!(parse_ffmpeg_time("not-a-time"), None);
    }
}
