//! Locating external binaries and normalizing file paths.
//!
//! Mirrors the lookup order the pipeline relies on: `PATH` first, then a
//! platform-specific list of common install locations.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{BoutError, Result};

#[cfg(windows)]
const FFMPEG_FALLBACKS: &[&str] = &[
    "C:/ffmpeg/ffmpeg.exe",
    "C:/ffmpeg/bin/ffmpeg.exe",
    "C:/Program Files/ffmpeg/bin/ffmpeg.exe",
];
#[cfg(windows)]
const FFPROBE_FALLBACKS: &[&str] = &[
    "C:/ffmpeg/ffprobe.exe",
    "C:/ffmpeg/bin/ffprobe.exe",
    "C:/Program Files/ffmpeg/bin/ffprobe.exe",
];

#[cfg(not(windows))]
const FFMPEG_FALLBACKS: &[&str] = &["/usr/local/bin/ffmpeg", "/usr/bin/ffmpeg", "/opt/homebrew/bin/ffmpeg"];
#[cfg(not(windows))]
const FFPROBE_FALLBACKS: &[&str] = &["/usr/local/bin/ffprobe", "/usr/bin/ffprobe", "/opt/homebrew/bin/ffprobe"];

fn which(bin: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(bin);
        candidate.is_file().then_some(candidate)
    })
}

/// Locates `ffmpeg` and `ffprobe`, honoring `FFMPEG_PATH` for the former.
#[derive(Clone)]
pub struct FfmpegTools {
    pub ffmpeg_path: PathBuf,
    pub ffprobe_path: PathBuf,
}

impl FfmpegTools {
    /// Searches `PATH`, `FFMPEG_PATH`, then common install locations.
    pub fn locate(ffmpeg_path_override: Option<&Path>) -> Result<Self> {
        let ffmpeg_path = ffmpeg_path_override
            .map(Path::to_path_buf)
            .or_else(|| which("ffmpeg"))
            .or_else(|| FFMPEG_FALLBACKS.iter().map(PathBuf::from).find(|p| p.exists()))
            .ok_or(BoutError::FfmpegNotFound)?;

        let ffprobe_path = which("ffprobe")
            .or_else(|| FFPROBE_FALLBACKS.iter().map(PathBuf::from).find(|p| p.exists()))
            .or_else(|| {
                // ffprobe conventionally lives beside ffmpeg
                let sibling = ffmpeg_path.parent()?.join(if cfg!(windows) {
                    "ffprobe.exe"
                } else {
                    "ffprobe"
                });
                sibling.exists().then_some(sibling)
            })
            .ok_or(BoutError::FfmpegNotFound)?;

        Ok(Self {
            ffmpeg_path,
            ffprobe_path,
        })
    }

    /// Video/audio duration in seconds via `ffprobe -show_entries format=duration`.
    pub async fn probe_duration(&self, input: &Path) -> Result<f64> {
        let output = tokio::time::timeout(
            std::time::Duration::from_secs(30),
            Command::new(&self.ffprobe_path)
                .args([
                    "-v",
                    "error",
                    "-show_entries",
                    "format=duration",
                    "-of",
                    "default=noprint_wrappers=1:nokey=1",
                ])
                .arg(input)
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .output(),
        )
        .await
        .map_err(|_| BoutError::AudioExtraction {
            video_path: input.display().to_string(),
            detail: "ffprobe timed out".to_string(),
        })?
        .map_err(|e| BoutError::AudioExtraction {
            video_path: input.display().to_string(),
            detail: e.to_string(),
        })?;

        if !output.status.success() {
            return Err(BoutError::AudioExtraction {
                video_path: input.display().to_string(),
                detail: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        String::from_utf8_lossy(&output.stdout)
            .trim()
            .parse::<f64>()
            .map_err(|_| BoutError::AudioExtraction {
                video_path: input.display().to_string(),
                detail: "ffprobe returned a non-numeric duration".to_string(),
            })
    }
}

/// Normalizes a path for cross-platform use (currently a thin no-op hook,
/// kept as a seam for Windows UNC/long-path handling).
pub fn normalize(path: &Path) -> PathBuf {
    path.to_path_buf()
}
