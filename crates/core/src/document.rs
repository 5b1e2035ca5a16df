//! The document writer contract: turns a merged transcript into the final
//! output file. `DocumentWriter` is the seam so future formats (Markdown,
//! SRT) can be added without touching the orchestrator.

use std::path::Path;

use crate::domain::TranscriptionSegment;
use crate::error::Result;

pub trait DocumentWriter: Send + Sync {
    /// Writes `text` and `segments` to `output_path`, creating parent
    /// directories as needed.
    fn write(&self, output_path: &Path, text: &str, segments: &[TranscriptionSegment]) -> Result<()>;

    /// The file extension this writer produces, without the leading dot.
    fn extension(&self) -> &'static str;
}

/// Reference writer: plain text, one paragraph of merged transcript text,
/// followed by an optional timestamped-and-speaker-labeled segment listing.
pub struct PlainTextWriter {
    pub include_timestamps: bool,
}

impl PlainTextWriter {
    pub fn new(include_timestamps: bool) -> Self {
        Self { include_timestamps }
    }
}

impl DocumentWriter for PlainTextWriter {
    fn write(&self, output_path: &Path, text: &str, segments: &[TranscriptionSegment]) -> Result<()> {
        if let Some(parent) = output_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut out = String::new();
        out.push_str(text.trim());
        out.push('\n');

        if self.include_timestamps && !segments.is_empty() {
            out.push_str("\n---\n\n");
            for seg in segments {
                let speaker = seg.speaker.as_deref().map(|s| format!("{s}: ")).unwrap_or_default();
                out.push_str(&format!(
                    "[{}] {}{}\n",
                    format_timestamp(seg.start),
                    speaker,
                    seg.text
                ));
            }
        }

        std::fs::write(output_path, out)?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "txt"
    }
}

fn format_timestamp(seconds: f64) -> String {
    let total = seconds.max(0.0) as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;
    format!("{hours:02}:{minutes:02}:{secs:02}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn writes_plain_text_without_timestamps() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let writer = PlainTextWriter::new(false);
        writer.write(&path, "hello world", &[]).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "hello world\n");
    }

    #[test]
    fn includes_timestamped_segments_when_requested() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let writer = PlainTextWriter::new(true);
        let segments = vec![TranscriptionSegment {
            start: 65.0,
            end: 70.0,
            text: "hi there".to_string(),
            speaker: Some("SPEAKER_00".to_string()),
        }];
        writer.write(&path, "hi there", &segments).unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("[00:01:05] SPEAKER_00: hi there"));
    }

    #[test]
    fn formats_timestamp_with_hours() {
        assert_eq!(format_timestamp(3661.0), "01:01:01");
    }
}
