//! Speaker diarization: an optional stage, gated on `HF_TOKEN` being
//! configured, that assigns a speaker label to each transcription segment
//! and then consolidates consecutive same-speaker segments.
//!
//! The diarization model itself (pyannote-style speaker turns) is outside
//! this workspace's scope — `DiarizationSegment` is the boundary a real
//! adapter would populate; `merge_with_transcription` and
//! `consolidate_segments` are pure functions over that boundary and are
//! fully testable without one.

use std::path::Path;

use async_trait::async_trait;

use crate::config::DiarizationConfig;
use crate::domain::TranscriptionSegment;

/// One speaker turn as reported by a diarization backend.
#[derive(Debug, Clone)]
pub struct DiarizationSegment {
    pub start: f64,
    pub end: f64,
    pub speaker: String,
}

/// The diarization backend boundary. Given the full extracted audio track,
/// returns the speaker turns found in it. Kept separate from
/// `merge_with_transcription`/`consolidate_segments` so those stay pure and
/// testable without a real backend behind this trait.
#[async_trait]
pub trait DiarizationProvider: Send + Sync {
    async fn diarize(&self, audio_path: &Path) -> std::result::Result<Vec<DiarizationSegment>, String>;
}

/// Whether diarization can run at all for this configuration.
pub fn is_available(config: &DiarizationConfig) -> bool {
    config.hf_token.as_deref().is_some_and(|t| !t.is_empty())
}

/// Reference `DiarizationProvider`: posts the extracted audio to a
/// HuggingFace-Inference-style endpoint authenticated with `HF_TOKEN`,
/// reusing the same `reqwest`-based external-call idiom as
/// [`crate::transcription::HttpTranscriber`]. A non-2xx response or a
/// malformed body is surfaced as a string error, which the orchestrator
/// treats as a non-fatal, logged diarization failure.
pub struct HttpDiarizationProvider {
    endpoint: String,
    token: String,
    client: reqwest::Client,
}

impl HttpDiarizationProvider {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(serde::Deserialize)]
struct HttpDiarizationTurn {
    start: f64,
    end: f64,
    speaker: String,
}

#[async_trait]
impl DiarizationProvider for HttpDiarizationProvider {
    async fn diarize(&self, audio_path: &Path) -> std::result::Result<Vec<DiarizationSegment>, String> {
        let bytes = tokio::fs::read(audio_path).await.map_err(|e| e.to_string())?;
        let file_name = audio_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "audio.wav".to_string());

        let part = reqwest::multipart::Part::bytes(bytes)
            .file_name(file_name)
            .mime_str("audio/wav")
            .map_err(|e| e.to_string())?;
        let form = reqwest::multipart::Form::new().part("audio", part);

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.token)
            .multipart(form)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(format!("{status}: {body}"));
        }

        let turns: Vec<HttpDiarizationTurn> = response.json().await.map_err(|e| e.to_string())?;
        Ok(turns
            .into_iter()
            .map(|t| DiarizationSegment { start: t.start, end: t.end, speaker: t.speaker })
            .collect())
    }
}

/// Assigns each transcription segment the speaker label of the
/// diarization turn it overlaps the most, by wall-clock time. A segment
/// with no overlapping turn gets a generic fallback label rather than
/// being left unassigned.
pub fn merge_with_transcription(
    segments: &[TranscriptionSegment],
    turns: &[DiarizationSegment],
) -> Vec<TranscriptionSegment> {
    segments
        .iter()
        .map(|seg| {
            let speaker = best_overlapping_speaker(seg, turns).unwrap_or_else(|| "SPEAKER_UNKNOWN".to_string());
            TranscriptionSegment {
                speaker: Some(speaker),
                ..seg.clone()
            }
        })
        .collect()
}

fn best_overlapping_speaker(seg: &TranscriptionSegment, turns: &[DiarizationSegment]) -> Option<String> {
    turns
        .iter()
        .map(|turn| {
            let overlap = (seg.end.min(turn.end) - seg.start.max(turn.start)).max(0.0);
            (overlap, turn)
        })
        .filter(|(overlap, _)| *overlap > 0.0)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal))
        .map(|(_, turn)| turn.speaker.clone())
}

/// Merges consecutive segments spoken by the same speaker when the gap
/// between them is at most `gap_threshold_seconds`, extending the earlier
/// segment's end time and concatenating text rather than keeping many
/// fragments from one continuous turn.
pub fn consolidate_segments(segments: &[TranscriptionSegment], gap_threshold_seconds: f64) -> Vec<TranscriptionSegment> {
    let mut result: Vec<TranscriptionSegment> = Vec::new();

    for seg in segments {
        if let Some(last) = result.last_mut() {
            if last.speaker == seg.speaker && seg.start - last.end <= gap_threshold_seconds {
                last.end = seg.end;
                last.text.push(' ');
                last.text.push_str(&seg.text);
                continue;
            }
        }
        result.push(seg.clone());
    }

    result
}
