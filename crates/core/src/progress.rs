//! Weighted overall-progress tracking across pipeline stages.
//!
//! Each stage contributes a fixed share of the overall `[0, 1]` progress
//! bar; within a stage, progress is the fraction of that stage's declared
//! work (e.g. chunks transcribed) completed so far. The TRANSCRIBE stage
//! additionally exposes chunk-aware status text since it dominates total
//! runtime.

use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Extract,
    Chunk,
    Transcribe,
    Merge,
    Diarize,
    Generate,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Extract => "Extracting audio",
            Stage::Chunk => "Splitting into chunks",
            Stage::Transcribe => "Transcribing",
            Stage::Merge => "Merging transcripts",
            Stage::Diarize => "Identifying speakers",
            Stage::Generate => "Generating document",
        }
    }

    fn weight(&self) -> f64 {
        match self {
            Stage::Extract => 0.10,
            Stage::Chunk => 0.05,
            Stage::Transcribe => 0.50,
            Stage::Merge => 0.05,
            Stage::Diarize => 0.15,
            Stage::Generate => 0.15,
        }
    }

    const ALL: [Stage; 6] = [
        Stage::Extract,
        Stage::Chunk,
        Stage::Transcribe,
        Stage::Merge,
        Stage::Diarize,
        Stage::Generate,
    ];
}

#[derive(Debug, Clone, Copy, Default)]
struct StageProgress {
    /// Total units of work. `1.0` for stages reported as a bare fraction
    /// (extract's ffmpeg progress); a chunk count for stages reported by
    /// count (chunk splitting, transcription).
    total: f64,
    completed: f64,
}

impl StageProgress {
    fn fraction(&self) -> f64 {
        if self.total <= 0.0 {
            0.0
        } else {
            (self.completed / self.total).min(1.0)
        }
    }
}

/// Fans progress updates out to a single subscriber — matching the
/// single-writer-of-job-state shape of the orchestrator that owns this
/// tracker.
pub struct ProgressTracker {
    stages: HashMap<Stage, StageProgress>,
    current: Option<Stage>,
    callback: Option<Box<dyn FnMut(f64, String) + Send>>,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self {
            stages: HashMap::new(),
            current: None,
            callback: None,
        }
    }

    pub fn on_progress(&mut self, callback: impl FnMut(f64, String) + Send + 'static) {
        self.callback = Some(Box::new(callback));
    }

    /// Marks `stage` as started, with `total` units of work (e.g. chunk
    /// count for TRANSCRIBE; `1.0` for stages reported as a bare fraction).
    pub fn start_stage(&mut self, stage: Stage, total: f64) {
        self.current = Some(stage);
        self.stages.insert(stage, StageProgress { total: total.max(1.0), completed: 0.0 });
        self.emit();
    }

    /// Updates the amount of completed work within `stage` — a fraction in
    /// `[0, 1]` for bare-fraction stages, or a unit count otherwise.
    pub fn update_stage(&mut self, stage: Stage, completed: f64) {
        if let Some(progress) = self.stages.get_mut(&stage) {
            progress.completed = completed.min(progress.total);
        }
        self.emit();
    }

    /// Forces a stage to 100%, used when a stage is skipped (e.g.
    /// diarization without an HF token) so its weight still counts toward
    /// overall progress.
    pub fn complete_stage(&mut self, stage: Stage) {
        let progress = self.stages.entry(stage).or_insert(StageProgress { total: 1.0, completed: 0.0 });
        progress.completed = progress.total;
        self.emit();
    }

    pub fn complete_chunk(&mut self, stage: Stage) {
        if let Some(progress) = self.stages.get_mut(&stage) {
            progress.completed = (progress.completed + 1.0).min(progress.total);
        }
        self.emit();
    }

    pub fn set_chunks(&mut self, stage: Stage, total: usize) {
        self.stages.insert(stage, StageProgress { total: (total.max(1)) as f64, completed: 0.0 });
    }

    /// Weighted sum of each stage's fractional completion.
    pub fn overall_progress(&self) -> f64 {
        Stage::ALL
            .iter()
            .map(|s| self.stages.get(s).map(|p| p.fraction()).unwrap_or(0.0) * s.weight())
            .sum()
    }

    pub fn status_text(&self) -> String {
        match self.current {
            Some(Stage::Transcribe) => {
                let p = self.stages.get(&Stage::Transcribe).copied().unwrap_or_default();
                format!("Transcribing chunk {}/{}", p.completed as usize, p.total as usize)
            }
            Some(stage) => stage.label().to_string(),
            None => "Idle".to_string(),
        }
    }

    fn emit(&mut self) {
        let progress = self.overall_progress();
        let text = self.status_text();
        if let Some(cb) = self.callback.as_mut() {
            cb(progress, text);
        }
    }
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_weights_sum_to_one() {
        let sum: f64 = Stage::ALL.iter().map(|s| s.weight()).sum();
        assert!((sum - 1.0).abs() < 1e-9);
    }

    #[test]
    fn overall_progress_accumulates_across_stages() {
        let mut tracker = ProgressTracker::new();
        tracker.start_stage(Stage::Extract, 1.0);
        tracker.update_stage(Stage::Extract, 1.0);
        assert!((tracker.overall_progress() - 0.10).abs() < 1e-9);

        tracker.start_stage(Stage::Chunk, 1.0);
        tracker.complete_stage(Stage::Chunk);
        assert!((tracker.overall_progress() - 0.15).abs() < 1e-9);

        tracker.start_stage(Stage::Transcribe, 4.0);
        tracker.update_stage(Stage::Transcribe, 2.0);
        assert!((tracker.overall_progress() - (0.15 + 0.25)).abs() < 1e-9);
    }

    #[test]
    fn transcribe_status_text_is_chunk_aware() {
        let mut tracker = ProgressTracker::new();
        tracker.start_stage(Stage::Transcribe, 5.0);
        tracker.update_stage(Stage::Transcribe, 2.0);
        assert_eq!(tracker.status_text(), "Transcribing chunk 2/5");
    }

    #[test]
    fn skipped_stage_still_counts_full_weight() {
        let mut tracker = ProgressTracker::new();
        for stage in Stage::ALL {
            tracker.complete_stage(stage);
        }
        assert!((tracker.overall_progress() - 1.0).abs() < 1e-9);
    }
}
