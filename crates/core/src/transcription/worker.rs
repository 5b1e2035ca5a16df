//! Transcription worker: calls the model for one chunk, retries on OOM,
//! falls back to CPU, and rebases chunk-relative segment times onto the
//! original-audio timeline.

use chrono::Utc;

use crate::config::TranscriptionConfig;
use crate::domain::{Chunk, ChunkStatus, TranscriptionSegment};
use crate::error::{BoutError, Result};

use super::model::{DeviceProbe, ModelError, ResidentDevice, Transcriber};

/// GPU is only selected in `auto` mode when it reports at least this much
/// free memory.
const AUTO_DEVICE_MIN_FREE_MB: u64 = 1024;

pub struct TranscriptionWorker<T: Transcriber> {
    transcriber: T,
    config: TranscriptionConfig,
}

impl<T: Transcriber> TranscriptionWorker<T> {
    pub fn new(transcriber: T, config: TranscriptionConfig) -> Self {
        Self { transcriber, config }
    }

    /// Resolves `auto` to a concrete device once, at worker start, then
    /// lazily loads the model onto it on first use.
    async fn ensure_loaded(&mut self) -> Result<()> {
        if self.transcriber.is_loaded() {
            return Ok(());
        }
        let device = DeviceProbe::select(self.config.device, AUTO_DEVICE_MIN_FREE_MB).await;
        self.transcriber
            .load(device)
            .await
            .map_err(|e| BoutError::ModelLoad {
                model: self.config.model.clone(),
                detail: e.to_string(),
            })
    }

    /// Transcribes a single chunk. On success the chunk is mutated to
    /// `Completed` with rebased segments; on failure it is mutated to
    /// `Failed` with `error` set and a `TranscriptionError` is returned.
    ///
    /// OOM is retried up to `max_retries` times with a cache reset between
    /// attempts; the final retry falls back to a CPU-resident model for
    /// this chunk only, then reloads the prior device for subsequent calls.
    pub async fn transcribe_chunk(&mut self, chunk: &mut Chunk) -> Result<()> {
        let chunk_path = chunk.file_path.clone().ok_or_else(|| BoutError::Transcription {
            index: chunk.index,
            detail: "chunk has no file_path".to_string(),
        })?;

        self.ensure_loaded().await?;
        chunk.status = ChunkStatus::Processing;

        let max_retries = self.config.max_retries.max(1);
        let mut last_err: Option<ModelError> = None;

        for attempt in 0..max_retries {
            self.transcriber.reset_cache().await;

            match self.transcriber.transcribe(&chunk_path, &self.config.language).await {
                Ok(output) => {
                    self.apply_output(chunk, output);
                    return Ok(());
                }
                Err(ModelError::OutOfMemory) => {
                    tracing::warn!(
                        chunk = chunk.index,
                        attempt = attempt + 1,
                        max_retries,
                        "OOM during transcription, retrying"
                    );
                    last_err = Some(ModelError::OutOfMemory);
                    self.transcriber.reset_cache().await;

                    if attempt == max_retries - 1 {
                        if self.transcriber.resident_device() == Some(ResidentDevice::Cuda) {
                            return self.fallback_to_cpu(chunk).await;
                        }
                        break;
                    }
                }
                Err(other) => {
                    chunk.status = ChunkStatus::Failed;
                    chunk.error = Some(other.to_string());
                    return Err(BoutError::Transcription {
                        index: chunk.index,
                        detail: other.to_string(),
                    });
                }
            }
        }

        let detail = last_err.map(|e| e.to_string()).unwrap_or_else(|| "max retries exceeded".to_string());
        chunk.status = ChunkStatus::Failed;
        chunk.error = Some(detail.clone());
        Err(BoutError::Transcription { index: chunk.index, detail })
    }

    /// Unloads the GPU model, loads a CPU model, transcribes this chunk
    /// only, unloads the CPU model, then reloads the GPU model so
    /// subsequent chunks keep using it.
    async fn fallback_to_cpu(&mut self, chunk: &mut Chunk) -> Result<()> {
        tracing::warn!(chunk = chunk.index, "falling back to CPU for this chunk");
        let chunk_path = chunk.file_path.clone().expect("checked by caller");

        self.transcriber.unload().await;
        self.transcriber
            .load(ResidentDevice::Cpu)
            .await
            .map_err(|e| BoutError::ModelLoad {
                model: self.config.model.clone(),
                detail: e.to_string(),
            })?;

        let result = self.transcriber.transcribe(&chunk_path, &self.config.language).await;

        self.transcriber.unload().await;
        self.transcriber
            .load(ResidentDevice::Cuda)
            .await
            .map_err(|e| BoutError::ModelLoad {
                model: self.config.model.clone(),
                detail: e.to_string(),
            })?;

        match result {
            Ok(output) => {
                self.apply_output(chunk, output);
                Ok(())
            }
            Err(e) => {
                chunk.status = ChunkStatus::Failed;
                chunk.error = Some(e.to_string());
                Err(BoutError::Transcription { index: chunk.index, detail: e.to_string() })
            }
        }
    }

    /// Rebases chunk-relative segment times onto the original-audio
    /// timeline, trims text, discards empty segments.
    fn apply_output(&self, chunk: &mut Chunk, output: super::model::ModelOutput) {
        let segments: Vec<TranscriptionSegment> = output
            .segments
            .into_iter()
            .filter_map(|seg| {
                let text = seg.text.trim().to_string();
                if text.is_empty() {
                    return None;
                }
                Some(TranscriptionSegment {
                    start: chunk.start_time + seg.start,
                    end: chunk.start_time + seg.end,
                    text,
                    speaker: None,
                })
            })
            .collect();

        chunk.text = Some(output.text.trim().to_string());
        chunk.segments = segments;
        chunk.status = ChunkStatus::Completed;
        chunk.completed_at = Some(Utc::now());
        chunk.error = None;
    }

    /// Transcribes every chunk in index order, skipping ones already
    /// `Completed` (resume semantics). `checkpoint_cb` is invoked before
    /// `progress_cb` for the chunk just finished — this ordering is
    /// required so observers never see progress for work not yet
    /// persisted. An accelerator-cache reset follows each chunk.
    ///
    /// `cancel`, when set, is polled before starting each not-yet-completed
    /// chunk — the sole cancellation point in the pipeline. Returns `true`
    /// if cancelled this way (the chunk about to start is left `Pending`),
    /// `false` on ordinary completion.
    pub async fn transcribe_all(
        &mut self,
        chunks: &mut [Chunk],
        mut checkpoint_cb: impl FnMut(&Chunk),
        mut progress_cb: impl FnMut(usize, usize),
        cancel: Option<&std::sync::atomic::AtomicBool>,
    ) -> Result<bool> {
        let total = chunks.len();

        for i in 0..total {
            if chunks[i].status == ChunkStatus::Completed {
                progress_cb(i + 1, total);
                continue;
            }

            if cancel.is_some_and(|c| c.load(std::sync::atomic::Ordering::Relaxed)) {
                return Ok(true);
            }

            self.transcribe_chunk(&mut chunks[i])?;
            checkpoint_cb(&chunks[i]);
            progress_cb(i + 1, total);
            self.transcriber.reset_cache().await;
        }

        Ok(false)
    }
}
