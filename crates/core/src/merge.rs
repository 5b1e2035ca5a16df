//! Chunk merger: stitches per-chunk transcription segments back into one
//! timeline, discarding duplicate text produced by the chunk overlap.
//!
//! Two merge strategies are offered. `merge_segments` is the primary path:
//! each chunk is classified first/middle/last and its segments are kept or
//! dropped by comparing against `skip_until`/`cutoff` overlap boundaries,
//! with boundary-crossing segments decided by their midpoint — this never
//! modifies a kept segment's timestamps, only decides keep-or-drop.
//! `merge_text_simple` is a fallback for inputs that only carry merged text
//! with no segment timestamps: it finds the best approximate text overlap
//! between consecutive chunks' raw text by comparing trailing/leading
//! windows.

use crate::config::MergeConfig;
use crate::domain::{Chunk, TranscriptionSegment};

/// Merges completed chunks (chunks with `text.is_some()`) into one ordered
/// segment timeline plus the flattened transcript text. `chunks` need not
/// be pre-sorted; this sorts by `index` first.
///
/// A single completed chunk's text/segments pass through unchanged.
pub fn merge_segments(chunks: &[Chunk], overlap_seconds: f64) -> (String, Vec<TranscriptionSegment>) {
    let mut completed: Vec<&Chunk> = chunks.iter().filter(|c| c.text.is_some()).collect();
    completed.sort_by_key(|c| c.index);

    if completed.is_empty() {
        return (String::new(), Vec::new());
    }
    if completed.len() == 1 {
        return (completed[0].text.clone().unwrap_or_default(), completed[0].segments.clone());
    }

    let mut all_segments: Vec<TranscriptionSegment> = Vec::new();
    let mut text_parts: Vec<String> = Vec::new();
    let last = completed.len() - 1;

    for (i, chunk) in completed.iter().enumerate() {
        let kept = if i == 0 {
            filter_first_chunk(chunk, overlap_seconds)
        } else if i == last {
            filter_last_chunk(chunk)
        } else {
            filter_middle_chunk(chunk, overlap_seconds)
        };

        text_parts.push(kept.iter().map(|s| s.text.as_str()).collect::<Vec<_>>().join(" "));
        all_segments.extend(kept);
    }

    all_segments.sort_by(|a, b| a.start.partial_cmp(&b.start).unwrap_or(std::cmp::Ordering::Equal));

    let full_text = text_parts.join(" ");
    let full_text = full_text.split_whitespace().collect::<Vec<_>>().join(" ");

    (full_text, all_segments)
}

/// First chunk: everything up to the trailing overlap boundary.
fn filter_first_chunk(chunk: &Chunk, overlap_seconds: f64) -> Vec<TranscriptionSegment> {
    let cutoff = chunk.end_time - overlap_seconds;
    chunk
        .segments
        .iter()
        .filter(|seg| {
            if seg.end <= cutoff {
                true
            } else if seg.start < cutoff {
                seg.midpoint() < cutoff
            } else {
                false
            }
        })
        .cloned()
        .collect()
}

/// Last chunk: everything past the leading overlap boundary.
fn filter_last_chunk(chunk: &Chunk) -> Vec<TranscriptionSegment> {
    let skip_until = chunk.start_time + chunk.overlap_start;
    chunk
        .segments
        .iter()
        .filter(|seg| {
            if seg.start >= skip_until {
                true
            } else if seg.end > skip_until {
                seg.midpoint() >= skip_until
            } else {
                false
            }
        })
        .cloned()
        .collect()
}

/// Middle chunk: strictly within the overlap boundaries on both ends, or a
/// boundary-crossing segment whose midpoint still falls in range.
fn filter_middle_chunk(chunk: &Chunk, overlap_seconds: f64) -> Vec<TranscriptionSegment> {
    let skip_until = chunk.start_time + chunk.overlap_start;
    let cutoff = chunk.end_time - overlap_seconds;
    chunk
        .segments
        .iter()
        .filter(|seg| {
            if seg.start >= skip_until && seg.end <= cutoff {
                true
            } else {
                let midpoint = seg.midpoint();
                midpoint >= skip_until && midpoint <= cutoff
            }
        })
        .cloned()
        .collect()
}

/// Fallback merge for chunks that only carry flattened `text` (no
/// segments): finds the best overlap between the end of the accumulated
/// text and the start of the next chunk's text, and splices out the
/// duplicate. Falls back to plain concatenation when no overlap clears
/// `config.similarity_threshold`.
pub fn merge_text_simple(chunk_texts: &[String], config: &MergeConfig) -> String {
    if chunk_texts.is_empty() {
        return String::new();
    }

    let mut parts: Vec<String> = vec![chunk_texts[0].clone()];

    for text in &chunk_texts[1..] {
        let prev = parts.last().unwrap();
        let overlap_len = find_text_overlap(prev, text, config);
        let remainder: String = text.chars().skip(overlap_len).collect();
        parts.push(remainder);
    }

    let joined = parts.join(" ");
    joined.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Searches candidate overlap lengths from `min(max_search_len, |prev|,
/// |next|)` down past `search_step` in steps of `search_step`, scoring each
/// by [`similarity_ratio`] between the trailing window of `prev` and the
/// leading window of `next`, and returns the length of the best-scoring
/// candidate that clears `config.similarity_threshold` — preferring the
/// longest candidate on a tie, since lengths are tried longest-first and
/// only a strictly higher ratio replaces the current best. Returns 0 when
/// no candidate clears the threshold.
fn find_text_overlap(prev: &str, next: &str, config: &MergeConfig) -> usize {
    let prev_chars: Vec<char> = prev.chars().collect();
    let next_chars: Vec<char> = next.chars().collect();

    let start_len = config.max_search_len.min(prev_chars.len()).min(next_chars.len());
    if start_len <= config.search_step {
        return 0;
    }

    let mut best_overlap = 0;
    let mut best_ratio = 0.0;
    let mut len = start_len;

    while len > config.search_step {
        let candidate_prev: String = prev_chars[prev_chars.len() - len..].iter().collect();
        let candidate_next: String = next_chars[..len].iter().collect();
        let ratio = similarity_ratio(&candidate_prev, &candidate_next);

        if ratio > config.similarity_threshold && ratio > best_ratio {
            best_ratio = ratio;
            best_overlap = len;
        }

        len -= config.search_step;
    }

    best_overlap
}

/// A `difflib.SequenceMatcher.ratio()`-style similarity: `2*M / T` where
/// `M` is the number of matched characters found by repeatedly taking the
/// longest common substring of what remains, and `T` is the combined
/// length of both strings. No crate in this workspace's dependency set
/// reproduces this specific metric, so it's hand-rolled here.
fn similarity_ratio(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }

    let matches = matching_chars(&a, &b);
    (2 * matches) as f64 / (a.len() + b.len()) as f64
}

/// Longest-common-substring length, found greedily: take the single
/// longest common substring, then recurse on the left and right remainders
/// on both sides, summing the lengths. This mirrors the recursive
/// structure `SequenceMatcher` uses to accumulate matching blocks.
fn matching_chars(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let (len, a_start, b_start) = longest_common_substring(a, b);
    if len == 0 {
        return 0;
    }

    let left = matching_chars(&a[..a_start], &b[..b_start]);
    let right = matching_chars(&a[a_start + len..], &b[b_start + len..]);
    len + left + right
}

fn longest_common_substring(a: &[char], b: &[char]) -> (usize, usize, usize) {
    let mut best_len = 0;
    let mut best_a = 0;
    let mut best_b = 0;
    let mut prev_row = vec![0usize; b.len() + 1];

    for i in 0..a.len() {
        let mut cur_row = vec![0usize; b.len() + 1];
        for j in 0..b.len() {
            if a[i] == b[j] {
                cur_row[j + 1] = prev_row[j] + 1;
                if cur_row[j + 1] > best_len {
                    best_len = cur_row[j + 1];
                    best_a = i + 1 - best_len;
                    best_b = j + 1 - best_len;
                }
            }
        }
        prev_row = cur_row;
    }

    (best_len, best_a, best_b)
}
