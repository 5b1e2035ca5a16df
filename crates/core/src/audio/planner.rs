//! Chunk planner: a pure function of `duration`, `chunk_duration`, `overlap`
//! and `min_chunk` that computes overlapping chunk windows satisfying the
//! data-model invariants.

use crate::domain::Chunk;

/// Computes chunk boundaries for an audio track of the given `duration`.
///
/// Edge cases: `duration <= 0` yields an empty plan; `duration <=
/// chunk_duration` yields exactly one chunk `[0, duration]`; a trailing
/// remainder shorter than `min_chunk` is absorbed into the prior chunk's
/// `end_time` rather than becoming its own short chunk — unconditionally,
/// even if that makes the prior chunk longer than `chunk_duration`.
pub fn plan_chunks(duration: f64, chunk_duration: f64, overlap: f64, min_chunk: f64) -> Vec<Chunk> {
    if duration <= 0.0 {
        return Vec::new();
    }

    if duration <= chunk_duration {
        return vec![Chunk::new(0, 0.0, duration, 0.0)];
    }

    let mut chunks = Vec::new();
    let effective_step = chunk_duration - overlap;
    let mut start_time = 0.0;
    let mut index = 0usize;

    loop {
        if start_time >= duration {
            break;
        }

        let remaining = duration - start_time;
        if remaining < min_chunk && index > 0 {
            if let Some(last) = chunks.last_mut() {
                let last: &mut Chunk = last;
                last.end_time = duration;
            }
            break;
        }

        let end_time = (start_time + chunk_duration).min(duration);
        let overlap_start = if index > 0 { overlap } else { 0.0 };

        chunks.push(Chunk::new(index, start_time, end_time, overlap_start));

        start_time += effective_step;
        index += 1;
    }

    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_duration_yields_empty_plan() {
        assert!(plan_chunks(0.0, 300.0, 10.0, 30.0).is_empty());
    }

    #[test]
    fn negative_duration_yields_empty_plan() {
        assert!(plan_chunks(-5.0, 300.0, 10.0, 30.0).is_empty());
    }

    #[test]
    fn duration_shorter_than_chunk_is_single_chunk() {
        let chunks = plan_chunks(250.0, 300.0, 10.0, 30.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_time, 0.0);
        assert_eq!(chunks[0].end_time, 250.0);
        assert_eq!(chunks[0].overlap_start, 0.0);
    }

    #[test]
    fn duration_equal_to_chunk_duration_is_single_chunk() {
        let chunks = plan_chunks(300.0, 300.0, 10.0, 30.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].end_time, 300.0);
    }

    #[test]
    fn scenario_two_chunks() {
        // duration=600, cd=300, ov=10 -> [0,300],[290,600]
        let chunks = plan_chunks(600.0, 300.0, 10.0, 30.0);
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].start_time, 0.0);
        assert_eq!(chunks[0].end_time, 300.0);
        assert_eq!(chunks[0].overlap_start, 0.0);
        assert_eq!(chunks[1].start_time, 290.0);
        assert_eq!(chunks[1].end_time, 600.0);
        assert_eq!(chunks[1].overlap_start, 10.0);
    }

    #[test]
    fn scenario_four_chunks_with_absorption() {
        // duration=905, cd=300, ov=10, mc=30 -> starts 0,290,580,870
        let chunks = plan_chunks(905.0, 300.0, 10.0, 30.0);
        let starts: Vec<f64> = chunks.iter().map(|c| c.start_time).collect();
        assert_eq!(starts, vec![0.0, 290.0, 580.0, 870.0]);
        assert_eq!(chunks.last().unwrap().end_time, 905.0);
    }

    #[test]
    fn trailing_remainder_equal_to_chunk_duration_plus_one_is_absorbed() {
        // duration == chunk_duration + 1, min_chunk = 30 -> one chunk [0, duration]
        let chunks = plan_chunks(301.0, 300.0, 10.0, 30.0);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].start_time, 0.0);
        assert_eq!(chunks[0].end_time, 301.0);
    }

    #[test]
    fn covers_duration_continuously() {
        for duration in [1.0, 45.0, 299.0, 300.0, 301.0, 600.0, 905.0, 1800.5] {
            let chunks = plan_chunks(duration, 300.0, 10.0, 30.0);
            assert_eq!(chunks[0].start_time, 0.0);
            assert_eq!(chunks.last().unwrap().end_time, duration);
            for i in 1..chunks.len() {
                assert_eq!(chunks[i].overlap_start, 10.0);
                if i < chunks.len() - 1 || chunks[i].start_time + 290.0 == chunks[i].end_time {
                    assert_eq!(chunks[i].start_time, chunks[i - 1].start_time + 290.0);
                }
            }
        }
    }

    #[test]
    fn indices_are_dense_and_sorted() {
        let chunks = plan_chunks(905.0, 300.0, 10.0, 30.0);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.index, i);
        }
    }
}
