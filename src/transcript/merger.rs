// Transcript merging
//
// Combines per-chunk transcription results into one timeline-ordered
// transcript. Adjacent chunks overlap by design (the segmenter re-reads
// the boundary region), so the overlap window is transcribed twice; the
// merge keeps whichever side transcribed it with more confidence.

use super::types::{ChunkTranscript, TranscriptSegment};

/// Minimum average confidence for the earlier chunk to keep its overlap
/// segments. Below this the later chunk's reading of the boundary wins.
const OVERLAP_CONFIDENCE_THRESHOLD: f64 = 0.7;

/// Merge chunk transcripts into a single ordered segment list.
///
/// Chunks are processed as adjacent pairs, left to right. Each pair
/// decision produces a freshly filtered segment list for the next chunk
/// instead of mutating it in place, so a chunk is only ever compared
/// against its immediate predecessor. Overlap windows are assumed not to
/// span more than two chunks; the segmenter keeps the overlap below the
/// chunk stride to guarantee that.
pub fn merge_chunk_transcripts(chunk_transcripts: Vec<ChunkTranscript>) -> Vec<TranscriptSegment> {
    let mut sorted = chunk_transcripts;
    sorted.sort_by_key(|c| c.chunk_index);

    if sorted.is_empty() {
        return Vec::new();
    }
    if sorted.len() == 1 {
        return sorted.into_iter().next().map(|c| c.segments).unwrap_or_default();
    }

    let mut result: Vec<TranscriptSegment> = Vec::new();
    // Segments of the chunk currently being emitted, already filtered by
    // the previous pair's decision.
    let mut current_segments = sorted[0].segments.clone();

    for i in 0..sorted.len() {
        let is_last = i + 1 == sorted.len();
        if is_last {
            result.append(&mut current_segments);
            break;
        }

        let current_end = sorted[i].end_ms;
        let next = &sorted[i + 1];

        // Overlap window: from the next chunk's global start to the
        // current chunk's global end.
        let overlap_start = next.start_ms;
        let overlap_end = current_end;

        if overlap_start >= overlap_end {
            // No overlap between this pair
            result.append(&mut current_segments);
            current_segments = next.segments.clone();
            continue;
        }

        let (before, overlap): (Vec<_>, Vec<_>) = current_segments
            .drain(..)
            .partition(|s| s.start_ms < overlap_start);

        result.extend(before);

        // Either way the next chunk is reduced to segments ending after
        // the window; the only question is whose overlap reading we keep.
        let next_filtered: Vec<TranscriptSegment> = next
            .segments
            .iter()
            .filter(|s| s.end_ms > overlap_end)
            .cloned()
            .collect();

        let avg = average_confidence(&overlap);
        if avg >= OVERLAP_CONFIDENCE_THRESHOLD || overlap.is_empty() {
            result.extend(overlap);
        } else {
            let next_overlap = next
                .segments
                .iter()
                .filter(|s| s.end_ms <= overlap_end)
                .cloned();
            result.extend(next_overlap);
        }

        current_segments = next_filtered;
    }

    result.sort_by_key(|s| s.start_ms);
    result
}

/// Average confidence of a segment set. An empty set counts as fully
/// confident so that a silent overlap never dethrones the earlier chunk.
pub fn average_confidence(segments: &[TranscriptSegment]) -> f64 {
    if segments.is_empty() {
        return 1.0;
    }
    let sum: f64 = segments.iter().map(|s| s.confidence).sum();
    sum / segments.len() as f64
}

/// Reassign sequential segment ids (`seg-0001`, `seg-0002`, ...) in input
/// order, guaranteeing uniqueness after a merge.
pub fn renumber_segments(segments: Vec<TranscriptSegment>) -> Vec<TranscriptSegment> {
    segments
        .into_iter()
        .enumerate()
        .map(|(index, seg)| TranscriptSegment {
            segment_id: format!("seg-{:04}", index + 1),
            ..seg
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seg(id: &str, start_ms: i64, end_ms: i64, confidence: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            segment_id: id.to_string(),
            speaker: "S1".to_string(),
            start_ms,
            end_ms,
            text: text.to_string(),
            confidence,
        }
    }

    fn chunk(index: i64, start_ms: i64, end_ms: i64, segments: Vec<TranscriptSegment>) -> ChunkTranscript {
        ChunkTranscript {
            chunk_index: index,
            start_ms,
            end_ms,
            language: "en".to_string(),
            segments,
        }
    }

    #[test]
    fn test_average_confidence_empty_is_one() {
        assert_eq!(average_confidence(&[]), 1.0);
    }

    #[test]
    fn test_average_confidence_mean() {
        let segments = vec![
            seg("a", 0, 1, 0.8, "x"),
            seg("b", 1, 2, 0.6, "y"),
        ];
        let avg = average_confidence(&segments);
        assert!((avg - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_renumber_sequential() {
        let segments = vec![
            seg("z", 0, 1, 0.9, "one"),
            seg("q", 1, 2, 0.9, "two"),
            seg("m", 2, 3, 0.9, "three"),
        ];
        let renumbered = renumber_segments(segments);
        let ids: Vec<_> = renumbered.iter().map(|s| s.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["seg-0001", "seg-0002", "seg-0003"]);
        assert_eq!(renumbered[0].text, "one");
    }

    #[test]
    fn test_renumber_empty() {
        assert!(renumber_segments(Vec::new()).is_empty());
    }

    #[test]
    fn test_single_chunk_passes_through() {
        let segments = vec![
            seg("a", 0, 5_000, 0.9, "hello"),
            seg("b", 5_000, 9_000, 0.8, "world"),
        ];
        let merged = merge_chunk_transcripts(vec![chunk(0, 0, 10_000, segments.clone())]);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].text, "hello");
        assert_eq!(merged[0].start_ms, 0);
        assert_eq!(merged[1].end_ms, 9_000);
    }

    #[test]
    fn test_confident_earlier_chunk_wins_overlap() {
        // Overlap window [58_000, 62_000]
        let first = chunk(
            0,
            0,
            62_000,
            vec![
                seg("a1", 0, 30_000, 0.9, "first half"),
                seg("a2", 58_500, 61_500, 0.9, "boundary from first"),
            ],
        );
        let second = chunk(
            1,
            58_000,
            120_000,
            vec![
                seg("b1", 58_400, 61_400, 0.6, "boundary from second"),
                seg("b2", 62_500, 70_000, 0.8, "second half"),
            ],
        );

        let merged = merge_chunk_transcripts(vec![first, second]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["first half", "boundary from first", "second half"]
        );
    }

    #[test]
    fn test_unconfident_earlier_chunk_loses_overlap() {
        let first = chunk(
            0,
            0,
            62_000,
            vec![
                seg("a1", 0, 30_000, 0.9, "first half"),
                seg("a2", 58_500, 61_500, 0.5, "boundary from first"),
            ],
        );
        let second = chunk(
            1,
            58_000,
            120_000,
            vec![
                seg("b1", 58_400, 61_400, 0.9, "boundary from second"),
                seg("b2", 62_500, 70_000, 0.8, "second half"),
            ],
        );

        let merged = merge_chunk_transcripts(vec![first, second]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["first half", "boundary from second", "second half"]
        );
    }

    #[test]
    fn test_empty_overlap_keeps_earlier_chunk() {
        // No segments from the first chunk fall inside the window; the
        // second chunk's overlap reading must still be dropped.
        let first = chunk(0, 0, 62_000, vec![seg("a1", 0, 30_000, 0.9, "first half")]);
        let second = chunk(
            1,
            58_000,
            120_000,
            vec![
                seg("b1", 58_400, 61_400, 0.9, "boundary from second"),
                seg("b2", 62_500, 70_000, 0.8, "second half"),
            ],
        );

        let merged = merge_chunk_transcripts(vec![first, second]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["first half", "second half"]);
    }

    #[test]
    fn test_disjoint_chunks_concatenate() {
        let first = chunk(0, 0, 60_000, vec![seg("a", 0, 59_000, 0.9, "one")]);
        let second = chunk(1, 60_000, 120_000, vec![seg("b", 61_000, 119_000, 0.9, "two")]);

        let merged = merge_chunk_transcripts(vec![first, second]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_out_of_order_input_sorted_by_index() {
        let first = chunk(0, 0, 60_000, vec![seg("a", 0, 59_000, 0.9, "one")]);
        let second = chunk(1, 60_000, 120_000, vec![seg("b", 61_000, 119_000, 0.9, "two")]);

        let merged = merge_chunk_transcripts(vec![second, first]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(texts, vec!["one", "two"]);
    }

    #[test]
    fn test_three_chunks_pairwise() {
        let c0 = chunk(
            0,
            0,
            62_000,
            vec![
                seg("a1", 0, 50_000, 0.9, "c0 body"),
                seg("a2", 58_500, 61_500, 0.9, "c0 tail"),
            ],
        );
        let c1 = chunk(
            1,
            58_000,
            122_000,
            vec![
                seg("b1", 58_400, 61_400, 0.6, "c1 head"),
                seg("b2", 70_000, 110_000, 0.9, "c1 body"),
                seg("b3", 118_500, 121_500, 0.4, "c1 tail"),
            ],
        );
        let c2 = chunk(
            2,
            118_000,
            180_000,
            vec![
                seg("d1", 118_400, 121_400, 0.9, "c2 head"),
                seg("d2", 130_000, 170_000, 0.9, "c2 body"),
            ],
        );

        let merged = merge_chunk_transcripts(vec![c0, c1, c2]);
        let texts: Vec<_> = merged.iter().map(|s| s.text.as_str()).collect();
        // c0 keeps its confident tail; c1's weak tail loses to c2's head
        assert_eq!(
            texts,
            vec!["c0 body", "c0 tail", "c1 body", "c2 head", "c2 body"]
        );
    }
}
