// Transcript and analysis artifact documents
use serde::{Deserialize, Serialize};

/// One transcribed utterance. Timestamps are global to the recording
/// once the owning chunk's offset has been applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub segment_id: String,
    pub speaker: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub text: String,
    pub confidence: f64,
}

/// Transcription output for one audio chunk, timestamps already offset
/// to the recording's global timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkTranscript {
    pub chunk_index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub language: String,
    pub segments: Vec<TranscriptSegment>,
}

/// The merged transcript artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptDoc {
    pub recording_id: String,
    pub run_id: String,
    pub language: String,
    pub provider: String,
    pub model: String,
    pub segments: Vec<TranscriptSegment>,
}

impl TranscriptDoc {
    /// Plain-text rendering used as analysis input: one line per segment
    pub fn to_speaker_lines(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{}] {}", s.speaker, s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Rendering with segment ids and time ranges, used for evidence
    /// linking during claims extraction
    pub fn to_evidence_lines(&self) -> String {
        self.segments
            .iter()
            .map(|s| {
                format!(
                    "[{}] [{}] ({}-{}ms) {}",
                    s.segment_id, s.speaker, s.start_ms, s.end_ms, s.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// The structured summary artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SummaryDoc {
    pub recording_id: String,
    pub run_id: String,
    pub short_summary: String,
    pub long_summary: String,
    pub key_points: Vec<String>,
    pub decisions: Vec<String>,
    pub open_items: Vec<String>,
}

/// Stance of an extracted claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ClaimStance {
    Affirm,
    Negate,
    Uncertain,
    Reporting,
}

/// A stance-tagged claim with its supporting evidence
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claim {
    pub text: String,
    pub stance: ClaimStance,
    pub speaker: String,
    pub start_ms: i64,
    pub end_ms: i64,
    pub quote: String,
    #[serde(default)]
    pub evidence_segment_ids: Vec<String>,
}

/// The claims artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimsDoc {
    pub recording_id: String,
    pub run_id: String,
    pub claims: Vec<Claim>,
}
