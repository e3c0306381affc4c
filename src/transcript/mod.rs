// Transcript assembly for workshop-scribe

pub mod merger;
mod types;

pub use merger::{average_confidence, merge_chunk_transcripts, renumber_segments};
pub use types::{
    Claim, ClaimStance, ClaimsDoc, ChunkTranscript, SummaryDoc, TranscriptDoc, TranscriptSegment,
};
