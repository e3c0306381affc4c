// Database models - RecordingChunk
use serde::{Deserialize, Serialize};

/// A time-bounded slice of a recording's audio, immutable once created.
/// Chunks after the first overlap their predecessor by up to the
/// configured overlap so the merger can deduplicate boundaries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingChunk {
    pub id: String,
    pub recording_id: String,
    pub chunk_index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub storage_key: String,
    pub sha256: Option<String>,
    pub created_at: String,
}
