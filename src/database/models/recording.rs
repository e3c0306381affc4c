// Database models - Recording
use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a recording.
///
/// Legal transitions:
/// REGISTERED -> UPLOADING -> UPLOADED -> PROCESSING -> {DONE, PARTIAL, ERROR}
/// PARTIAL and ERROR may re-enter PROCESSING for a resumed run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RecordingStatus {
    Registered,
    Uploading,
    Uploaded,
    Processing,
    Done,
    Partial,
    Error,
}

impl RecordingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingStatus::Registered => "REGISTERED",
            RecordingStatus::Uploading => "UPLOADING",
            RecordingStatus::Uploaded => "UPLOADED",
            RecordingStatus::Processing => "PROCESSING",
            RecordingStatus::Done => "DONE",
            RecordingStatus::Partial => "PARTIAL",
            RecordingStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "REGISTERED" => Some(RecordingStatus::Registered),
            "UPLOADING" => Some(RecordingStatus::Uploading),
            "UPLOADED" => Some(RecordingStatus::Uploaded),
            "PROCESSING" => Some(RecordingStatus::Processing),
            "DONE" => Some(RecordingStatus::Done),
            "PARTIAL" => Some(RecordingStatus::Partial),
            "ERROR" => Some(RecordingStatus::Error),
            _ => None,
        }
    }

    /// Whether moving from `self` to `next` is a legal lifecycle edge.
    /// Terminal states accept a repeat of the same status so that a
    /// re-run of finalize stays idempotent.
    pub fn can_transition_to(&self, next: RecordingStatus) -> bool {
        use RecordingStatus::*;
        match (self, next) {
            (Registered, Uploading) => true,
            (Uploading, Uploaded) => true,
            (Uploaded, Processing) => true,
            (Processing, Done) | (Processing, Partial) | (Processing, Error) => true,
            (Partial, Processing) | (Error, Processing) => true,
            (Done, Done) | (Partial, Partial) | (Error, Error) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RecordingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected status transition. Surfaced as a client error and never retried.
#[derive(Debug, Clone)]
pub struct InvalidStatusTransition {
    pub recording_id: String,
    pub from: RecordingStatus,
    pub to: RecordingStatus,
}

impl fmt::Display for InvalidStatusTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid status transition for recording {}: {} -> {}",
            self.recording_id, self.from, self.to
        )
    }
}

impl std::error::Error for InvalidStatusTransition {}

/// A workshop audio recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Recording {
    pub id: String,
    pub org_id: String,
    pub import_batch_id: Option<String>,
    pub original_file_name: String,
    pub size_bytes: i64,
    pub sha256: String,
    pub duration_ms: Option<i64>,
    pub mime_type: String,
    pub raw_key: String,
    pub status: RecordingStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Recording {
    pub fn new(id: String, org_id: String, original_file_name: String, raw_key: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id,
            org_id,
            import_batch_id: None,
            original_file_name,
            size_bytes: 0,
            sha256: String::new(),
            duration_ms: None,
            mime_type: "audio/wav".to_string(),
            raw_key,
            status: RecordingStatus::Registered,
            created_at: now.clone(),
            updated_at: now,
        }
    }
}
