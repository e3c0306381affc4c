// Database models - upload tracking
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of an import batch
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BatchStatus {
    Open,
    Uploading,
    Completed,
    PartialError,
}

impl BatchStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BatchStatus::Open => "OPEN",
            BatchStatus::Uploading => "UPLOADING",
            BatchStatus::Completed => "COMPLETED",
            BatchStatus::PartialError => "PARTIAL_ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "OPEN" => Some(BatchStatus::Open),
            "UPLOADING" => Some(BatchStatus::Uploading),
            "COMPLETED" => Some(BatchStatus::Completed),
            "PARTIAL_ERROR" => Some(BatchStatus::PartialError),
            _ => None,
        }
    }
}

impl fmt::Display for BatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A device-import session grouping uploaded files
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImportBatch {
    pub id: String,
    pub org_id: String,
    pub device_label: Option<String>,
    pub status: BatchStatus,
    pub total_files: i64,
    pub uploaded_files: i64,
    pub error_files: i64,
    pub started_at: String,
    pub ended_at: Option<String>,
}

/// Per (batch, content-hash) upload progress. `completed_parts` is
/// persisted after every part so a restart resumes at the exact next
/// incomplete part.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadState {
    pub batch_id: String,
    pub sha256: String,
    pub recording_id: String,
    pub uploaded: bool,
    pub error: Option<String>,
    pub remote_upload_id: Option<String>,
    pub completed_parts: Vec<i64>,
    pub updated_at: String,
}
