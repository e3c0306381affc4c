// Database models - Artifact
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind tag of a persisted pipeline output
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Transcript,
    Summary,
    Claims,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript",
            ArtifactKind::Summary => "summary",
            ArtifactKind::Claims => "claims",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "transcript" => Some(ArtifactKind::Transcript),
            "summary" => Some(ArtifactKind::Summary),
            "claims" => Some(ArtifactKind::Claims),
            _ => None,
        }
    }

    /// File name of this artifact under the run's storage prefix
    pub fn file_name(&self) -> &'static str {
        match self {
            ArtifactKind::Transcript => "transcript.json",
            ArtifactKind::Summary => "summary.json",
            ArtifactKind::Claims => "claims.json",
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted pipeline output, stored by reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: String,
    pub run_id: String,
    pub org_id: String,
    pub kind: ArtifactKind,
    pub storage_key: String,
    pub content_hash: Option<String>,
    pub created_at: String,
}
