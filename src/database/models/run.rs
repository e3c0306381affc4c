// Database models - ProcessingRun
use serde::{Deserialize, Serialize};
use std::fmt;

/// Status of a single pipeline execution attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Running,
    Done,
    Partial,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "RUNNING",
            RunStatus::Done => "DONE",
            RunStatus::Partial => "PARTIAL",
            RunStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "RUNNING" => Some(RunStatus::Running),
            "DONE" => Some(RunStatus::Done),
            "PARTIAL" => Some(RunStatus::Partial),
            "ERROR" => Some(RunStatus::Error),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One execution attempt of the pipeline against a recording.
///
/// `completed_steps` is append-only within a run and is the sole source
/// of truth when resuming from an arbitrary step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingRun {
    pub id: String,
    pub recording_id: String,
    pub org_id: String,
    pub provider: String,
    pub model: String,
    pub status: RunStatus,
    pub completed_steps: Vec<String>,
    pub failed_step: Option<String>,
    pub error: Option<String>,
    pub retry_count: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
}
