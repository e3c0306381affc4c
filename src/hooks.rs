// Collaborator seams for the group and notify steps
//
// Both are external collaborators of the pipeline: grouping assigns a
// recording to a workshop draft, notification tells an operator about
// the outcome. The pipeline only depends on these traits.

use anyhow::Result;
use async_trait::async_trait;

use crate::database::models::{Recording, RunStatus};
use crate::database::DatabaseManager;

/// Result of a grouping attempt
#[derive(Debug, Clone)]
pub struct GroupingOutcome {
    pub draft_id: Option<String>,
    pub is_new_draft: bool,
}

#[async_trait]
pub trait RecordingGrouper: Send + Sync {
    async fn group(&self, db: &DatabaseManager, recording: &Recording)
        -> Result<GroupingOutcome>;
}

/// Default grouper: leaves recordings ungrouped
pub struct NoopGrouper;

#[async_trait]
impl RecordingGrouper for NoopGrouper {
    async fn group(
        &self,
        _db: &DatabaseManager,
        recording: &Recording,
    ) -> Result<GroupingOutcome> {
        log::debug!("No grouper configured, leaving {} ungrouped", recording.id);
        Ok(GroupingOutcome {
            draft_id: None,
            is_new_draft: false,
        })
    }
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(
        &self,
        recording: &Recording,
        status: RunStatus,
        failed_step: Option<&str>,
    ) -> Result<()>;
}

/// Default notifier: writes the outcome to the log. Stands in for an
/// email integration.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(
        &self,
        recording: &Recording,
        status: RunStatus,
        failed_step: Option<&str>,
    ) -> Result<()> {
        let message = match status {
            RunStatus::Done => format!(
                "Recording {} ({}) processing completed successfully.",
                recording.id, recording.original_file_name
            ),
            RunStatus::Partial => format!(
                "Recording {} ({}) processing partially completed. Failed at step: {}.",
                recording.id,
                recording.original_file_name,
                failed_step.unwrap_or("unknown")
            ),
            _ => format!(
                "Recording {} ({}) processing failed at step: {}.",
                recording.id,
                recording.original_file_name,
                failed_step.unwrap_or("unknown")
            ),
        };

        log::info!("[notify] {}", message);
        Ok(())
    }
}
