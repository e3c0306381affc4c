// Upstream trigger handling
//
// Turns "a raw file finished uploading" into a processing run. The poll
// loop is the standing worker: it scans for UPLOADED recordings and
// feeds them to the orchestrator one at a time. Targeted resume
// re-enters a PARTIAL or ERROR recording at a chosen step.

use anyhow::Result;
use std::time::Duration;

use crate::database::models::RecordingStatus;
use crate::database::NotFound;
use crate::ids;
use crate::pipeline::{Pipeline, PipelineOutcome, StepName};

/// Handle an upload-completed notification for one recording: mark it
/// UPLOADED if the notification raced the uploader's own bookkeeping,
/// create a RUNNING processing run and invoke the orchestrator.
pub async fn handle_upload_completed(
    pipeline: &Pipeline,
    org_id: &str,
    recording_id: &str,
) -> Result<PipelineOutcome> {
    let db = pipeline.db();
    let recording = db.require_recording(org_id, recording_id)?;

    if recording.status == RecordingStatus::Uploading {
        db.set_recording_status(org_id, recording_id, RecordingStatus::Uploaded)?;
    }

    let run_id = ids::generate_id(ids::RUN);
    db.create_run(
        org_id,
        &run_id,
        recording_id,
        &pipeline.config().provider_name,
        &pipeline.config().model,
    )?;

    pipeline.run(org_id, recording_id, &run_id, None).await
}

/// Re-enter a PARTIAL or ERROR recording into PROCESSING and resume its
/// latest run. Without an explicit step, resume starts at the step that
/// failed; completed steps are reloaded from the run's log either way.
pub async fn resume_recording(
    pipeline: &Pipeline,
    org_id: &str,
    recording_id: &str,
    from_step: Option<StepName>,
) -> Result<PipelineOutcome> {
    let db = pipeline.db();

    let run = db
        .latest_run_for_recording(org_id, recording_id)?
        .ok_or_else(|| NotFound::new("Processing run", recording_id))?;

    let failed = run.failed_step.as_deref().and_then(StepName::parse);

    // Rejects resumes of recordings that are not PARTIAL or ERROR
    db.set_recording_status(org_id, recording_id, RecordingStatus::Processing)?;
    let run = db.reopen_run(org_id, &run.id)?;

    pipeline
        .run(org_id, recording_id, &run.id, from_step.or(failed))
        .await
}

/// One poll pass: start a run for every UPLOADED recording. Returns how
/// many recordings were processed.
pub async fn poll_once(pipeline: &Pipeline, org_id: &str) -> Result<usize> {
    let uploaded = pipeline
        .db()
        .list_recordings_by_status(org_id, RecordingStatus::Uploaded)?;

    let mut processed = 0;
    for recording in uploaded {
        log::info!("Picked up uploaded recording {}", recording.id);
        match handle_upload_completed(pipeline, org_id, &recording.id).await {
            Ok(outcome) => {
                log::info!(
                    "Recording {} processed with status {}",
                    recording.id,
                    outcome.run_status
                );
                processed += 1;
            }
            Err(e) => {
                log::error!("Processing of {} failed to start: {:#}", recording.id, e);
            }
        }
    }

    Ok(processed)
}

/// The standing worker loop
pub async fn run_worker_loop(pipeline: &Pipeline, org_id: &str, poll_interval: Duration) -> ! {
    log::info!(
        "Worker started, polling for uploaded recordings every {:?}",
        poll_interval
    );
    loop {
        match poll_once(pipeline, org_id).await {
            Ok(0) => {}
            Ok(n) => log::info!("Poll pass processed {} recordings", n),
            Err(e) => log::error!("Poll pass failed: {:#}", e),
        }
        tokio::time::sleep(poll_interval).await;
    }
}
