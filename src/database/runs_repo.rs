// Processing runs repository for workshop-scribe
// Tracks pipeline execution attempts and their completed-step logs

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::{ProcessingRun, RecordingStatus, RunStatus};
use super::{DatabaseManager, NotFound};

impl DatabaseManager {
    /// Create a RUNNING processing run for a recording. Fails when the
    /// recording already has an active run: only one at a time.
    pub fn create_run(
        &self,
        org_id: &str,
        run_id: &str,
        recording_id: &str,
        provider: &str,
        model: &str,
    ) -> Result<ProcessingRun> {
        self.with_connection(|conn| {
            create_run_impl(conn, org_id, run_id, recording_id, provider, model)
        })
    }

    /// Get a run by ID, scoped to the org
    pub fn get_run(&self, org_id: &str, id: &str) -> Result<Option<ProcessingRun>> {
        self.with_connection(|conn| get_run_impl(conn, org_id, id))
    }

    /// Get a run, failing with NotFound when absent
    pub fn require_run(&self, org_id: &str, id: &str) -> Result<ProcessingRun> {
        self.get_run(org_id, id)?
            .ok_or_else(|| NotFound::new("Processing run", id).into())
    }

    /// Latest run for a recording, if any
    pub fn latest_run_for_recording(
        &self,
        org_id: &str,
        recording_id: &str,
    ) -> Result<Option<ProcessingRun>> {
        self.with_connection(|conn| latest_run_impl(conn, org_id, recording_id))
    }

    /// Append a step name to the run's completed-step log. Append-only:
    /// a step already present is left in place.
    pub fn append_completed_step(&self, org_id: &str, id: &str, step: &str) -> Result<()> {
        self.with_connection(|conn| append_completed_step_impl(conn, org_id, id, step))
    }

    /// Re-open a finished run for a targeted resume, bumping the retry
    /// counter and clearing the previous failure.
    pub fn reopen_run(&self, org_id: &str, id: &str) -> Result<ProcessingRun> {
        self.with_connection(|conn| reopen_run_impl(conn, org_id, id))
    }

    /// Write the run's terminal state and the recording's terminal status
    /// in one transaction. Safe to call again for an already-finalized run.
    #[allow(clippy::too_many_arguments)]
    pub fn finalize_run(
        &self,
        org_id: &str,
        run_id: &str,
        recording_id: &str,
        run_status: RunStatus,
        recording_status: RecordingStatus,
        completed_steps: &[String],
        failed_step: Option<&str>,
        error: Option<&str>,
    ) -> Result<()> {
        self.with_connection(|conn| {
            finalize_run_impl(
                conn,
                org_id,
                run_id,
                recording_id,
                run_status,
                recording_status,
                completed_steps,
                failed_step,
                error,
            )
        })
    }
}

const RUN_COLUMNS: &str = r#"id, recording_id, org_id, provider, model, status, completed_steps,
       failed_step, error, retry_count, started_at, finished_at"#;

fn row_to_run(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProcessingRun> {
    let status_str: String = row.get(5)?;
    let steps_json: String = row.get(6)?;
    Ok(ProcessingRun {
        id: row.get(0)?,
        recording_id: row.get(1)?,
        org_id: row.get(2)?,
        provider: row.get(3)?,
        model: row.get(4)?,
        status: RunStatus::parse(&status_str).unwrap_or(RunStatus::Error),
        completed_steps: serde_json::from_str(&steps_json).unwrap_or_default(),
        failed_step: row.get(7)?,
        error: row.get(8)?,
        retry_count: row.get(9)?,
        started_at: row.get(10)?,
        finished_at: row.get(11)?,
    })
}

fn create_run_impl(
    conn: &Connection,
    org_id: &str,
    run_id: &str,
    recording_id: &str,
    provider: &str,
    model: &str,
) -> Result<ProcessingRun> {
    let active: i64 = conn
        .query_row(
            r#"
            SELECT COUNT(*) FROM processing_runs
            WHERE org_id = ? AND recording_id = ? AND status = 'RUNNING'
            "#,
            params![org_id, recording_id],
            |row| row.get(0),
        )
        .context("Failed to count active runs")?;

    if active > 0 {
        anyhow::bail!(
            "Recording {} already has an active processing run",
            recording_id
        );
    }

    conn.execute(
        r#"
        INSERT INTO processing_runs (
            id, recording_id, org_id, provider, model, status,
            completed_steps, retry_count, started_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, 'RUNNING', '[]', 0, ?6)
        "#,
        params![
            run_id,
            recording_id,
            org_id,
            provider,
            model,
            chrono::Utc::now().to_rfc3339(),
        ],
    )
    .context("Failed to create processing run")?;

    get_run_impl(conn, org_id, run_id)?
        .ok_or_else(|| anyhow::anyhow!("Processing run {} disappeared after insert", run_id))
}

fn get_run_impl(conn: &Connection, org_id: &str, id: &str) -> Result<Option<ProcessingRun>> {
    let sql = format!(
        "SELECT {} FROM processing_runs WHERE id = ? AND org_id = ?",
        RUN_COLUMNS
    );
    let mut stmt = conn.prepare(&sql).context("Failed to prepare get_run query")?;

    let result = stmt.query_row(params![id, org_id], row_to_run);

    match result {
        Ok(run) => Ok(Some(run)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get processing run"),
    }
}

fn latest_run_impl(
    conn: &Connection,
    org_id: &str,
    recording_id: &str,
) -> Result<Option<ProcessingRun>> {
    let sql = format!(
        r#"
        SELECT {} FROM processing_runs
        WHERE org_id = ? AND recording_id = ?
        ORDER BY started_at DESC LIMIT 1
        "#,
        RUN_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare latest_run query")?;

    let result = stmt.query_row(params![org_id, recording_id], row_to_run);

    match result {
        Ok(run) => Ok(Some(run)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get latest processing run"),
    }
}

fn append_completed_step_impl(
    conn: &Connection,
    org_id: &str,
    id: &str,
    step: &str,
) -> Result<()> {
    let run = get_run_impl(conn, org_id, id)?
        .ok_or_else(|| anyhow::Error::new(NotFound::new("Processing run", id)))?;

    let mut steps = run.completed_steps;
    if !steps.iter().any(|s| s == step) {
        steps.push(step.to_string());
    }

    conn.execute(
        "UPDATE processing_runs SET completed_steps = ? WHERE id = ? AND org_id = ?",
        params![serde_json::to_string(&steps)?, id, org_id],
    )
    .context("Failed to append completed step")?;

    Ok(())
}

fn reopen_run_impl(conn: &Connection, org_id: &str, id: &str) -> Result<ProcessingRun> {
    let run = get_run_impl(conn, org_id, id)?
        .ok_or_else(|| anyhow::Error::new(NotFound::new("Processing run", id)))?;

    if run.status == RunStatus::Running {
        anyhow::bail!("Processing run {} is already running", id);
    }

    conn.execute(
        r#"
        UPDATE processing_runs
        SET status = 'RUNNING', failed_step = NULL, error = NULL,
            retry_count = retry_count + 1, finished_at = NULL
        WHERE id = ? AND org_id = ?
        "#,
        params![id, org_id],
    )
    .context("Failed to reopen processing run")?;

    get_run_impl(conn, org_id, id)?
        .ok_or_else(|| anyhow::anyhow!("Processing run {} disappeared after reopen", id))
}

#[allow(clippy::too_many_arguments)]
fn finalize_run_impl(
    conn: &Connection,
    org_id: &str,
    run_id: &str,
    recording_id: &str,
    run_status: RunStatus,
    recording_status: RecordingStatus,
    completed_steps: &[String],
    failed_step: Option<&str>,
    error: Option<&str>,
) -> Result<()> {
    let now = chrono::Utc::now().to_rfc3339();

    conn.execute_batch("BEGIN")
        .context("Failed to begin finalize transaction")?;

    let result = (|| -> Result<()> {
        conn.execute(
            r#"
            UPDATE processing_runs
            SET status = ?, completed_steps = ?, failed_step = ?, error = ?, finished_at = ?
            WHERE id = ? AND org_id = ?
            "#,
            params![
                run_status.as_str(),
                serde_json::to_string(completed_steps)?,
                failed_step,
                error,
                now,
                run_id,
                org_id,
            ],
        )
        .context("Failed to finalize processing run")?;

        // The run row is the source of truth; a recording that vanished or
        // never reached PROCESSING must not block finalization.
        let current: Option<String> = conn
            .query_row(
                "SELECT status FROM recordings WHERE id = ? AND org_id = ?",
                params![recording_id, org_id],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })
            .context("Failed to read recording status")?;

        match current.and_then(|s| RecordingStatus::parse(&s)) {
            Some(status) if status.can_transition_to(recording_status) => {
                conn.execute(
                    "UPDATE recordings SET status = ?, updated_at = ? WHERE id = ? AND org_id = ?",
                    params![recording_status.as_str(), now, recording_id, org_id],
                )
                .context("Failed to set recording terminal status")?;
            }
            Some(status) => {
                log::warn!(
                    "Skipping recording status update {} -> {} for {}: illegal transition",
                    status,
                    recording_status,
                    recording_id
                );
            }
            None => {
                log::warn!(
                    "Recording {} missing during finalize of run {}",
                    recording_id,
                    run_id
                );
            }
        }

        Ok(())
    })();

    match result {
        Ok(()) => {
            conn.execute_batch("COMMIT")
                .context("Failed to commit finalize transaction")?;
            Ok(())
        }
        Err(e) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Recording;

    fn create_test_db() -> DatabaseManager {
        let db = DatabaseManager::open_in_memory().unwrap();
        let rec = Recording::new(
            "rec_1".to_string(),
            "org_1".to_string(),
            "a.wav".to_string(),
            "org/org_1/recording/rec_1/raw/a.wav".to_string(),
        );
        db.create_recording(&rec).unwrap();
        db
    }

    #[test]
    fn test_create_and_get_run() {
        let db = create_test_db();
        let run = db
            .create_run("org_1", "run_1", "rec_1", "http", "scribe-large")
            .unwrap();
        assert_eq!(run.status, RunStatus::Running);
        assert!(run.completed_steps.is_empty());
        assert_eq!(run.retry_count, 0);
    }

    #[test]
    fn test_single_active_run_per_recording() {
        let db = create_test_db();
        db.create_run("org_1", "run_1", "rec_1", "http", "m").unwrap();
        assert!(db.create_run("org_1", "run_2", "rec_1", "http", "m").is_err());
    }

    #[test]
    fn test_completed_steps_append_only() {
        let db = create_test_db();
        db.create_run("org_1", "run_1", "rec_1", "http", "m").unwrap();

        db.append_completed_step("org_1", "run_1", "load_metadata")
            .unwrap();
        db.append_completed_step("org_1", "run_1", "ensure_audio_access")
            .unwrap();
        db.append_completed_step("org_1", "run_1", "load_metadata")
            .unwrap();

        let run = db.get_run("org_1", "run_1").unwrap().unwrap();
        assert_eq!(
            run.completed_steps,
            vec!["load_metadata", "ensure_audio_access"]
        );
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let db = create_test_db();
        db.create_run("org_1", "run_1", "rec_1", "http", "m").unwrap();
        for s in [
            RecordingStatus::Uploading,
            RecordingStatus::Uploaded,
            RecordingStatus::Processing,
        ] {
            db.set_recording_status("org_1", "rec_1", s).unwrap();
        }

        let steps = vec!["load_metadata".to_string()];
        for _ in 0..2 {
            db.finalize_run(
                "org_1",
                "run_1",
                "rec_1",
                RunStatus::Partial,
                RecordingStatus::Partial,
                &steps,
                Some("summarize"),
                Some("analysis service unavailable"),
            )
            .unwrap();
        }

        let run = db.get_run("org_1", "run_1").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.failed_step.as_deref(), Some("summarize"));
        let rec = db.get_recording("org_1", "rec_1").unwrap().unwrap();
        assert_eq!(rec.status, RecordingStatus::Partial);
    }

    #[test]
    fn test_reopen_run_bumps_retry_count() {
        let db = create_test_db();
        db.create_run("org_1", "run_1", "rec_1", "http", "m").unwrap();
        db.finalize_run(
            "org_1",
            "run_1",
            "rec_1",
            RunStatus::Error,
            RecordingStatus::Error,
            &[],
            Some("load_metadata"),
            Some("boom"),
        )
        .unwrap();

        let reopened = db.reopen_run("org_1", "run_1").unwrap();
        assert_eq!(reopened.status, RunStatus::Running);
        assert_eq!(reopened.retry_count, 1);
        assert!(reopened.failed_step.is_none());
        assert!(reopened.finished_at.is_none());
    }
}
