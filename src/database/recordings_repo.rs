// Recordings repository for workshop-scribe
// Handles CRUD and lifecycle transitions for recordings

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::{InvalidStatusTransition, Recording, RecordingStatus};
use super::{DatabaseManager, NotFound};

impl DatabaseManager {
    /// Create a new recording
    pub fn create_recording(&self, recording: &Recording) -> Result<String> {
        self.with_connection(|conn| create_recording_impl(conn, recording))
    }

    /// Get a recording by ID, scoped to the org
    pub fn get_recording(&self, org_id: &str, id: &str) -> Result<Option<Recording>> {
        self.with_connection(|conn| get_recording_impl(conn, org_id, id))
    }

    /// Get a recording, failing with NotFound when absent
    pub fn require_recording(&self, org_id: &str, id: &str) -> Result<Recording> {
        self.get_recording(org_id, id)?
            .ok_or_else(|| NotFound::new("Recording", id).into())
    }

    /// Transition a recording along a legal lifecycle edge.
    /// Illegal transitions are rejected, never coerced.
    pub fn set_recording_status(
        &self,
        org_id: &str,
        id: &str,
        next: RecordingStatus,
    ) -> Result<Recording> {
        self.with_connection(|conn| set_recording_status_impl(conn, org_id, id, next))
    }

    /// Update size, hash, duration and mime type after ingest inspection
    pub fn set_recording_file_info(
        &self,
        org_id: &str,
        id: &str,
        size_bytes: i64,
        sha256: &str,
        duration_ms: Option<i64>,
        mime_type: &str,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE recordings
                SET size_bytes = ?, sha256 = ?, duration_ms = ?, mime_type = ?,
                    updated_at = ?
                WHERE id = ? AND org_id = ?
                "#,
                params![
                    size_bytes,
                    sha256,
                    duration_ms,
                    mime_type,
                    chrono::Utc::now().to_rfc3339(),
                    id,
                    org_id,
                ],
            )
            .context("Failed to update recording file info")?;
            Ok(())
        })
    }

    /// List recordings in a given status (oldest first)
    pub fn list_recordings_by_status(
        &self,
        org_id: &str,
        status: RecordingStatus,
    ) -> Result<Vec<Recording>> {
        self.with_connection(|conn| list_recordings_by_status_impl(conn, org_id, status))
    }
}

const RECORDING_COLUMNS: &str = r#"id, org_id, import_batch_id, original_file_name, size_bytes,
       sha256, duration_ms, mime_type, raw_key, status, created_at, updated_at"#;

fn row_to_recording(row: &rusqlite::Row<'_>) -> rusqlite::Result<Recording> {
    let status_str: String = row.get(9)?;
    Ok(Recording {
        id: row.get(0)?,
        org_id: row.get(1)?,
        import_batch_id: row.get(2)?,
        original_file_name: row.get(3)?,
        size_bytes: row.get(4)?,
        sha256: row.get(5)?,
        duration_ms: row.get(6)?,
        mime_type: row.get(7)?,
        raw_key: row.get(8)?,
        status: RecordingStatus::parse(&status_str).unwrap_or(RecordingStatus::Error),
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn create_recording_impl(conn: &Connection, recording: &Recording) -> Result<String> {
    conn.execute(
        r#"
        INSERT INTO recordings (
            id, org_id, import_batch_id, original_file_name, size_bytes, sha256,
            duration_ms, mime_type, raw_key, status, created_at, updated_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            recording.id,
            recording.org_id,
            recording.import_batch_id,
            recording.original_file_name,
            recording.size_bytes,
            recording.sha256,
            recording.duration_ms,
            recording.mime_type,
            recording.raw_key,
            recording.status.as_str(),
            recording.created_at,
            recording.updated_at,
        ],
    )
    .context("Failed to create recording")?;

    Ok(recording.id.clone())
}

fn get_recording_impl(conn: &Connection, org_id: &str, id: &str) -> Result<Option<Recording>> {
    let sql = format!(
        "SELECT {} FROM recordings WHERE id = ? AND org_id = ?",
        RECORDING_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare get_recording query")?;

    let result = stmt.query_row(params![id, org_id], row_to_recording);

    match result {
        Ok(recording) => Ok(Some(recording)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get recording"),
    }
}

fn set_recording_status_impl(
    conn: &Connection,
    org_id: &str,
    id: &str,
    next: RecordingStatus,
) -> Result<Recording> {
    let current = get_recording_impl(conn, org_id, id)?
        .ok_or_else(|| anyhow::Error::new(NotFound::new("Recording", id)))?;

    if !current.status.can_transition_to(next) {
        return Err(InvalidStatusTransition {
            recording_id: id.to_string(),
            from: current.status,
            to: next,
        }
        .into());
    }

    conn.execute(
        "UPDATE recordings SET status = ?, updated_at = ? WHERE id = ? AND org_id = ?",
        params![next.as_str(), chrono::Utc::now().to_rfc3339(), id, org_id],
    )
    .context("Failed to update recording status")?;

    Ok(Recording {
        status: next,
        ..current
    })
}

fn list_recordings_by_status_impl(
    conn: &Connection,
    org_id: &str,
    status: RecordingStatus,
) -> Result<Vec<Recording>> {
    let sql = format!(
        "SELECT {} FROM recordings WHERE org_id = ? AND status = ? ORDER BY created_at ASC",
        RECORDING_COLUMNS
    );
    let mut stmt = conn
        .prepare(&sql)
        .context("Failed to prepare list_recordings_by_status query")?;

    let rows = stmt
        .query_map(params![org_id, status.as_str()], row_to_recording)
        .context("Failed to query recordings by status")?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect recordings")
}
