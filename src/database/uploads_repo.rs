// Upload state repository for workshop-scribe
// Import batches and per-file resumable upload progress

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::{BatchStatus, ImportBatch, UploadState};
use super::{DatabaseManager, NotFound};

impl DatabaseManager {
    /// Create an import batch in OPEN status
    pub fn create_batch(&self, batch: &ImportBatch) -> Result<()> {
        self.with_connection(|conn| create_batch_impl(conn, batch))
    }

    /// Get a batch by ID, scoped to the org
    pub fn get_batch(&self, org_id: &str, id: &str) -> Result<Option<ImportBatch>> {
        self.with_connection(|conn| get_batch_impl(conn, org_id, id))
    }

    /// Bump the uploaded or error counter after a file finishes
    pub fn record_batch_file_outcome(&self, org_id: &str, id: &str, success: bool) -> Result<()> {
        self.with_connection(|conn| {
            let column = if success { "uploaded_files" } else { "error_files" };
            let sql = format!(
                "UPDATE import_batches SET {} = {} + 1 WHERE id = ? AND org_id = ?",
                column, column
            );
            conn.execute(&sql, params![id, org_id])
                .context("Failed to record batch file outcome")?;
            Ok(())
        })
    }

    /// Close a batch with its terminal status
    pub fn close_batch(&self, org_id: &str, id: &str, status: BatchStatus) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                "UPDATE import_batches SET status = ?, ended_at = ? WHERE id = ? AND org_id = ?",
                params![
                    status.as_str(),
                    chrono::Utc::now().to_rfc3339(),
                    id,
                    org_id
                ],
            )
            .context("Failed to close batch")?;
            Ok(())
        })
    }

    /// Create an upload-state row if none exists for (batch, hash)
    pub fn ensure_upload_state(
        &self,
        batch_id: &str,
        sha256: &str,
        recording_id: &str,
    ) -> Result<UploadState> {
        self.with_connection(|conn| ensure_upload_state_impl(conn, batch_id, sha256, recording_id))
    }

    /// Get upload state for (batch, hash)
    pub fn get_upload_state(&self, batch_id: &str, sha256: &str) -> Result<Option<UploadState>> {
        self.with_connection(|conn| get_upload_state_impl(conn, batch_id, sha256))
    }

    /// Persist the remote multipart upload id for resume
    pub fn set_remote_upload_id(
        &self,
        batch_id: &str,
        sha256: &str,
        upload_id: &str,
    ) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE upload_state SET remote_upload_id = ?, updated_at = ?
                WHERE batch_id = ? AND sha256 = ?
                "#,
                params![upload_id, chrono::Utc::now().to_rfc3339(), batch_id, sha256],
            )
            .context("Failed to set remote upload id")?;
            Ok(())
        })
    }

    /// Record one completed part number. Persisted immediately so a
    /// restart resumes at the exact next incomplete part.
    pub fn mark_part_completed(&self, batch_id: &str, sha256: &str, part_number: i64) -> Result<()> {
        self.with_connection(|conn| mark_part_completed_impl(conn, batch_id, sha256, part_number))
    }

    /// Mark the logical file uploaded (only after assembly completes)
    pub fn mark_uploaded(&self, batch_id: &str, sha256: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE upload_state SET uploaded = 1, error = NULL, updated_at = ?
                WHERE batch_id = ? AND sha256 = ?
                "#,
                params![chrono::Utc::now().to_rfc3339(), batch_id, sha256],
            )
            .context("Failed to mark upload complete")?;
            Ok(())
        })
    }

    /// Record an upload failure message
    pub fn mark_upload_error(&self, batch_id: &str, sha256: &str, error: &str) -> Result<()> {
        self.with_connection(|conn| {
            conn.execute(
                r#"
                UPDATE upload_state SET error = ?, updated_at = ?
                WHERE batch_id = ? AND sha256 = ?
                "#,
                params![error, chrono::Utc::now().to_rfc3339(), batch_id, sha256],
            )
            .context("Failed to mark upload error")?;
            Ok(())
        })
    }
}

fn create_batch_impl(conn: &Connection, batch: &ImportBatch) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO import_batches (
            id, org_id, device_label, status, total_files, uploaded_files,
            error_files, started_at, ended_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            batch.id,
            batch.org_id,
            batch.device_label,
            batch.status.as_str(),
            batch.total_files,
            batch.uploaded_files,
            batch.error_files,
            batch.started_at,
            batch.ended_at,
        ],
    )
    .context("Failed to create import batch")?;

    Ok(())
}

fn get_batch_impl(conn: &Connection, org_id: &str, id: &str) -> Result<Option<ImportBatch>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, org_id, device_label, status, total_files, uploaded_files,
                   error_files, started_at, ended_at
            FROM import_batches WHERE id = ? AND org_id = ?
            "#,
        )
        .context("Failed to prepare get_batch query")?;

    let result = stmt.query_row(params![id, org_id], |row| {
        let status_str: String = row.get(3)?;
        Ok(ImportBatch {
            id: row.get(0)?,
            org_id: row.get(1)?,
            device_label: row.get(2)?,
            status: BatchStatus::parse(&status_str).unwrap_or(BatchStatus::Open),
            total_files: row.get(4)?,
            uploaded_files: row.get(5)?,
            error_files: row.get(6)?,
            started_at: row.get(7)?,
            ended_at: row.get(8)?,
        })
    });

    match result {
        Ok(batch) => Ok(Some(batch)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get import batch"),
    }
}

fn row_to_upload_state(row: &rusqlite::Row<'_>) -> rusqlite::Result<UploadState> {
    let uploaded: i64 = row.get(3)?;
    let parts_json: String = row.get(6)?;
    Ok(UploadState {
        batch_id: row.get(0)?,
        sha256: row.get(1)?,
        recording_id: row.get(2)?,
        uploaded: uploaded != 0,
        error: row.get(4)?,
        remote_upload_id: row.get(5)?,
        completed_parts: serde_json::from_str(&parts_json).unwrap_or_default(),
        updated_at: row.get(7)?,
    })
}

fn get_upload_state_impl(
    conn: &Connection,
    batch_id: &str,
    sha256: &str,
) -> Result<Option<UploadState>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT batch_id, sha256, recording_id, uploaded, error, remote_upload_id,
                   completed_parts, updated_at
            FROM upload_state WHERE batch_id = ? AND sha256 = ?
            "#,
        )
        .context("Failed to prepare get_upload_state query")?;

    let result = stmt.query_row(params![batch_id, sha256], row_to_upload_state);

    match result {
        Ok(state) => Ok(Some(state)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get upload state"),
    }
}

fn ensure_upload_state_impl(
    conn: &Connection,
    batch_id: &str,
    sha256: &str,
    recording_id: &str,
) -> Result<UploadState> {
    if let Some(existing) = get_upload_state_impl(conn, batch_id, sha256)? {
        return Ok(existing);
    }

    conn.execute(
        r#"
        INSERT INTO upload_state (batch_id, sha256, recording_id, uploaded, completed_parts, updated_at)
        VALUES (?1, ?2, ?3, 0, '[]', ?4)
        "#,
        params![batch_id, sha256, recording_id, chrono::Utc::now().to_rfc3339()],
    )
    .context("Failed to create upload state")?;

    get_upload_state_impl(conn, batch_id, sha256)?
        .ok_or_else(|| anyhow::anyhow!("Upload state disappeared after insert"))
}

fn mark_part_completed_impl(
    conn: &Connection,
    batch_id: &str,
    sha256: &str,
    part_number: i64,
) -> Result<()> {
    let state = get_upload_state_impl(conn, batch_id, sha256)?.ok_or_else(|| {
        anyhow::Error::new(NotFound::new("Upload state", format!("{}/{}", batch_id, sha256)))
    })?;

    let mut parts = state.completed_parts;
    if !parts.contains(&part_number) {
        parts.push(part_number);
        parts.sort_unstable();
    }

    conn.execute(
        r#"
        UPDATE upload_state SET completed_parts = ?, updated_at = ?
        WHERE batch_id = ? AND sha256 = ?
        "#,
        params![
            serde_json::to_string(&parts)?,
            chrono::Utc::now().to_rfc3339(),
            batch_id,
            sha256
        ],
    )
    .context("Failed to mark part completed")?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_batch(db: &DatabaseManager) {
        db.create_batch(&ImportBatch {
            id: "batch_1".to_string(),
            org_id: "org_1".to_string(),
            device_label: Some("recorder-a".to_string()),
            status: BatchStatus::Open,
            total_files: 1,
            uploaded_files: 0,
            error_files: 0,
            started_at: chrono::Utc::now().to_rfc3339(),
            ended_at: None,
        })
        .unwrap();
    }

    #[test]
    fn test_upload_state_round_trip() {
        let db = DatabaseManager::open_in_memory().unwrap();
        open_batch(&db);

        let state = db.ensure_upload_state("batch_1", "abc123", "rec_1").unwrap();
        assert!(!state.uploaded);
        assert!(state.completed_parts.is_empty());

        db.mark_part_completed("batch_1", "abc123", 2).unwrap();
        db.mark_part_completed("batch_1", "abc123", 1).unwrap();
        db.mark_part_completed("batch_1", "abc123", 2).unwrap();

        let state = db.get_upload_state("batch_1", "abc123").unwrap().unwrap();
        assert_eq!(state.completed_parts, vec![1, 2]);

        db.mark_uploaded("batch_1", "abc123").unwrap();
        let state = db.get_upload_state("batch_1", "abc123").unwrap().unwrap();
        assert!(state.uploaded);
    }

    #[test]
    fn test_ensure_upload_state_is_stable() {
        let db = DatabaseManager::open_in_memory().unwrap();
        open_batch(&db);

        db.ensure_upload_state("batch_1", "abc123", "rec_1").unwrap();
        db.mark_part_completed("batch_1", "abc123", 1).unwrap();

        // A second ensure must not wipe progress
        let state = db.ensure_upload_state("batch_1", "abc123", "rec_1").unwrap();
        assert_eq!(state.completed_parts, vec![1]);
    }

    #[test]
    fn test_batch_counters() {
        let db = DatabaseManager::open_in_memory().unwrap();
        open_batch(&db);

        db.record_batch_file_outcome("org_1", "batch_1", true).unwrap();
        db.record_batch_file_outcome("org_1", "batch_1", false).unwrap();
        db.close_batch("org_1", "batch_1", BatchStatus::PartialError)
            .unwrap();

        let batch = db.get_batch("org_1", "batch_1").unwrap().unwrap();
        assert_eq!(batch.uploaded_files, 1);
        assert_eq!(batch.error_files, 1);
        assert_eq!(batch.status, BatchStatus::PartialError);
        assert!(batch.ended_at.is_some());
    }
}
