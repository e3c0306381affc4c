// Database migrations for workshop-scribe
// Creates and updates the database schema

use anyhow::{Context, Result};
use rusqlite::Connection;

/// Current schema version
const SCHEMA_VERSION: i32 = 2;

/// Run all necessary migrations to bring the database up to date
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    if current_version < 1 {
        migrate_v1(conn)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
    }

    Ok(())
}

/// Get the current schema version from the database
fn get_schema_version(conn: &Connection) -> Result<i32> {
    let table_exists: bool = conn
        .query_row(
            "SELECT COUNT(*) > 0 FROM sqlite_master WHERE type='table' AND name='schema_version'",
            [],
            |row| row.get(0),
        )
        .unwrap_or(false);

    if !table_exists {
        return Ok(0);
    }

    let version: i32 = conn
        .query_row("SELECT MAX(version) FROM schema_version", [], |row| {
            row.get(0)
        })
        .unwrap_or(0);

    Ok(version)
}

/// Initial schema creation (version 1)
fn migrate_v1(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v1");

    conn.execute_batch(
        r#"
        -- Schema version tracking
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- Recordings table: core metadata for each ingested audio file
        CREATE TABLE IF NOT EXISTS recordings (
            id TEXT PRIMARY KEY NOT NULL,
            org_id TEXT NOT NULL,
            import_batch_id TEXT,
            original_file_name TEXT NOT NULL,
            size_bytes INTEGER NOT NULL DEFAULT 0,
            sha256 TEXT NOT NULL DEFAULT '',
            duration_ms INTEGER,
            mime_type TEXT NOT NULL DEFAULT 'audio/wav',
            raw_key TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'REGISTERED',
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_recordings_org_status
            ON recordings(org_id, status);

        -- Processing runs: one row per pipeline execution attempt
        CREATE TABLE IF NOT EXISTS processing_runs (
            id TEXT PRIMARY KEY NOT NULL,
            recording_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            provider TEXT NOT NULL,
            model TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'RUNNING',
            completed_steps TEXT NOT NULL DEFAULT '[]',
            failed_step TEXT,
            error TEXT,
            retry_count INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            FOREIGN KEY (recording_id) REFERENCES recordings(id)
        );
        CREATE INDEX IF NOT EXISTS idx_runs_recording
            ON processing_runs(org_id, recording_id);

        -- Recording chunks: ordered, possibly overlapping audio slices
        CREATE TABLE IF NOT EXISTS recording_chunks (
            id TEXT PRIMARY KEY NOT NULL,
            recording_id TEXT NOT NULL,
            chunk_index INTEGER NOT NULL,
            start_ms INTEGER NOT NULL,
            end_ms INTEGER NOT NULL,
            storage_key TEXT NOT NULL,
            sha256 TEXT,
            created_at TEXT NOT NULL,
            UNIQUE (recording_id, chunk_index),
            FOREIGN KEY (recording_id) REFERENCES recordings(id)
        );

        -- Artifacts: persisted pipeline outputs, stored by reference
        CREATE TABLE IF NOT EXISTS artifacts (
            id TEXT PRIMARY KEY NOT NULL,
            run_id TEXT NOT NULL,
            org_id TEXT NOT NULL,
            kind TEXT NOT NULL,
            storage_key TEXT NOT NULL,
            content_hash TEXT,
            created_at TEXT NOT NULL,
            FOREIGN KEY (run_id) REFERENCES processing_runs(id)
        );
        CREATE INDEX IF NOT EXISTS idx_artifacts_run
            ON artifacts(org_id, run_id);

        -- Analysis semaphore: concurrency leases for the external service
        CREATE TABLE IF NOT EXISTS analysis_semaphore (
            id TEXT PRIMARY KEY NOT NULL,
            org_id TEXT NOT NULL,
            acquired_by TEXT NOT NULL,
            acquired_at TEXT NOT NULL,
            expires_at TEXT NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_semaphore_org_expiry
            ON analysis_semaphore(org_id, expires_at);

        -- Import batches: device-import sessions grouping uploads
        CREATE TABLE IF NOT EXISTS import_batches (
            id TEXT PRIMARY KEY NOT NULL,
            org_id TEXT NOT NULL,
            device_label TEXT,
            status TEXT NOT NULL DEFAULT 'OPEN',
            total_files INTEGER NOT NULL DEFAULT 0,
            uploaded_files INTEGER NOT NULL DEFAULT 0,
            error_files INTEGER NOT NULL DEFAULT 0,
            started_at TEXT NOT NULL,
            ended_at TEXT
        );

        -- Upload state: per (batch, content-hash) transfer progress
        CREATE TABLE IF NOT EXISTS upload_state (
            batch_id TEXT NOT NULL,
            sha256 TEXT NOT NULL,
            recording_id TEXT NOT NULL,
            uploaded INTEGER NOT NULL DEFAULT 0,
            error TEXT,
            remote_upload_id TEXT,
            completed_parts TEXT NOT NULL DEFAULT '[]',
            updated_at TEXT NOT NULL,
            PRIMARY KEY (batch_id, sha256)
        );

        INSERT INTO schema_version (version) VALUES (1);
        "#,
    )
    .context("Failed to apply migration v1")?;

    Ok(())
}

/// Full-text search over transcript segments (version 2)
fn migrate_v2(conn: &Connection) -> Result<()> {
    log::info!("Running database migration v2");

    conn.execute_batch(
        r#"
        CREATE VIRTUAL TABLE IF NOT EXISTS transcript_fts USING fts5(
            org_id,
            recording_id,
            segment_id,
            speaker,
            text,
            tokenize='unicode61'
        );

        INSERT INTO schema_version (version) VALUES (2);
        "#,
    )
    .context("Failed to apply migration v2")?;

    Ok(())
}
