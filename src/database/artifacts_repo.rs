// Artifacts repository for workshop-scribe

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::{Artifact, ArtifactKind};
use super::DatabaseManager;

impl DatabaseManager {
    /// Record a persisted pipeline output
    pub fn insert_artifact(&self, artifact: &Artifact) -> Result<()> {
        self.with_connection(|conn| insert_artifact_impl(conn, artifact))
    }

    /// Latest artifact of a kind for a run
    pub fn get_artifact(
        &self,
        org_id: &str,
        run_id: &str,
        kind: ArtifactKind,
    ) -> Result<Option<Artifact>> {
        self.with_connection(|conn| get_artifact_impl(conn, org_id, run_id, kind))
    }

    /// All artifacts recorded for a run
    pub fn list_artifacts_for_run(&self, org_id: &str, run_id: &str) -> Result<Vec<Artifact>> {
        self.with_connection(|conn| list_artifacts_impl(conn, org_id, run_id))
    }
}

fn row_to_artifact(row: &rusqlite::Row<'_>) -> rusqlite::Result<Artifact> {
    let kind_str: String = row.get(3)?;
    Ok(Artifact {
        id: row.get(0)?,
        run_id: row.get(1)?,
        org_id: row.get(2)?,
        kind: ArtifactKind::parse(&kind_str).unwrap_or(ArtifactKind::Transcript),
        storage_key: row.get(4)?,
        content_hash: row.get(5)?,
        created_at: row.get(6)?,
    })
}

fn insert_artifact_impl(conn: &Connection, artifact: &Artifact) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO artifacts (id, run_id, org_id, kind, storage_key, content_hash, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        "#,
        params![
            artifact.id,
            artifact.run_id,
            artifact.org_id,
            artifact.kind.as_str(),
            artifact.storage_key,
            artifact.content_hash,
            artifact.created_at,
        ],
    )
    .context("Failed to insert artifact")?;

    Ok(())
}

fn get_artifact_impl(
    conn: &Connection,
    org_id: &str,
    run_id: &str,
    kind: ArtifactKind,
) -> Result<Option<Artifact>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, run_id, org_id, kind, storage_key, content_hash, created_at
            FROM artifacts
            WHERE org_id = ? AND run_id = ? AND kind = ?
            ORDER BY created_at DESC LIMIT 1
            "#,
        )
        .context("Failed to prepare get_artifact query")?;

    let result = stmt.query_row(params![org_id, run_id, kind.as_str()], row_to_artifact);

    match result {
        Ok(artifact) => Ok(Some(artifact)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e).context("Failed to get artifact"),
    }
}

fn list_artifacts_impl(conn: &Connection, org_id: &str, run_id: &str) -> Result<Vec<Artifact>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, run_id, org_id, kind, storage_key, content_hash, created_at
            FROM artifacts
            WHERE org_id = ? AND run_id = ?
            ORDER BY created_at ASC
            "#,
        )
        .context("Failed to prepare list_artifacts query")?;

    let artifacts = stmt
        .query_map(params![org_id, run_id], row_to_artifact)
        .context("Failed to query artifacts")?;

    artifacts
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect artifacts")
}
