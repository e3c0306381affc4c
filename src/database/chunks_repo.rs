// Recording chunks repository for workshop-scribe

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::models::RecordingChunk;
use super::DatabaseManager;

impl DatabaseManager {
    /// Insert a chunk row. Chunks are immutable once created.
    pub fn insert_chunk(&self, chunk: &RecordingChunk) -> Result<()> {
        self.with_connection(|conn| insert_chunk_impl(conn, chunk))
    }

    /// All chunks for a recording, ordered by chunk index
    pub fn get_chunks_for_recording(&self, recording_id: &str) -> Result<Vec<RecordingChunk>> {
        self.with_connection(|conn| get_chunks_impl(conn, recording_id))
    }
}

fn insert_chunk_impl(conn: &Connection, chunk: &RecordingChunk) -> Result<()> {
    conn.execute(
        r#"
        INSERT INTO recording_chunks (
            id, recording_id, chunk_index, start_ms, end_ms, storage_key, sha256, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
        params![
            chunk.id,
            chunk.recording_id,
            chunk.chunk_index,
            chunk.start_ms,
            chunk.end_ms,
            chunk.storage_key,
            chunk.sha256,
            chunk.created_at,
        ],
    )
    .context("Failed to insert recording chunk")?;

    Ok(())
}

fn get_chunks_impl(conn: &Connection, recording_id: &str) -> Result<Vec<RecordingChunk>> {
    let mut stmt = conn
        .prepare(
            r#"
            SELECT id, recording_id, chunk_index, start_ms, end_ms, storage_key, sha256, created_at
            FROM recording_chunks
            WHERE recording_id = ?
            ORDER BY chunk_index ASC
            "#,
        )
        .context("Failed to prepare get_chunks query")?;

    let chunks = stmt
        .query_map(params![recording_id], |row| {
            Ok(RecordingChunk {
                id: row.get(0)?,
                recording_id: row.get(1)?,
                chunk_index: row.get(2)?,
                start_ms: row.get(3)?,
                end_ms: row.get(4)?,
                storage_key: row.get(5)?,
                sha256: row.get(6)?,
                created_at: row.get(7)?,
            })
        })
        .context("Failed to query recording chunks")?;

    chunks
        .collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect recording chunks")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::Recording;

    #[test]
    fn test_chunks_ordered_by_index() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let rec = Recording::new(
            "rec_1".to_string(),
            "org_1".to_string(),
            "a.wav".to_string(),
            "org/org_1/recording/rec_1/raw/a.wav".to_string(),
        );
        db.create_recording(&rec).unwrap();

        for (id, index) in [("chk_b", 1), ("chk_a", 0)] {
            db.insert_chunk(&RecordingChunk {
                id: id.to_string(),
                recording_id: "rec_1".to_string(),
                chunk_index: index,
                start_ms: index * 1_000,
                end_ms: (index + 1) * 1_000,
                storage_key: format!("org/org_1/recording/rec_1/chunks/{}.wav", index),
                sha256: None,
                created_at: chrono::Utc::now().to_rfc3339(),
            })
            .unwrap();
        }

        let chunks = db.get_chunks_for_recording("rec_1").unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].chunk_index, 0);
        assert_eq!(chunks[1].chunk_index, 1);
    }

    #[test]
    fn test_duplicate_index_rejected() {
        let db = DatabaseManager::open_in_memory().unwrap();
        let rec = Recording::new(
            "rec_1".to_string(),
            "org_1".to_string(),
            "a.wav".to_string(),
            "org/org_1/recording/rec_1/raw/a.wav".to_string(),
        );
        db.create_recording(&rec).unwrap();

        let chunk = RecordingChunk {
            id: "chk_1".to_string(),
            recording_id: "rec_1".to_string(),
            chunk_index: 0,
            start_ms: 0,
            end_ms: 1_000,
            storage_key: "k".to_string(),
            sha256: None,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        db.insert_chunk(&chunk).unwrap();

        let dup = RecordingChunk {
            id: "chk_2".to_string(),
            ..chunk
        };
        assert!(db.insert_chunk(&dup).is_err());
    }
}
