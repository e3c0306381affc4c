// Search functionality for workshop-scribe
// Full-text search over merged transcript segments (FTS5)

use anyhow::{Context, Result};
use rusqlite::{params, Connection};

use super::DatabaseManager;
use crate::transcript::TranscriptSegment;

/// A full-text search match
#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub recording_id: String,
    pub segment_id: String,
    pub speaker: String,
    pub snippet: String,
}

impl DatabaseManager {
    /// Replace the FTS rows for a recording with the given segments.
    /// Returns the number of segments indexed.
    pub fn index_transcript_segments(
        &self,
        org_id: &str,
        recording_id: &str,
        segments: &[TranscriptSegment],
    ) -> Result<usize> {
        self.with_connection(|conn| index_segments_impl(conn, org_id, recording_id, segments))
    }

    /// Search indexed transcript text
    pub fn search_transcripts(&self, org_id: &str, query: &str) -> Result<Vec<SearchHit>> {
        self.with_connection(|conn| search_transcripts_impl(conn, org_id, query))
    }
}

fn index_segments_impl(
    conn: &Connection,
    org_id: &str,
    recording_id: &str,
    segments: &[TranscriptSegment],
) -> Result<usize> {
    // Re-indexing replaces any previous rows for the recording
    conn.execute(
        "DELETE FROM transcript_fts WHERE org_id = ? AND recording_id = ?",
        params![org_id, recording_id],
    )
    .context("Failed to clear previous transcript index")?;

    let mut stmt = conn
        .prepare(
            r#"
            INSERT INTO transcript_fts (org_id, recording_id, segment_id, speaker, text)
            VALUES (?1, ?2, ?3, ?4, ?5)
            "#,
        )
        .context("Failed to prepare transcript index insert")?;

    let mut indexed = 0;
    for segment in segments {
        stmt.execute(params![
            org_id,
            recording_id,
            segment.segment_id,
            segment.speaker,
            segment.text,
        ])
        .context("Failed to index transcript segment")?;
        indexed += 1;
    }

    Ok(indexed)
}

fn search_transcripts_impl(
    conn: &Connection,
    org_id: &str,
    query: &str,
) -> Result<Vec<SearchHit>> {
    // FTS5 query - escape embedded quotes and phrase-quote the input
    let fts_query = format!("\"{}\"", query.replace('"', "\"\""));

    let mut stmt = conn
        .prepare(
            r#"
            SELECT recording_id, segment_id, speaker,
                   snippet(transcript_fts, 4, '<mark>', '</mark>', '...', 32) as snippet
            FROM transcript_fts
            WHERE org_id = ? AND transcript_fts MATCH ?
            LIMIT 50
            "#,
        )
        .context("Failed to prepare FTS query")?;

    let hits = stmt
        .query_map(params![org_id, fts_query], |row| {
            Ok(SearchHit {
                recording_id: row.get(0)?,
                segment_id: row.get(1)?,
                speaker: row.get(2)?,
                snippet: row.get(3)?,
            })
        })
        .context("Failed to execute FTS query")?;

    hits.collect::<std::result::Result<Vec<_>, _>>()
        .context("Failed to collect search hits")
}
