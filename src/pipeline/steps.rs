// Step implementations for the processing pipeline
//
// Each step is a plain async function on the Pipeline; sequencing,
// retries and failure bookkeeping live in the orchestrator. Artifacts
// are persisted the moment they are produced so a crash after step N
// can resume at step N+1 without recomputation.

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};

use super::gate;
use super::orchestrator::Pipeline;
use crate::analysis::TranscriptionResult;
use crate::audio::segmenter;
use crate::database::models::{
    Artifact, ArtifactKind, Recording, RecordingChunk, RecordingStatus, RunStatus,
};
use crate::database::NotFound;
use crate::hooks::GroupingOutcome;
use crate::ids;
use crate::storage::keys;
use crate::transcript::{
    merge_chunk_transcripts, renumber_segments, ChunkTranscript, ClaimsDoc, SummaryDoc,
    TranscriptDoc,
};

/// Minimum lifetime for presigned audio URLs handed to the service
const PRESIGN_MIN_TTL_SECS: u64 = 3_600;

/// A chunk as seen by the transcription step: either a row produced by
/// the segmenter (or an upstream client), or the whole raw file when no
/// split was needed.
#[derive(Debug, Clone)]
pub struct ChunkRef {
    pub chunk_index: i64,
    pub start_ms: i64,
    pub end_ms: i64,
    pub storage_key: String,
    pub mime_type: String,
}

/// Output of the audio access step
#[derive(Debug, Clone)]
pub struct AudioAccess {
    pub presigned_url: String,
    pub mime_type: String,
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

impl Pipeline {
    /// Step 1: load recording metadata and move it into PROCESSING.
    /// Also makes sure the run row exists so a trigger that died between
    /// inserts stays recoverable.
    pub(super) async fn step_load_metadata(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
    ) -> Result<Recording> {
        let recording = self.db.require_recording(org_id, recording_id)?;

        if recording.status != RecordingStatus::Processing {
            self.db
                .set_recording_status(org_id, recording_id, RecordingStatus::Processing)?;
        }

        if self.db.get_run(org_id, run_id)?.is_none() {
            self.db.create_run(
                org_id,
                run_id,
                recording_id,
                &self.config.provider_name,
                &self.config.model,
            )?;
        }

        self.db.require_recording(org_id, recording_id)
    }

    /// Step 2: verify the raw object exists and presign a read URL whose
    /// lifetime scales with the expected processing time.
    pub(super) async fn step_ensure_audio_access(&self, recording: &Recording) -> Result<AudioAccess> {
        if !self.store.head(&recording.raw_key).await? {
            return Err(NotFound::new("Raw audio object", recording.raw_key.clone()).into());
        }

        let estimated_secs = (recording.size_bytes as u64 / 32_000).max(1) / 2;
        let ttl = PRESIGN_MIN_TTL_SECS.max(estimated_secs * 3);

        let presigned_url = self.store.presign_get(&recording.raw_key, ttl).await?;

        Ok(AudioAccess {
            presigned_url,
            mime_type: recording.mime_type.clone(),
        })
    }

    /// Step 3: produce the chunk list. Pre-split chunks win; a recording
    /// within the duration limit flows through as one whole-file chunk;
    /// anything else is physically split at silence boundaries.
    pub(super) async fn step_maybe_split_audio(
        &self,
        recording: &Recording,
    ) -> Result<Vec<ChunkRef>> {
        let existing = self.db.get_chunks_for_recording(&recording.id)?;
        if !existing.is_empty() {
            return Ok(existing
                .iter()
                .map(|c| chunk_ref_from_row(c, &recording.mime_type))
                .collect());
        }

        let duration_ms = recording.duration_ms.unwrap_or(0);
        if duration_ms <= self.config.max_chunk_duration_ms {
            return Ok(vec![ChunkRef {
                chunk_index: 0,
                start_ms: 0,
                end_ms: duration_ms,
                storage_key: recording.raw_key.clone(),
                mime_type: recording.mime_type.clone(),
            }]);
        }

        if recording.mime_type != "audio/wav" && !recording.raw_key.ends_with(".wav") {
            anyhow::bail!(
                "Recording {} ({} ms) exceeds the {} ms chunk limit but its mime type {} \
                 cannot be split; re-import it pre-chunked",
                recording.id,
                duration_ms,
                self.config.max_chunk_duration_ms,
                recording.mime_type
            );
        }

        self.split_oversized_wav(recording).await
    }

    async fn split_oversized_wav(&self, recording: &Recording) -> Result<Vec<ChunkRef>> {
        let raw = self
            .store
            .get(&recording.raw_key)
            .await?
            .ok_or_else(|| NotFound::new("Raw audio object", recording.raw_key.clone()))?;

        let work_dir = self.config.work_dir.join(&recording.id);
        tokio::fs::create_dir_all(&work_dir)
            .await
            .context("Failed to create split work directory")?;
        let local_raw = work_dir.join(&recording.original_file_name);
        tokio::fs::write(&local_raw, &raw)
            .await
            .context("Failed to stage raw audio for splitting")?;

        let chunks = segmenter::split_wav_file(
            &local_raw,
            &work_dir,
            self.config.max_chunk_duration_ms,
            self.config.overlap_ms,
            &self.config.segmenter,
        )?;

        log::info!(
            "Split recording {} into {} chunks",
            recording.id,
            chunks.len()
        );

        let mut refs = Vec::with_capacity(chunks.len());
        for (span, path) in chunks {
            let bytes = tokio::fs::read(&path)
                .await
                .context("Failed to read chunk file")?;
            let storage_key = keys::chunk_key(
                &recording.org_id,
                &recording.id,
                span.index,
                span.start_ms,
                span.end_ms,
                "wav",
            );
            self.store.put(&storage_key, &bytes).await?;

            self.db.insert_chunk(&RecordingChunk {
                id: ids::generate_id(ids::CHUNK),
                recording_id: recording.id.clone(),
                chunk_index: span.index,
                start_ms: span.start_ms,
                end_ms: span.end_ms,
                storage_key: storage_key.clone(),
                sha256: Some(sha256_hex(&bytes)),
                created_at: chrono::Utc::now().to_rfc3339(),
            })?;

            refs.push(ChunkRef {
                chunk_index: span.index,
                start_ms: span.start_ms,
                end_ms: span.end_ms,
                storage_key,
                mime_type: "audio/wav".to_string(),
            });
        }

        let _ = tokio::fs::remove_dir_all(&work_dir).await;

        Ok(refs)
    }

    /// Step 4: transcribe chunks strictly in index order, each call
    /// individually gated because the external service is the scarce
    /// resource. Timestamps are shifted onto the recording's global
    /// timeline and each chunk transcript is persisted immediately.
    pub(super) async fn step_transcribe_chunks(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        chunks: &[ChunkRef],
    ) -> Result<Vec<ChunkTranscript>> {
        let mut results = Vec::with_capacity(chunks.len());

        for chunk in chunks {
            let holder = format!("{}-chunk-{}", recording_id, chunk.chunk_index);
            let slot = gate::acquire_slot(&self.db, org_id, &holder, &self.config.gate).await?;

            let outcome = self.transcribe_one_chunk(org_id, recording_id, run_id, chunk).await;

            self.db.release_slot(org_id, &slot.id)?;

            results.push(outcome?);
        }

        Ok(results)
    }

    async fn transcribe_one_chunk(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        chunk: &ChunkRef,
    ) -> Result<ChunkTranscript> {
        let url = self
            .store
            .presign_get(&chunk.storage_key, PRESIGN_MIN_TTL_SECS)
            .await?;

        let TranscriptionResult { language, segments } = self
            .provider
            .transcribe(&url, &chunk.mime_type)
            .await
            .map_err(anyhow::Error::new)?;

        let offset_segments = segments
            .into_iter()
            .map(|mut seg| {
                seg.start_ms += chunk.start_ms;
                seg.end_ms += chunk.start_ms;
                seg
            })
            .collect();

        let chunk_transcript = ChunkTranscript {
            chunk_index: chunk.chunk_index,
            start_ms: chunk.start_ms,
            end_ms: chunk.end_ms,
            language,
            segments: offset_segments,
        };

        let key = keys::artifact_key(
            org_id,
            recording_id,
            run_id,
            &format!("transcript-chunk-{}.json", chunk.chunk_index),
        );
        self.store
            .put(&key, &serde_json::to_vec(&chunk_transcript)?)
            .await?;

        Ok(chunk_transcript)
    }

    /// Step 5: merge chunk transcripts, renumber, persist the artifact
    pub(super) async fn step_merge_transcripts(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        chunk_transcripts: Vec<ChunkTranscript>,
    ) -> Result<TranscriptDoc> {
        let language = chunk_transcripts
            .first()
            .map(|c| c.language.clone())
            .unwrap_or_else(|| "en".to_string());

        let merged = merge_chunk_transcripts(chunk_transcripts);
        let segments = renumber_segments(merged);

        let doc = TranscriptDoc {
            recording_id: recording_id.to_string(),
            run_id: run_id.to_string(),
            language,
            provider: self.config.provider_name.clone(),
            model: self.config.model.clone(),
            segments,
        };

        self.persist_artifact(org_id, recording_id, run_id, ArtifactKind::Transcript, &doc)
            .await?;

        Ok(doc)
    }

    /// Step 6: structured summary of the merged transcript
    pub(super) async fn step_summarize(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        transcript: &TranscriptDoc,
    ) -> Result<SummaryDoc> {
        let holder = format!("{}-summarize", recording_id);
        let slot = gate::acquire_slot(&self.db, org_id, &holder, &self.config.gate).await?;

        let outcome = self
            .provider
            .summarize(&transcript.to_speaker_lines())
            .await
            .map_err(anyhow::Error::new);

        self.db.release_slot(org_id, &slot.id)?;
        let body = outcome?;

        let doc = SummaryDoc {
            recording_id: recording_id.to_string(),
            run_id: run_id.to_string(),
            short_summary: body.short_summary,
            long_summary: body.long_summary,
            key_points: body.key_points,
            decisions: body.decisions,
            open_items: body.open_items,
        };

        self.persist_artifact(org_id, recording_id, run_id, ArtifactKind::Summary, &doc)
            .await?;

        Ok(doc)
    }

    /// Step 7: stance-tagged claims with evidence segment ids
    pub(super) async fn step_claims_extract(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        transcript: &TranscriptDoc,
    ) -> Result<ClaimsDoc> {
        let holder = format!("{}-claims", recording_id);
        let slot = gate::acquire_slot(&self.db, org_id, &holder, &self.config.gate).await?;

        let outcome = self
            .provider
            .extract_claims(&transcript.to_evidence_lines())
            .await
            .map_err(anyhow::Error::new);

        self.db.release_slot(org_id, &slot.id)?;
        let claims = outcome?;

        let doc = ClaimsDoc {
            recording_id: recording_id.to_string(),
            run_id: run_id.to_string(),
            claims,
        };

        self.persist_artifact(org_id, recording_id, run_id, ArtifactKind::Claims, &doc)
            .await?;

        Ok(doc)
    }

    /// Step 8: hand the recording to the configured grouper
    pub(super) async fn step_group(&self, recording: &Recording) -> Result<GroupingOutcome> {
        self.grouper.group(&self.db, recording).await
    }

    /// Step 9: index the merged transcript for full-text search
    pub(super) async fn step_index_for_search(
        &self,
        org_id: &str,
        recording_id: &str,
        transcript: &TranscriptDoc,
    ) -> Result<usize> {
        let indexed = self
            .db
            .index_transcript_segments(org_id, recording_id, &transcript.segments)?;
        log::info!(
            "Indexed {} transcript segments for {}",
            indexed,
            recording_id
        );
        Ok(indexed)
    }

    /// Step 10: tell the notifier how the run is going to end
    pub(super) async fn step_notify(
        &self,
        recording: &Recording,
        status: RunStatus,
        failed_step: Option<&str>,
    ) -> Result<()> {
        self.notifier.notify(recording, status, failed_step).await
    }

    /// Serialize a document, store it under the run's artifact prefix
    /// and record the artifact row.
    async fn persist_artifact<T: serde::Serialize>(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        kind: ArtifactKind,
        doc: &T,
    ) -> Result<()> {
        let bytes = serde_json::to_vec(doc).context("Failed to serialize artifact")?;
        let storage_key = keys::artifact_key(org_id, recording_id, run_id, kind.file_name());

        self.store.put(&storage_key, &bytes).await?;

        self.db.insert_artifact(&Artifact {
            id: ids::generate_id(ids::ARTIFACT),
            run_id: run_id.to_string(),
            org_id: org_id.to_string(),
            kind,
            storage_key,
            content_hash: Some(sha256_hex(&bytes)),
            created_at: chrono::Utc::now().to_rfc3339(),
        })?;

        Ok(())
    }

    /// Reload the merged transcript from its persisted artifact, used
    /// when resuming past the merge step.
    pub(super) async fn load_transcript_artifact(
        &self,
        org_id: &str,
        run_id: &str,
    ) -> Result<Option<TranscriptDoc>> {
        let artifact = match self.db.get_artifact(org_id, run_id, ArtifactKind::Transcript)? {
            Some(artifact) => artifact,
            None => return Ok(None),
        };

        let bytes = match self.store.get(&artifact.storage_key).await? {
            Some(bytes) => bytes,
            None => return Ok(None),
        };

        let doc = serde_json::from_slice(&bytes).with_context(|| {
            format!(
                "Failed to parse transcript artifact {}",
                artifact.storage_key
            )
        })?;
        Ok(Some(doc))
    }

    /// Reload per-chunk transcripts from storage, used when resuming at
    /// the merge step.
    pub(super) async fn load_chunk_transcripts(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        chunks: &[ChunkRef],
    ) -> Result<Option<Vec<ChunkTranscript>>> {
        let mut transcripts = Vec::with_capacity(chunks.len());
        for chunk in chunks {
            let key = keys::artifact_key(
                org_id,
                recording_id,
                run_id,
                &format!("transcript-chunk-{}.json", chunk.chunk_index),
            );
            match self.store.get(&key).await? {
                Some(bytes) => transcripts.push(
                    serde_json::from_slice(&bytes)
                        .with_context(|| format!("Failed to parse chunk transcript {}", key))?,
                ),
                None => return Ok(None),
            }
        }
        Ok(Some(transcripts))
    }
}

fn chunk_ref_from_row(chunk: &RecordingChunk, mime_type: &str) -> ChunkRef {
    ChunkRef {
        chunk_index: chunk.chunk_index,
        start_ms: chunk.start_ms,
        end_ms: chunk.end_ms,
        storage_key: chunk.storage_key.clone(),
        mime_type: mime_type.to_string(),
    }
}
