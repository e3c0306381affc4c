// Pipeline orchestrator
//
// Runs the fixed step sequence for one recording. Progress is persisted
// after every step (the run's completed-step log is the sole source of
// truth for resume), the first failure is recorded without aborting the
// run, and finalize always executes to write the terminal statuses.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use super::gate::GateConfig;
use super::policy::{policy_for, run_with_policy, StepPolicy};
use super::steps::ChunkRef;
use super::{StepName, STEP_ORDER};
use crate::analysis::AnalysisProvider;
use crate::audio::segmenter::{SegmenterConfig, DEFAULT_OVERLAP_MS};
use crate::database::models::{Recording, RecordingStatus, RunStatus};
use crate::database::DatabaseManager;
use crate::hooks::{LogNotifier, NoopGrouper, Notifier, RecordingGrouper};
use crate::storage::ObjectStore;
use crate::transcript::{ChunkTranscript, TranscriptDoc};

/// Orchestrator configuration
#[derive(Clone)]
pub struct PipelineConfig {
    pub provider_name: String,
    pub model: String,
    /// Recordings longer than this are split before transcription
    pub max_chunk_duration_ms: i64,
    pub overlap_ms: i64,
    /// Scratch space for staging audio during a split
    pub work_dir: PathBuf,
    pub gate: GateConfig,
    pub segmenter: SegmenterConfig,
    /// Per-step policy table; swapped out in tests
    pub policy_fn: fn(StepName) -> StepPolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            provider_name: "http".to_string(),
            model: "scribe-large".to_string(),
            max_chunk_duration_ms: 3_600_000,
            overlap_ms: DEFAULT_OVERLAP_MS,
            work_dir: std::env::temp_dir().join("workshop-scribe"),
            gate: GateConfig::default(),
            segmenter: SegmenterConfig::default(),
            policy_fn: policy_for,
        }
    }
}

/// Result of one pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_status: RunStatus,
    pub recording_status: RecordingStatus,
    pub completed_steps: Vec<StepName>,
    pub failed_step: Option<StepName>,
    pub error: Option<String>,
}

pub struct Pipeline {
    pub(super) db: Arc<DatabaseManager>,
    pub(super) store: Arc<dyn ObjectStore>,
    pub(super) provider: Arc<dyn AnalysisProvider>,
    pub(super) grouper: Arc<dyn RecordingGrouper>,
    pub(super) notifier: Arc<dyn Notifier>,
    pub(super) config: PipelineConfig,
}

impl Pipeline {
    pub fn new(
        db: Arc<DatabaseManager>,
        store: Arc<dyn ObjectStore>,
        provider: Arc<dyn AnalysisProvider>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            db,
            store,
            provider,
            grouper: Arc::new(NoopGrouper),
            notifier: Arc::new(LogNotifier),
            config,
        }
    }

    pub fn with_hooks(
        mut self,
        grouper: Arc<dyn RecordingGrouper>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        self.grouper = grouper;
        self.notifier = notifier;
        self
    }

    pub fn db(&self) -> &DatabaseManager {
        &self.db
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Run the pipeline for one recording.
    ///
    /// With `from_step`, every earlier step is treated as already
    /// completed: its completion log is reloaded from the run row and
    /// its outputs are reloaded from persisted artifacts on demand.
    pub async fn run(
        &self,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
        from_step: Option<StepName>,
    ) -> Result<PipelineOutcome> {
        let start_index = from_step.map(|s| s.index()).unwrap_or(0);
        let should_run = |step: StepName| step.index() >= start_index;

        log::info!(
            "Starting pipeline run {} for recording {} (from step {})",
            run_id,
            recording_id,
            STEP_ORDER[start_index]
        );

        let mut completed: Vec<StepName> = Vec::new();
        if start_index > 0 {
            let run = self.db.require_run(org_id, run_id)?;
            for name in &run.completed_steps {
                if let Some(step) = StepName::parse(name) {
                    if !completed.contains(&step) {
                        completed.push(step);
                    }
                }
            }
        }

        let mut failed_step: Option<StepName> = None;
        let mut error_message: Option<String> = None;

        // Step outputs, filled as steps run or lazily reloaded on resume
        let mut recording: Option<Recording> = None;
        let mut chunks: Option<Vec<ChunkRef>> = None;
        let mut chunk_transcripts: Option<Vec<ChunkTranscript>> = None;
        let mut transcript: Option<TranscriptDoc> = None;

        macro_rules! record_failure {
            ($step:expr, $err:expr) => {{
                let err = $err;
                log::error!("Step {} failed for {}: {:#}", $step, recording_id, err);
                if failed_step.is_none() {
                    failed_step = Some($step);
                    error_message = Some(format!("{:#}", err));
                }
            }};
        }

        macro_rules! mark_complete {
            ($step:expr) => {{
                if let Err(e) = self
                    .db
                    .append_completed_step(org_id, run_id, $step.as_str())
                {
                    log::warn!("Failed to persist completion of {}: {:#}", $step, e);
                }
                if !completed.contains(&$step) {
                    completed.push($step);
                }
            }};
        }

        // ----- load_metadata -----
        if should_run(StepName::LoadMetadata) {
            let step = StepName::LoadMetadata;
            let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                self.step_load_metadata(org_id, recording_id, run_id)
            })
            .await;
            match result {
                Ok(rec) => {
                    recording = Some(rec);
                    mark_complete!(step);
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- ensure_audio_access -----
        if should_run(StepName::EnsureAudioAccess) && failed_step.is_none() {
            let step = StepName::EnsureAudioAccess;
            match self.cached_recording(&mut recording, org_id, recording_id) {
                Ok(rec) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_ensure_audio_access(&rec)
                    })
                    .await;
                    match result {
                        // The presigned URL is regenerated per chunk at
                        // transcription time; this step gates on existence
                        Ok(_access) => mark_complete!(step),
                        Err(e) => record_failure!(step, e),
                    }
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- maybe_split_audio -----
        if should_run(StepName::MaybeSplitAudio) && failed_step.is_none() {
            let step = StepName::MaybeSplitAudio;
            match self.cached_recording(&mut recording, org_id, recording_id) {
                Ok(rec) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_maybe_split_audio(&rec)
                    })
                    .await;
                    match result {
                        Ok(refs) => {
                            chunks = Some(refs);
                            mark_complete!(step);
                        }
                        Err(e) => record_failure!(step, e),
                    }
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- transcribe_chunks -----
        if should_run(StepName::TranscribeChunks) && failed_step.is_none() {
            let step = StepName::TranscribeChunks;
            match self.resolve_chunks(&mut chunks, &mut recording, org_id, recording_id).await {
                Ok(refs) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_transcribe_chunks(org_id, recording_id, run_id, &refs)
                    })
                    .await;
                    match result {
                        Ok(transcripts) => {
                            chunk_transcripts = Some(transcripts);
                            mark_complete!(step);
                        }
                        Err(e) => record_failure!(step, e),
                    }
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- merge_transcripts -----
        if should_run(StepName::MergeTranscripts) && failed_step.is_none() {
            let step = StepName::MergeTranscripts;
            let inputs = match chunk_transcripts.take() {
                Some(transcripts) => Ok(Some(transcripts)),
                None => self
                    .reload_chunk_transcripts(&mut chunks, &mut recording, org_id, recording_id, run_id)
                    .await,
            };
            match inputs {
                Ok(Some(transcripts)) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_merge_transcripts(
                            org_id,
                            recording_id,
                            run_id,
                            transcripts.clone(),
                        )
                    })
                    .await;
                    match result {
                        Ok(doc) => {
                            transcript = Some(doc);
                            mark_complete!(step);
                        }
                        Err(e) => record_failure!(step, e),
                    }
                }
                Ok(None) => record_failure!(
                    step,
                    anyhow::anyhow!("No chunk transcripts available to merge")
                ),
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- summarize -----
        if should_run(StepName::Summarize) {
            let step = StepName::Summarize;
            match self.resolve_transcript(&mut transcript, org_id, run_id).await {
                Ok(Some(doc)) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_summarize(org_id, recording_id, run_id, &doc)
                    })
                    .await;
                    match result {
                        Ok(_) => mark_complete!(step),
                        Err(e) => record_failure!(step, e),
                    }
                }
                Ok(None) => log::info!("Skipping summarize for {}: no transcript", recording_id),
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- claims_extract -----
        if should_run(StepName::ClaimsExtract) {
            let step = StepName::ClaimsExtract;
            match self.resolve_transcript(&mut transcript, org_id, run_id).await {
                Ok(Some(doc)) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_claims_extract(org_id, recording_id, run_id, &doc)
                    })
                    .await;
                    match result {
                        Ok(_) => mark_complete!(step),
                        Err(e) => record_failure!(step, e),
                    }
                }
                Ok(None) => {
                    log::info!("Skipping claims_extract for {}: no transcript", recording_id)
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- group -----
        if should_run(StepName::Group) {
            let step = StepName::Group;
            match self.cached_recording(&mut recording, org_id, recording_id) {
                Ok(rec) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_group(&rec)
                    })
                    .await;
                    match result {
                        Ok(_) => mark_complete!(step),
                        Err(e) => record_failure!(step, e),
                    }
                }
                Err(e) => record_failure!(step, e),
            }
        }

        // ----- index_for_search (non-critical) -----
        if should_run(StepName::IndexForSearch) {
            let step = StepName::IndexForSearch;
            match self.resolve_transcript(&mut transcript, org_id, run_id).await {
                Ok(Some(doc)) => {
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_index_for_search(org_id, recording_id, &doc)
                    })
                    .await;
                    if let Err(e) = result {
                        // Non-critical: never blocks finalization
                        log::error!("index_for_search failed for {}: {:#}", recording_id, e);
                    }
                    mark_complete!(step);
                }
                Ok(None) => {
                    log::info!("Skipping index_for_search for {}: no transcript", recording_id)
                }
                Err(e) => log::error!(
                    "Skipping index_for_search for {}: transcript unavailable: {:#}",
                    recording_id,
                    e
                ),
            }
        }

        // ----- notify (non-critical) -----
        if should_run(StepName::Notify) {
            let step = StepName::Notify;
            let (preview_status, _) = determine_statuses(&completed, failed_step);
            match self.cached_recording(&mut recording, org_id, recording_id) {
                Ok(rec) => {
                    let failed_name = failed_step.map(|s| s.as_str());
                    let result = run_with_policy(step, &(self.config.policy_fn)(step), || {
                        self.step_notify(&rec, preview_status, failed_name)
                    })
                    .await;
                    if let Err(e) = result {
                        log::error!("notify failed for {}: {:#}", recording_id, e);
                    }
                }
                Err(e) => log::error!("notify skipped for {}: {:#}", recording_id, e),
            }
            mark_complete!(step);
        }

        // ----- finalize -----
        let (run_status, recording_status) = determine_statuses(&completed, failed_step);
        let completed_strings: Vec<String> =
            completed.iter().map(|s| s.as_str().to_string()).collect();
        let failed_name = failed_step.map(|s| s.as_str().to_string());
        let error_clone = error_message.clone();

        let step = StepName::Finalize;
        run_with_policy(step, &(self.config.policy_fn)(step), || {
            let steps = completed_strings.clone();
            let failed = failed_name.clone();
            let error = error_clone.clone();
            async move {
                self.db.finalize_run(
                    org_id,
                    run_id,
                    recording_id,
                    run_status,
                    recording_status,
                    &steps,
                    failed.as_deref(),
                    error.as_deref(),
                )
            }
        })
        .await?;

        log::info!(
            "Pipeline run {} for {} finished with status {} ({} steps completed)",
            run_id,
            recording_id,
            run_status,
            completed.len()
        );

        Ok(PipelineOutcome {
            run_status,
            recording_status,
            completed_steps: completed,
            failed_step,
            error: error_message,
        })
    }

    fn cached_recording(
        &self,
        cache: &mut Option<Recording>,
        org_id: &str,
        recording_id: &str,
    ) -> Result<Recording> {
        if let Some(rec) = cache.as_ref() {
            return Ok(rec.clone());
        }
        let rec = self.db.require_recording(org_id, recording_id)?;
        *cache = Some(rec.clone());
        Ok(rec)
    }

    /// Chunk list from the split step, or re-derived from persisted rows
    /// (and recording metadata) when resuming past it.
    async fn resolve_chunks(
        &self,
        cache: &mut Option<Vec<ChunkRef>>,
        recording: &mut Option<Recording>,
        org_id: &str,
        recording_id: &str,
    ) -> Result<Vec<ChunkRef>> {
        if let Some(refs) = cache.as_ref() {
            return Ok(refs.clone());
        }
        let rec = self.cached_recording(recording, org_id, recording_id)?;
        let refs = self.step_maybe_split_audio(&rec).await?;
        *cache = Some(refs.clone());
        Ok(refs)
    }

    async fn reload_chunk_transcripts(
        &self,
        chunks: &mut Option<Vec<ChunkRef>>,
        recording: &mut Option<Recording>,
        org_id: &str,
        recording_id: &str,
        run_id: &str,
    ) -> Result<Option<Vec<ChunkTranscript>>> {
        let refs = self
            .resolve_chunks(chunks, recording, org_id, recording_id)
            .await?;
        self.load_chunk_transcripts(org_id, recording_id, run_id, &refs)
            .await
    }

    async fn resolve_transcript(
        &self,
        cache: &mut Option<TranscriptDoc>,
        org_id: &str,
        run_id: &str,
    ) -> Result<Option<TranscriptDoc>> {
        if let Some(doc) = cache.as_ref() {
            return Ok(Some(doc.clone()));
        }
        match self.load_transcript_artifact(org_id, run_id).await? {
            Some(doc) => {
                *cache = Some(doc.clone());
                Ok(Some(doc))
            }
            None => Ok(None),
        }
    }
}

/// Terminal status from the completed-step set and first failure.
/// DONE needs every non-finalize step; ERROR means a failure with no
/// substantive progress (the always-completing notify and index steps do
/// not count as progress).
fn determine_statuses(
    completed: &[StepName],
    failed_step: Option<StepName>,
) -> (RunStatus, RecordingStatus) {
    let all_completed = STEP_ORDER
        .iter()
        .filter(|s| **s != StepName::Finalize)
        .all(|s| completed.contains(s));

    if all_completed {
        return (RunStatus::Done, RecordingStatus::Done);
    }

    if failed_step.is_some() {
        let substantive = completed
            .iter()
            .filter(|s| {
                !matches!(
                    s,
                    StepName::LoadMetadata | StepName::IndexForSearch | StepName::Notify
                )
            })
            .count();
        if substantive == 0 {
            return (RunStatus::Error, RecordingStatus::Error);
        }
        return (RunStatus::Partial, RecordingStatus::Partial);
    }

    (RunStatus::Done, RecordingStatus::Done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{AnalysisError, SummaryBody, TranscriptionResult};
    use crate::database::models::RecordingChunk;
    use crate::pipeline::policy::Backoff;
    use crate::storage::{keys, LocalObjectStore};
    use crate::transcript::{Claim, ClaimStance, TranscriptSegment};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    struct MockProvider {
        transcripts: Mutex<VecDeque<TranscriptionResult>>,
        fail_summarize: bool,
    }

    impl MockProvider {
        fn new(transcripts: Vec<TranscriptionResult>) -> Self {
            Self {
                transcripts: Mutex::new(transcripts.into()),
                fail_summarize: false,
            }
        }

        fn failing_summarize(transcripts: Vec<TranscriptionResult>) -> Self {
            Self {
                transcripts: Mutex::new(transcripts.into()),
                fail_summarize: true,
            }
        }
    }

    #[async_trait]
    impl AnalysisProvider for MockProvider {
        async fn transcribe(
            &self,
            _audio_url: &str,
            _mime_type: &str,
        ) -> Result<TranscriptionResult, AnalysisError> {
            let mut queue = self.transcripts.lock().unwrap();
            queue.pop_front().ok_or_else(|| {
                AnalysisError::RequestFailed("no transcript queued".to_string())
            })
        }

        async fn summarize(&self, _text: &str) -> Result<SummaryBody, AnalysisError> {
            if self.fail_summarize {
                return Err(AnalysisError::RequestFailed(
                    "summarizer unavailable".to_string(),
                ));
            }
            Ok(SummaryBody {
                short_summary: "short".to_string(),
                long_summary: "long".to_string(),
                key_points: vec!["point".to_string()],
                decisions: vec![],
                open_items: vec![],
            })
        }

        async fn extract_claims(&self, _text: &str) -> Result<Vec<Claim>, AnalysisError> {
            Ok(vec![Claim {
                text: "the venue was booked".to_string(),
                stance: ClaimStance::Affirm,
                speaker: "S1".to_string(),
                start_ms: 0,
                end_ms: 1_000,
                quote: "we booked the venue".to_string(),
                evidence_segment_ids: vec!["seg-0001".to_string()],
            }])
        }
    }

    fn seg(start_ms: i64, end_ms: i64, confidence: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment {
            segment_id: String::new(),
            speaker: "S1".to_string(),
            start_ms,
            end_ms,
            text: text.to_string(),
            confidence,
        }
    }

    fn test_config(work_dir: PathBuf) -> PipelineConfig {
        PipelineConfig {
            max_chunk_duration_ms: 1_200_000,
            work_dir,
            gate: GateConfig {
                max_concurrent: 2,
                ttl_seconds: 300,
                wait_interval: Duration::from_millis(5),
                max_wait_attempts: 3,
            },
            policy_fn: |_| StepPolicy {
                retry_limit: 1,
                delay: Duration::from_millis(1),
                backoff: Backoff::Constant,
                timeout: Duration::from_secs(10),
            },
            ..PipelineConfig::default()
        }
    }

    struct Harness {
        _dir: tempfile::TempDir,
        db: Arc<DatabaseManager>,
        store: Arc<LocalObjectStore>,
        work_dir: PathBuf,
    }

    fn harness() -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let db = Arc::new(DatabaseManager::open_in_memory().unwrap());
        let store = Arc::new(LocalObjectStore::new(dir.path().join("objects")).unwrap());
        let work_dir = dir.path().join("work");
        Harness {
            _dir: dir,
            db,
            store,
            work_dir,
        }
    }

    async fn seed_recording(h: &Harness, duration_ms: i64) {
        let mut rec = Recording::new(
            "rec_1".to_string(),
            "org_1".to_string(),
            "session.wav".to_string(),
            keys::raw_key("org_1", "rec_1", "session.wav"),
        );
        rec.duration_ms = Some(duration_ms);
        rec.size_bytes = 1_024;
        h.db.create_recording(&rec).unwrap();
        h.db.set_recording_status("org_1", "rec_1", RecordingStatus::Uploading)
            .unwrap();
        h.db.set_recording_status("org_1", "rec_1", RecordingStatus::Uploaded)
            .unwrap();
        h.store.put(&rec.raw_key, b"raw-audio").await.unwrap();
        h.db.create_run("org_1", "run_1", "rec_1", "http", "scribe-large")
            .unwrap();
    }

    /// 40 minutes of audio, 20 minute chunk limit, silence near minute
    /// 20: two overlapping chunks whose boundary reading is taken from
    /// the more confident first chunk, ending in DONE.
    #[tokio::test]
    async fn test_two_chunk_run_ends_done() {
        let h = harness();
        seed_recording(&h, 2_400_000).await;

        // Chunks as the segmenter would plan them around a silence at
        // minute 20 (pre-split by the importer)
        for (index, start_ms, end_ms) in [(0, 0, 1_201_000), (1, 1_199_000, 2_400_000)] {
            let key = keys::chunk_key("org_1", "rec_1", index, start_ms, end_ms, "wav");
            h.store.put(&key, b"chunk-audio").await.unwrap();
            h.db.insert_chunk(&RecordingChunk {
                id: format!("chk_{}", index),
                recording_id: "rec_1".to_string(),
                chunk_index: index,
                start_ms,
                end_ms,
                storage_key: key,
                sha256: None,
                created_at: chrono::Utc::now().to_rfc3339(),
            })
            .unwrap();
        }

        // Chunk-relative transcripts; the overlap window is
        // [1_199_000, 1_201_000] with confidences 0.9 vs 0.6
        let provider = MockProvider::new(vec![
            TranscriptionResult {
                language: "en".to_string(),
                segments: vec![
                    seg(0, 600_000, 0.95, "first body"),
                    seg(1_199_200, 1_200_800, 0.9, "overlap from chunk zero"),
                ],
            },
            TranscriptionResult {
                language: "en".to_string(),
                segments: vec![
                    seg(100, 1_900, 0.6, "overlap from chunk one"),
                    seg(300_000, 900_000, 0.9, "second body"),
                ],
            },
        ]);

        let pipeline = Pipeline::new(
            h.db.clone(),
            h.store.clone(),
            Arc::new(provider),
            test_config(h.work_dir.clone()),
        );

        let outcome = pipeline.run("org_1", "rec_1", "run_1", None).await.unwrap();

        assert_eq!(outcome.run_status, RunStatus::Done);
        assert_eq!(outcome.recording_status, RecordingStatus::Done);
        assert!(outcome.failed_step.is_none());

        let rec = h.db.get_recording("org_1", "rec_1").unwrap().unwrap();
        assert_eq!(rec.status, RecordingStatus::Done);

        let run = h.db.get_run("org_1", "run_1").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Done);
        assert_eq!(run.completed_steps.len(), 10);

        // Merged transcript kept the confident first chunk's overlap
        let transcript_key = keys::artifact_key("org_1", "rec_1", "run_1", "transcript.json");
        let bytes = h.store.get(&transcript_key).await.unwrap().unwrap();
        let doc: TranscriptDoc = serde_json::from_slice(&bytes).unwrap();
        let texts: Vec<_> = doc.segments.iter().map(|s| s.text.as_str()).collect();
        assert_eq!(
            texts,
            vec!["first body", "overlap from chunk zero", "second body"]
        );
        let ids: Vec<_> = doc.segments.iter().map(|s| s.segment_id.as_str()).collect();
        assert_eq!(ids, vec!["seg-0001", "seg-0002", "seg-0003"]);

        // Summary and claims artifacts were persisted as rows too
        assert!(h
            .db
            .get_artifact("org_1", "run_1", crate::database::models::ArtifactKind::Summary)
            .unwrap()
            .is_some());
        assert!(h
            .db
            .get_artifact("org_1", "run_1", crate::database::models::ArtifactKind::Claims)
            .unwrap()
            .is_some());

        // Search was indexed and all gate slots were released
        assert_eq!(h.db.search_transcripts("org_1", "overlap").unwrap().len(), 1);
        assert_eq!(h.db.count_active_slots("org_1").unwrap(), 0);
    }

    /// Summarize exhausts its retries: claims are still attempted and
    /// the run degrades to PARTIAL instead of aborting.
    #[tokio::test]
    async fn test_summarize_failure_degrades_to_partial() {
        let h = harness();
        seed_recording(&h, 600_000).await;

        let provider = MockProvider::failing_summarize(vec![TranscriptionResult {
            language: "en".to_string(),
            segments: vec![seg(0, 500_000, 0.9, "the whole meeting")],
        }]);

        let pipeline = Pipeline::new(
            h.db.clone(),
            h.store.clone(),
            Arc::new(provider),
            test_config(h.work_dir.clone()),
        );

        let outcome = pipeline.run("org_1", "rec_1", "run_1", None).await.unwrap();

        assert_eq!(outcome.run_status, RunStatus::Partial);
        assert_eq!(outcome.failed_step, Some(StepName::Summarize));
        assert!(outcome.completed_steps.contains(&StepName::ClaimsExtract));
        assert!(!outcome.completed_steps.contains(&StepName::Summarize));

        let rec = h.db.get_recording("org_1", "rec_1").unwrap().unwrap();
        assert_eq!(rec.status, RecordingStatus::Partial);

        let run = h.db.get_run("org_1", "run_1").unwrap().unwrap();
        assert_eq!(run.status, RunStatus::Partial);
        assert_eq!(run.failed_step.as_deref(), Some("summarize"));
        assert!(run.error.is_some());

        // Claims artifact exists despite the summarize failure
        let claims_key = keys::artifact_key("org_1", "rec_1", "run_1", "claims.json");
        assert!(h.store.head(&claims_key).await.unwrap());
    }

    /// A recording that never existed: nothing substantive completes and
    /// the run ends in ERROR.
    #[tokio::test]
    async fn test_missing_recording_is_error() {
        let h = harness();
        let provider = MockProvider::new(vec![]);
        let pipeline = Pipeline::new(
            h.db.clone(),
            h.store.clone(),
            Arc::new(provider),
            test_config(h.work_dir.clone()),
        );

        let outcome = pipeline
            .run("org_1", "rec_missing", "run_x", None)
            .await
            .unwrap();

        assert_eq!(outcome.run_status, RunStatus::Error);
        assert_eq!(outcome.failed_step, Some(StepName::LoadMetadata));
    }

    /// Resuming from summarize reloads the transcript artifact instead
    /// of recomputing earlier steps.
    #[tokio::test]
    async fn test_resume_from_summarize() {
        let h = harness();
        seed_recording(&h, 600_000).await;

        // First pass with a failing summarizer
        let provider = MockProvider::failing_summarize(vec![TranscriptionResult {
            language: "en".to_string(),
            segments: vec![seg(0, 500_000, 0.9, "the whole meeting")],
        }]);
        let pipeline = Pipeline::new(
            h.db.clone(),
            h.store.clone(),
            Arc::new(provider),
            test_config(h.work_dir.clone()),
        );
        let outcome = pipeline.run("org_1", "rec_1", "run_1", None).await.unwrap();
        assert_eq!(outcome.run_status, RunStatus::Partial);

        // Re-enter processing and resume with a healthy provider; the
        // transcript queue is empty, so any transcription call would fail
        h.db.reopen_run("org_1", "run_1").unwrap();
        h.db.set_recording_status("org_1", "rec_1", RecordingStatus::Processing)
            .unwrap();

        let provider = MockProvider::new(vec![]);
        let pipeline = Pipeline::new(
            h.db.clone(),
            h.store.clone(),
            Arc::new(provider),
            test_config(h.work_dir.clone()),
        );
        let outcome = pipeline
            .run("org_1", "rec_1", "run_1", Some(StepName::Summarize))
            .await
            .unwrap();

        assert_eq!(outcome.run_status, RunStatus::Done);
        assert!(outcome.completed_steps.contains(&StepName::Summarize));

        let summary_key = keys::artifact_key("org_1", "rec_1", "run_1", "summary.json");
        assert!(h.store.head(&summary_key).await.unwrap());
    }

    #[test]
    fn test_determine_statuses() {
        use StepName::*;

        let all: Vec<StepName> = STEP_ORDER
            .iter()
            .copied()
            .filter(|s| *s != Finalize)
            .collect();
        assert_eq!(
            determine_statuses(&all, None),
            (RunStatus::Done, RecordingStatus::Done)
        );

        let partial = vec![
            LoadMetadata,
            EnsureAudioAccess,
            MaybeSplitAudio,
            TranscribeChunks,
            MergeTranscripts,
        ];
        assert_eq!(
            determine_statuses(&partial, Some(Summarize)),
            (RunStatus::Partial, RecordingStatus::Partial)
        );

        // Only the always-completing steps ran: that is no progress
        let hollow = vec![LoadMetadata, Notify];
        assert_eq!(
            determine_statuses(&hollow, Some(EnsureAudioAccess)),
            (RunStatus::Error, RecordingStatus::Error)
        );
    }
}
