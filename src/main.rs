// workshop-scribe worker and ingestion CLI

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use workshop_scribe::analysis::HttpAnalysisProvider;
use workshop_scribe::audio::segmenter;
use workshop_scribe::config::Config;
use workshop_scribe::database::models::{BatchStatus, ImportBatch, Recording, RecordingStatus};
use workshop_scribe::database::DatabaseManager;
use workshop_scribe::ids;
use workshop_scribe::pipeline::{Pipeline, StepName};
use workshop_scribe::storage::{keys, LocalObjectStore};
use workshop_scribe::uploader::{ResumableUploader, UploaderConfig};
use workshop_scribe::worker;

#[derive(Parser)]
#[command(name = "workshop-scribe", version, about = "Workshop recording processing pipeline")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Poll for uploaded recordings and process them
    Worker,
    /// Start a processing run for one recording
    Process {
        recording_id: String,
    },
    /// Resume a PARTIAL or ERROR recording, optionally at a given step
    Resume {
        recording_id: String,
        #[arg(long)]
        from_step: Option<String>,
    },
    /// Upload an audio file and register it as a recording
    Upload {
        file: PathBuf,
        /// Existing import batch to add the file to
        #[arg(long)]
        batch: Option<String>,
        /// Device label recorded on a newly created batch
        #[arg(long)]
        device: Option<String>,
    },
    /// Search indexed transcripts
    Search {
        query: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = Config::from_env()?;

    let db = Arc::new(DatabaseManager::new(config.db_path.clone())?);
    let store = Arc::new(LocalObjectStore::new(config.storage_root.clone())?);
    let provider = Arc::new(HttpAnalysisProvider::new(config.analysis_config()));
    let pipeline = Pipeline::new(
        db.clone(),
        store.clone(),
        provider,
        config.pipeline_config(),
    );

    match cli.command {
        Command::Worker => {
            worker::run_worker_loop(
                &pipeline,
                &config.org_id,
                Duration::from_secs(config.poll_interval_secs),
            )
            .await
        }
        Command::Process { recording_id } => {
            let outcome =
                worker::handle_upload_completed(&pipeline, &config.org_id, &recording_id).await?;
            println!(
                "Run finished: {} (failed step: {})",
                outcome.run_status,
                outcome
                    .failed_step
                    .map(|s| s.to_string())
                    .unwrap_or_else(|| "none".to_string())
            );
            Ok(())
        }
        Command::Resume {
            recording_id,
            from_step,
        } => {
            let step = match from_step {
                Some(name) => Some(
                    StepName::parse(&name)
                        .with_context(|| format!("Unknown step name: {}", name))?,
                ),
                None => None,
            };
            let outcome =
                worker::resume_recording(&pipeline, &config.org_id, &recording_id, step).await?;
            println!("Run finished: {}", outcome.run_status);
            Ok(())
        }
        Command::Upload {
            file,
            batch,
            device,
        } => {
            let uploader =
                ResumableUploader::new(db.clone(), store.clone(), UploaderConfig::default());
            upload_command(&db, &uploader, &config, &file, batch, device).await
        }
        Command::Search { query } => {
            let hits = db.search_transcripts(&config.org_id, &query)?;
            if hits.is_empty() {
                println!("No matches");
            }
            for hit in hits {
                println!("{} {} [{}] {}", hit.recording_id, hit.segment_id, hit.speaker, hit.snippet);
            }
            Ok(())
        }
    }
}

/// Register a recording, transfer its file and mark it UPLOADED so the
/// worker picks it up.
async fn upload_command(
    db: &DatabaseManager,
    uploader: &ResumableUploader,
    config: &Config,
    file: &Path,
    batch: Option<String>,
    device: Option<String>,
) -> Result<()> {
    let file_name = file
        .file_name()
        .and_then(|n| n.to_str())
        .context("Upload path has no file name")?
        .to_string();

    let batch_id = match batch {
        Some(id) => {
            db.get_batch(&config.org_id, &id)?
                .with_context(|| format!("Import batch {} not found", id))?;
            id
        }
        None => {
            let id = ids::generate_id(ids::BATCH);
            db.create_batch(&ImportBatch {
                id: id.clone(),
                org_id: config.org_id.clone(),
                device_label: device,
                status: BatchStatus::Uploading,
                total_files: 1,
                uploaded_files: 0,
                error_files: 0,
                started_at: chrono::Utc::now().to_rfc3339(),
                ended_at: None,
            })?;
            id
        }
    };

    let recording_id = ids::generate_id(ids::RECORDING);
    let raw_key = keys::raw_key(&config.org_id, &recording_id, &file_name);

    let mut recording = Recording::new(
        recording_id.clone(),
        config.org_id.clone(),
        file_name.clone(),
        raw_key.clone(),
    );
    recording.import_batch_id = Some(batch_id.clone());
    recording.mime_type = mime_for_file(file);
    db.create_recording(&recording)?;

    let size_bytes = tokio::fs::metadata(file).await?.len() as i64;
    let duration_ms = if recording.mime_type == "audio/wav" {
        segmenter::wav_duration_ms(file).ok()
    } else {
        None
    };

    db.set_recording_status(&config.org_id, &recording_id, RecordingStatus::Uploading)?;

    match uploader.upload_file(&batch_id, &recording_id, file, &raw_key).await {
        Ok(sha256) => {
            db.set_recording_file_info(
                &config.org_id,
                &recording_id,
                size_bytes,
                &sha256,
                duration_ms,
                &recording.mime_type,
            )?;
            db.set_recording_status(&config.org_id, &recording_id, RecordingStatus::Uploaded)?;
            db.record_batch_file_outcome(&config.org_id, &batch_id, true)?;
            println!("Uploaded {} as recording {}", file.display(), recording_id);
            Ok(())
        }
        Err(e) => {
            db.record_batch_file_outcome(&config.org_id, &batch_id, false)?;
            Err(e)
        }
    }
}

fn mime_for_file(path: &Path) -> String {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("wav") => "audio/wav",
        Some("mp3") => "audio/mpeg",
        Some("m4a") => "audio/mp4",
        Some("flac") => "audio/flac",
        Some("ogg") => "audio/ogg",
        _ => "application/octet-stream",
    }
    .to_string()
}
