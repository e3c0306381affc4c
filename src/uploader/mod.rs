// Resumable uploads for workshop-scribe
//
// Small files go up in one request. Large files are split into fixed
// size parts with bounded concurrency; every completed part number is
// persisted immediately, so a restart transfers only the parts that are
// still missing. The object is only marked uploaded once the completion
// call has assembled all parts in order.

use anyhow::{Context, Result};
use futures_util::future::join_all;
use sha2::{Digest, Sha256};
use std::io::SeekFrom;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

use crate::database::DatabaseManager;
use crate::storage::ObjectStore;

/// Upload behavior thresholds
#[derive(Debug, Clone)]
pub struct UploaderConfig {
    /// Files larger than this use the multipart path
    pub multipart_threshold_bytes: u64,
    pub part_size_bytes: u64,
    /// Fixed worker count for part transfers
    pub max_concurrent_parts: usize,
}

impl Default for UploaderConfig {
    fn default() -> Self {
        Self {
            multipart_threshold_bytes: 100 * 1024 * 1024,
            part_size_bytes: 10 * 1024 * 1024,
            max_concurrent_parts: 4,
        }
    }
}

pub struct ResumableUploader {
    db: Arc<DatabaseManager>,
    store: Arc<dyn ObjectStore>,
    config: UploaderConfig,
}

impl ResumableUploader {
    pub fn new(
        db: Arc<DatabaseManager>,
        store: Arc<dyn ObjectStore>,
        config: UploaderConfig,
    ) -> Self {
        Self { db, store, config }
    }

    /// Transfer a local file to the given storage key, resuming any
    /// earlier partial transfer recorded for (batch, content hash).
    pub async fn upload_file(
        &self,
        batch_id: &str,
        recording_id: &str,
        local_path: &Path,
        key: &str,
    ) -> Result<String> {
        let size = tokio::fs::metadata(local_path)
            .await
            .with_context(|| format!("Failed to stat {}", local_path.display()))?
            .len();
        let sha256 = sha256_file(local_path).await?;

        let state = self.db.ensure_upload_state(batch_id, &sha256, recording_id)?;
        if state.uploaded {
            log::info!("{} already uploaded, skipping", local_path.display());
            return Ok(sha256);
        }

        let result = if size > self.config.multipart_threshold_bytes {
            self.upload_multipart(batch_id, &sha256, local_path, key, size)
                .await
        } else {
            self.upload_single(local_path, key).await
        };

        match result {
            Ok(()) => {
                self.db.mark_uploaded(batch_id, &sha256)?;
                Ok(sha256)
            }
            Err(e) => {
                self.db
                    .mark_upload_error(batch_id, &sha256, &format!("{:#}", e))?;
                Err(e)
            }
        }
    }

    async fn upload_single(&self, local_path: &Path, key: &str) -> Result<()> {
        let bytes = tokio::fs::read(local_path)
            .await
            .with_context(|| format!("Failed to read {}", local_path.display()))?;
        self.store.put(key, &bytes).await
    }

    async fn upload_multipart(
        &self,
        batch_id: &str,
        sha256: &str,
        local_path: &Path,
        key: &str,
        size: u64,
    ) -> Result<()> {
        let part_size = self.config.part_size_bytes.max(1);
        let total_parts = size.div_ceil(part_size) as u32;

        // Reuse the remote upload id from a previous attempt when there
        // is one, otherwise start fresh and persist it for resume.
        let state = self
            .db
            .get_upload_state(batch_id, sha256)?
            .context("Upload state missing")?;
        let upload_id = match state.remote_upload_id {
            Some(id) => id,
            None => {
                let id = self.store.create_multipart(key).await?;
                self.db.set_remote_upload_id(batch_id, sha256, &id)?;
                id
            }
        };

        let completed: std::collections::HashSet<i64> =
            state.completed_parts.iter().copied().collect();
        let pending: Vec<u32> = (1..=total_parts)
            .filter(|n| !completed.contains(&(*n as i64)))
            .collect();

        log::info!(
            "Uploading {} in {} parts ({} already complete)",
            local_path.display(),
            total_parts,
            total_parts as usize - pending.len()
        );

        for group in pending.chunks(self.config.max_concurrent_parts.max(1)) {
            let transfers = group.iter().map(|&part_number| {
                self.upload_one_part(batch_id, sha256, local_path, key, &upload_id, part_number, size)
            });
            for result in join_all(transfers).await {
                result?;
            }
        }

        // ETags for parts finished in earlier attempts come from the
        // store's own part listing; our state only records the numbers.
        let recorded = self.store.list_parts(key, &upload_id).await?;
        if recorded.len() != total_parts as usize {
            anyhow::bail!(
                "Multipart upload of {} incomplete: {} of {} parts recorded",
                key,
                recorded.len(),
                total_parts
            );
        }

        self.store.complete_multipart(key, &upload_id, &recorded).await
    }

    #[allow(clippy::too_many_arguments)]
    async fn upload_one_part(
        &self,
        batch_id: &str,
        sha256: &str,
        local_path: &Path,
        key: &str,
        upload_id: &str,
        part_number: u32,
        size: u64,
    ) -> Result<()> {
        let part_size = self.config.part_size_bytes;
        let offset = (part_number as u64 - 1) * part_size;
        let len = part_size.min(size - offset) as usize;

        let mut file = File::open(local_path)
            .await
            .with_context(|| format!("Failed to open {}", local_path.display()))?;
        file.seek(SeekFrom::Start(offset))
            .await
            .context("Failed to seek to part offset")?;
        let mut buffer = vec![0u8; len];
        file.read_exact(&mut buffer)
            .await
            .with_context(|| format!("Failed to read part {}", part_number))?;

        let etag = self
            .store
            .upload_part(key, upload_id, part_number, &buffer)
            .await?;

        // Without the integrity token the completion call can never be
        // assembled, so this is a hard error, not a soft skip.
        if etag.is_none() {
            anyhow::bail!(
                "Part {} of {} transferred but yielded no integrity token",
                part_number,
                key
            );
        }

        self.db
            .mark_part_completed(batch_id, sha256, part_number as i64)?;
        log::debug!("Part {}/{} of {} complete", part_number, size.div_ceil(part_size), key);

        Ok(())
    }
}

/// Streaming sha256 of a file
pub async fn sha256_file(path: &Path) -> Result<String> {
    let mut file = File::open(path)
        .await
        .with_context(|| format!("Failed to open {}", path.display()))?;
    let mut hasher = Sha256::new();
    let mut buffer = vec![0u8; 64 * 1024];

    loop {
        let read = file.read(&mut buffer).await.context("Failed to read file")?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}
