// Filesystem-backed object store
//
// Keys map to paths under a root directory. Multipart parts are staged
// in a sibling directory until completion assembles them. ETags are
// sha256 digests of the part content.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{CompletedPart, ObjectStore};
use crate::ids;

pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&root).context("Failed to create object store root")?;
        Ok(Self { root })
    }

    fn object_path(&self, key: &str) -> Result<PathBuf> {
        // Keys are forward-slash paths; refuse anything that could
        // escape the root.
        if key.is_empty() || key.starts_with('/') || key.split('/').any(|p| p == ".." || p.is_empty())
        {
            anyhow::bail!("Invalid object key: {}", key);
        }
        Ok(self.root.join(key))
    }

    fn staging_dir(&self, key: &str, upload_id: &str) -> Result<PathBuf> {
        let path = self.object_path(key)?;
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| format!(".{}.{}", n, upload_id))
            .ok_or_else(|| anyhow::anyhow!("Invalid object key: {}", key))?;
        Ok(path.with_file_name(file_name))
    }

    fn part_file(dir: &Path, part_number: u32) -> PathBuf {
        dir.join(format!("part-{:05}", part_number))
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write object {}", key))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let path = self.object_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("Failed to read object {}", key)),
        }
    }

    async fn head(&self, key: &str) -> Result<bool> {
        let path = self.object_path(key)?;
        Ok(fs::try_exists(&path).await.unwrap_or(false))
    }

    async fn presign_get(&self, key: &str, ttl_seconds: u64) -> Result<String> {
        let path = self.object_path(key)?;
        let expires = (Utc::now() + ChronoDuration::seconds(ttl_seconds as i64)).timestamp();
        Ok(format!("file://{}?expires={}", path.display(), expires))
    }

    async fn presign_put(&self, key: &str, ttl_seconds: u64) -> Result<String> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }
        let expires = (Utc::now() + ChronoDuration::seconds(ttl_seconds as i64)).timestamp();
        Ok(format!("file://{}?expires={}&write=1", path.display(), expires))
    }

    async fn create_multipart(&self, key: &str) -> Result<String> {
        let upload_id = ids::generate_id("mpu");
        let dir = self.staging_dir(key, &upload_id)?;
        fs::create_dir_all(&dir)
            .await
            .context("Failed to create multipart staging directory")?;
        Ok(upload_id)
    }

    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> Result<Option<String>> {
        if part_number == 0 {
            anyhow::bail!("Part numbers start at 1");
        }
        let dir = self.staging_dir(key, upload_id)?;
        if !fs::try_exists(&dir).await.unwrap_or(false) {
            anyhow::bail!("Unknown multipart upload {} for {}", upload_id, key);
        }
        let path = Self::part_file(&dir, part_number);
        fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write part {} of {}", part_number, key))?;
        Ok(Some(sha256_hex(bytes)))
    }

    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<CompletedPart>> {
        let dir = self.staging_dir(key, upload_id)?;
        let mut parts = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(parts),
            Err(e) => return Err(e).context("Failed to list multipart staging directory"),
        };

        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if let Some(number) = name.strip_prefix("part-").and_then(|n| n.parse::<u32>().ok()) {
                let bytes = fs::read(entry.path())
                    .await
                    .context("Failed to read staged part")?;
                parts.push(CompletedPart {
                    part_number: number,
                    etag: sha256_hex(&bytes),
                });
            }
        }

        parts.sort_by_key(|p| p.part_number);
        Ok(parts)
    }

    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()> {
        if parts.is_empty() {
            anyhow::bail!("Cannot complete multipart upload with zero parts");
        }

        let dir = self.staging_dir(key, upload_id)?;
        let target = self.object_path(key)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }

        let mut ordered = parts.to_vec();
        ordered.sort_by_key(|p| p.part_number);

        let mut out = fs::File::create(&target)
            .await
            .with_context(|| format!("Failed to create object {}", key))?;

        for part in &ordered {
            let path = Self::part_file(&dir, part.part_number);
            let bytes = fs::read(&path)
                .await
                .with_context(|| format!("Missing part {} for {}", part.part_number, key))?;
            if sha256_hex(&bytes) != part.etag {
                anyhow::bail!(
                    "Integrity token mismatch for part {} of {}",
                    part.part_number,
                    key
                );
            }
            out.write_all(&bytes)
                .await
                .context("Failed to append part to object")?;
        }
        out.flush().await.context("Failed to flush object")?;

        fs::remove_dir_all(&dir)
            .await
            .context("Failed to remove multipart staging directory")?;
        Ok(())
    }
}
