// Object storage for workshop-scribe
//
// The pipeline only depends on this trait; backends decide where bytes
// actually live. Multipart semantics follow the S3 model: parts are
// uploaded independently, each yields an integrity token (ETag), and a
// completion call assembles them in part-number order.

use anyhow::Result;
use async_trait::async_trait;

pub mod keys;
mod local;

pub use local::LocalObjectStore;

/// A finished multipart part and its integrity token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedPart {
    pub part_number: u32,
    pub etag: String,
}

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Store an object at the given key, replacing any existing one
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()>;

    /// Fetch an object. Returns None when the key is absent.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Whether an object exists at the key
    async fn head(&self, key: &str) -> Result<bool>;

    /// Time-limited signed URL for reading the object
    async fn presign_get(&self, key: &str, ttl_seconds: u64) -> Result<String>;

    /// Time-limited signed URL for writing the object
    async fn presign_put(&self, key: &str, ttl_seconds: u64) -> Result<String>;

    /// Begin a multipart upload, returning its upload id
    async fn create_multipart(&self, key: &str) -> Result<String>;

    /// Transfer one part. Returns the part's integrity token, or None
    /// when the backend failed to produce one.
    async fn upload_part(
        &self,
        key: &str,
        upload_id: &str,
        part_number: u32,
        bytes: &[u8],
    ) -> Result<Option<String>>;

    /// Parts recorded so far for an in-progress multipart upload
    async fn list_parts(&self, key: &str, upload_id: &str) -> Result<Vec<CompletedPart>>;

    /// Assemble the named parts, in part-number order, into the final
    /// object. The upload id is invalid afterwards.
    async fn complete_multipart(
        &self,
        key: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> Result<()>;
}
