//! Object-Store Staging Client (§4.2): a narrow put/get/head/delete/touch capability
//! over an external object store, following the `object_store` crate usage already
//! seen in this corpus (Sui's analytics indexer uploader built its S3 writes on the
//! same crate).

mod memory;
mod s3;

pub use memory::InMemoryStagingClient;
pub use s3::ObjectStoreStagingClient;

use std::sync::Arc;

use async_trait::async_trait;
use blob_common::config::STAGING_LIFETIME;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StagingError {
    #[error("object store credentials are unavailable")]
    Unavailable,
    #[error("no object at key {0}")]
    NotFound(String),
    #[error("object store request failed: {0}")]
    Backend(String),
}

#[derive(Debug, Clone)]
pub struct StagedMetadata {
    pub content_type: String,
    pub filename: String,
    pub uploaded_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub lifecycle: &'static str,
    pub pre_encrypted: bool,
}

impl StagedMetadata {
    pub fn new(content_type: String, filename: String, pre_encrypted: bool, now: DateTime<Utc>) -> Self {
        Self {
            content_type: blob_common::ids::sanitize_metadata_value(&content_type),
            filename: blob_common::ids::sanitize_metadata_value(&filename),
            uploaded_at: now,
            expires_at: now + chrono::Duration::from_std(STAGING_LIFETIME).expect("STAGING_LIFETIME fits chrono::Duration"),
            lifecycle: "temporary",
            pre_encrypted,
        }
    }
}

#[async_trait]
pub trait StagingClient: Send + Sync {
    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: StagedMetadata) -> Result<(), StagingError>;
    async fn get(&self, key: &str) -> Result<Vec<u8>, StagingError>;
    async fn head(&self, key: &str) -> Result<bool, StagingError>;
    async fn delete(&self, key: &str) -> Result<(), StagingError>;
    /// Refreshes `last-accessed-at`/`expires-at`. A failed refresh is logged and
    /// swallowed by callers (§4.2) — it returns a `Result` only so callers *can*
    /// observe and log it, not so they must propagate it.
    async fn touch(&self, key: &str) -> Result<(), StagingError>;

    /// Renames by copy-then-delete, since the capability has no atomic rename
    /// primitive (§4.5 step 5). Preserves metadata and refreshes its lifecycle.
    async fn rename(&self, from_key: &str, to_key: &str) -> Result<(), StagingError> {
        let bytes = self.get(from_key).await?;
        let metadata = StagedMetadata::new(String::new(), to_key.to_string(), false, Utc::now());
        self.put(to_key, bytes, metadata).await?;
        self.delete(from_key).await?;
        Ok(())
    }
}

/// Fetches `key` and fires off the §4.2 lifecycle refresh (`touch`) in the
/// background: "a failed refresh is logged and swallowed" rather than propagated
/// to the caller, and the refresh itself must not delay the read.
pub async fn get_and_refresh(client: &Arc<dyn StagingClient>, key: &str) -> Result<Vec<u8>, StagingError> {
    let bytes = client.get(key).await?;

    let client = client.clone();
    let key = key.to_string();
    tokio::spawn(async move {
        if let Err(err) = client.touch(&key).await {
            log::warn!("failed to refresh staging lifecycle for {key}: {err}");
        }
    });

    Ok(bytes)
}

/// Builds the staging key for a pending (not-yet-dispatched) upload.
pub fn pending_key(user_id: &str, temp_blob_id: &str, filename: &str) -> String {
    format!(
        "{}/pending/{}/{}",
        blob_common::ids::sanitize_key_component(user_id),
        blob_common::ids::sanitize_key_component(temp_blob_id),
        blob_common::ids::sanitize_key_component(filename)
    )
}

/// Builds the staging key for a completed upload, once the real blob id is known.
pub fn completed_key(user_id: &str, blob_id: &str, filename: &str) -> String {
    format!(
        "{}/{}/{}",
        blob_common::ids::sanitize_key_component(user_id),
        blob_common::ids::sanitize_key_component(blob_id),
        blob_common::ids::sanitize_key_component(filename)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pending_and_completed_keys_are_sanitized() {
        assert_eq!(pending_key("alice", "temp_1", "My Report.pdf"), "alice/pending/temp_1/My_Report.pdf");
        assert_eq!(completed_key("alice", "blob123", "a b.txt"), "alice/blob123/a_b.txt");
    }

    #[tokio::test]
    async fn get_and_refresh_returns_bytes_without_waiting_on_the_touch() {
        let client: Arc<dyn StagingClient> = Arc::new(InMemoryStagingClient::new());
        client
            .put("k1", b"hello".to_vec(), StagedMetadata::new("text/plain".into(), "f.txt".into(), false, Utc::now()))
            .await
            .unwrap();

        let bytes = get_and_refresh(&client, "k1").await.unwrap();
        assert_eq!(bytes, b"hello".to_vec());
    }
}
