use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;

use super::{StagedMetadata, StagingClient, StagingError};

/// Test/fallback double backed by a `DashMap`, used when no object-store credentials
/// are configured and in unit tests that exercise staging without real S3 calls.
#[derive(Default)]
pub struct InMemoryStagingClient {
    objects: DashMap<String, (Vec<u8>, StagedMetadata)>,
}

impl InMemoryStagingClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StagingClient for InMemoryStagingClient {
    async fn put(&self, key: &str, bytes: Vec<u8>, metadata: StagedMetadata) -> Result<(), StagingError> {
        self.objects.insert(key.to_string(), (bytes, metadata));
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>, StagingError> {
        self.objects
            .get(key)
            .map(|entry| entry.value().0.clone())
            .ok_or_else(|| StagingError::NotFound(key.to_string()))
    }

    async fn head(&self, key: &str) -> Result<bool, StagingError> {
        Ok(self.objects.contains_key(key))
    }

    async fn delete(&self, key: &str) -> Result<(), StagingError> {
        self.objects.remove(key);
        Ok(())
    }

    async fn touch(&self, key: &str) -> Result<(), StagingError> {
        let mut entry = self.objects.get_mut(key).ok_or_else(|| StagingError::NotFound(key.to_string()))?;
        let now = Utc::now();
        entry.value_mut().1.expires_at = now + chrono::Duration::from_std(blob_common::config::STAGING_LIFETIME)
            .expect("STAGING_LIFETIME fits chrono::Duration");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metadata() -> StagedMetadata {
        StagedMetadata::new("text/plain".into(), "f.txt".into(), false, Utc::now())
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let client = InMemoryStagingClient::new();
        client.put("k1", b"hello".to_vec(), metadata()).await.unwrap();
        assert_eq!(client.get("k1").await.unwrap(), b"hello".to_vec());
        assert!(client.head("k1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_removes_object() {
        let client = InMemoryStagingClient::new();
        client.put("k1", b"hello".to_vec(), metadata()).await.unwrap();
        client.delete("k1").await.unwrap();
        assert!(!client.head("k1").await.unwrap());
        assert!(matches!(client.get("k1").await, Err(StagingError::NotFound(_))));
    }

    #[tokio::test]
    async fn rename_moves_bytes_to_new_key() {
        let client = InMemoryStagingClient::new();
        client.put("pending/a", b"payload".to_vec(), metadata()).await.unwrap();
        client.rename("pending/a", "final/a").await.unwrap();
        assert!(!client.head("pending/a").await.unwrap());
        assert_eq!(client.get("final/a").await.unwrap(), b"payload".to_vec());
    }

    #[tokio::test]
    async fn touch_refreshes_expiry() {
        let client = InMemoryStagingClient::new();
        client.put("k1", b"hello".to_vec(), metadata()).await.unwrap();
        client.touch("k1").await.unwrap();
        assert!(client.head("k1").await.unwrap());
    }
}
