//! File repository (§3): the server-side record of an upload from intake through
//! dispatch. sled-backed, one tree, matching `wallet::storage::EncryptedStorage`'s
//! single-tree-per-concern layout.

use blob_common::{BlobId, BlobObjectId, FileStatus, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FileRepoError {
    #[error("file {0} not found")]
    NotFound(String),
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("a completed file must carry a blob id")]
    CompletedWithoutBlobId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct File {
    pub file_id: String,
    pub user_id: UserId,
    pub filename: String,
    pub content_type: String,
    pub size_bytes: u64,
    pub epochs: u32,
    pub status: FileStatus,
    pub blob_id: Option<BlobId>,
    pub blob_object_id: Option<BlobObjectId>,
    pub staging_key: String,
    pub encrypted: bool,
    pub folder_id: Option<String>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_accessed_at: DateTime<Utc>,
}

impl File {
    #[allow(clippy::too_many_arguments)]
    pub fn new_pending(
        file_id: String,
        user_id: UserId,
        filename: String,
        content_type: String,
        size_bytes: u64,
        epochs: u32,
        staging_key: String,
        encrypted: bool,
        folder_id: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            file_id,
            user_id,
            filename,
            content_type,
            size_bytes,
            epochs,
            status: FileStatus::Pending,
            blob_id: None,
            blob_object_id: None,
            staging_key,
            encrypted,
            folder_id,
            error_message: None,
            created_at: now,
            updated_at: now,
            last_accessed_at: now,
        }
    }

    /// Bumps `last_accessed_at` to `now` (§3's File.lastAccessedAt), mirroring the
    /// staging object's own `last-accessed-at` tag whenever the bytes are read back.
    pub fn touch_accessed(&mut self, now: DateTime<Utc>) {
        self.last_accessed_at = now;
    }

    /// Enforces the `completed ⇒ blob_id != null` invariant (§3) at the single
    /// point where status transitions to `Completed`.
    pub fn mark_completed(&mut self, blob_id: BlobId, blob_object_id: BlobObjectId, now: DateTime<Utc>) {
        self.status = FileStatus::Completed;
        self.blob_id = Some(blob_id);
        self.blob_object_id = Some(blob_object_id);
        self.error_message = None;
        self.updated_at = now;
    }

    pub fn mark_processing(&mut self, now: DateTime<Utc>) {
        self.status = FileStatus::Processing;
        self.updated_at = now;
    }

    pub fn mark_failed(&mut self, error_message: String, now: DateTime<Utc>) {
        self.status = FileStatus::Failed;
        self.error_message = Some(error_message);
        self.updated_at = now;
    }

    pub fn validate_invariant(&self) -> Result<(), FileRepoError> {
        if self.status == FileStatus::Completed && self.blob_id.is_none() {
            return Err(FileRepoError::CompletedWithoutBlobId);
        }
        Ok(())
    }
}

pub struct FileRepository {
    files: sled::Tree,
}

impl FileRepository {
    pub fn open(db: &sled::Db) -> Result<Self, FileRepoError> {
        Ok(Self { files: db.open_tree("files")? })
    }

    pub fn put(&self, file: &File) -> Result<(), FileRepoError> {
        file.validate_invariant()?;
        let encoded = serde_json::to_vec(file)?;
        self.files.insert(file.file_id.as_bytes(), encoded)?;
        Ok(())
    }

    pub fn get(&self, file_id: &str) -> Result<File, FileRepoError> {
        let bytes = self.files.get(file_id)?.ok_or_else(|| FileRepoError::NotFound(file_id.to_string()))?;
        Ok(serde_json::from_slice(&bytes)?)
    }

    pub fn list_for_user(&self, user_id: &UserId) -> Result<Vec<File>, FileRepoError> {
        let mut out = Vec::new();
        for entry in self.files.iter() {
            let (_, value) = entry?;
            let file: File = serde_json::from_slice(&value)?;
            if &file.user_id == user_id {
                out.push(file);
            }
        }
        out.sort_by_key(|f| f.created_at);
        Ok(out)
    }

    pub fn list_dispatchable(&self) -> Result<Vec<File>, FileRepoError> {
        let mut out = Vec::new();
        for entry in self.files.iter() {
            let (_, value) = entry?;
            let file: File = serde_json::from_slice(&value)?;
            if file.status.is_dispatchable() {
                out.push(file);
            }
        }
        Ok(out)
    }

    /// Looks up the file that completed under `blob_id`, for the download and
    /// verify endpoints (§6), which only carry the content-addressed id on the wire.
    pub fn find_by_blob_id(&self, blob_id: &BlobId) -> Result<Option<File>, FileRepoError> {
        for entry in self.files.iter() {
            let (_, value) = entry?;
            let file: File = serde_json::from_slice(&value)?;
            if file.blob_id.as_ref() == Some(blob_id) {
                return Ok(Some(file));
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo() -> (tempfile::TempDir, FileRepository) {
        let dir = tempfile::tempdir().unwrap();
        let db = sled::open(dir.path()).unwrap();
        (dir, FileRepository::open(&db).unwrap())
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, repo) = repo();
        let now = Utc::now();
        let file = File::new_pending("f1".into(), UserId("alice".into()), "a.txt".into(), "text/plain".into(), 10, 3, "alice/pending/f1/a.txt".into(), false, None, now);
        repo.put(&file).unwrap();
        assert_eq!(repo.get("f1").unwrap().status, FileStatus::Pending);
    }

    #[test]
    fn completed_without_blob_id_is_rejected() {
        let (_dir, repo) = repo();
        let now = Utc::now();
        let mut file = File::new_pending("f1".into(), UserId("alice".into()), "a.txt".into(), "text/plain".into(), 10, 3, "alice/pending/f1/a.txt".into(), false, None, now);
        file.status = FileStatus::Completed;
        assert!(matches!(repo.put(&file), Err(FileRepoError::CompletedWithoutBlobId)));
    }

    #[test]
    fn list_dispatchable_excludes_processing_and_completed() {
        let (_dir, repo) = repo();
        let now = Utc::now();

        let pending = File::new_pending("f1".into(), UserId("alice".into()), "a.txt".into(), "text/plain".into(), 10, 3, "k1".into(), false, None, now);
        let mut processing = File::new_pending("f2".into(), UserId("alice".into()), "b.txt".into(), "text/plain".into(), 10, 3, "k2".into(), false, None, now);
        processing.mark_processing(now);
        let mut failed = File::new_pending("f3".into(), UserId("alice".into()), "c.txt".into(), "text/plain".into(), 10, 3, "k3".into(), false, None, now);
        failed.mark_failed("boom".into(), now);

        repo.put(&pending).unwrap();
        repo.put(&processing).unwrap();
        repo.put(&failed).unwrap();

        let dispatchable = repo.list_dispatchable().unwrap();
        let ids: Vec<_> = dispatchable.iter().map(|f| f.file_id.clone()).collect();
        assert!(ids.contains(&"f1".to_string()));
        assert!(ids.contains(&"f3".to_string()));
        assert!(!ids.contains(&"f2".to_string()));
    }

    #[test]
    fn finds_a_completed_file_by_its_blob_id() {
        let (_dir, repo) = repo();
        let now = Utc::now();
        let mut file = File::new_pending("f1".into(), UserId("alice".into()), "a.txt".into(), "text/plain".into(), 10, 3, "k1".into(), false, None, now);
        file.mark_completed(BlobId("blob_1".into()), BlobObjectId("object_1".into()), now);
        repo.put(&file).unwrap();

        let found = repo.find_by_blob_id(&BlobId("blob_1".into())).unwrap().unwrap();
        assert_eq!(found.file_id, "f1");
        assert!(repo.find_by_blob_id(&BlobId("missing".into())).unwrap().is_none());
    }
}
