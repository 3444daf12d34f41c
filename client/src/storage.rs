//! Durable storage for the persistent client queue: a `sled::Db` with three logical
//! spaces (§4.3), the same embedded-database shape `wallet::storage::EncryptedStorage`
//! already uses for this workspace's per-user local state.

use std::collections::BTreeSet;

use crate::error::QueueError;
use crate::item::QueuedUpload;

const LIST_TREE: &str = "upload_list";
const META_TREE: &str = "upload_meta";
const BLOB_TREE: &str = "upload_blob";

pub struct QueueStorage {
    db: sled::Db,
    list: sled::Tree,
    meta: sled::Tree,
    blob: sled::Tree,
}

fn meta_key(user_id: &str, id: &str) -> Vec<u8> {
    format!("{user_id}:{id}").into_bytes()
}

impl QueueStorage {
    pub fn open(path: &std::path::Path) -> Result<Self, QueueError> {
        let db = sled::open(path)?;
        Self::from_db(db)
    }

    pub fn open_temporary() -> Result<Self, QueueError> {
        let db = sled::Config::new().temporary(true).open()?;
        Self::from_db(db)
    }

    fn from_db(db: sled::Db) -> Result<Self, QueueError> {
        let list = db.open_tree(LIST_TREE)?;
        let meta = db.open_tree(META_TREE)?;
        let blob = db.open_tree(BLOB_TREE)?;
        Ok(Self { db, list, meta, blob })
    }

    /// Full-record replace: every write is idempotent, matching §4.3's "a save is a
    /// full-record replace" requirement.
    pub fn save_item(&self, user_id: &str, item: &QueuedUpload) -> Result<(), QueueError> {
        let key = meta_key(user_id, &item.id);
        let value = serde_json::to_vec(item)?;
        self.meta.insert(&key, value)?;

        let mut ids = self.list_ids(user_id)?;
        if ids.insert(item.id.clone()) {
            self.save_list(user_id, &ids)?;
        }
        Ok(())
    }

    pub fn save_blob(&self, user_id: &str, id: &str, bytes: &[u8]) -> Result<(), QueueError> {
        self.blob.insert(meta_key(user_id, id), bytes)?;
        Ok(())
    }

    pub fn load_blob(&self, user_id: &str, id: &str) -> Result<Option<Vec<u8>>, QueueError> {
        Ok(self.blob.get(meta_key(user_id, id))?.map(|ivec| ivec.to_vec()))
    }

    pub fn drop_blob(&self, user_id: &str, id: &str) -> Result<(), QueueError> {
        self.blob.remove(meta_key(user_id, id))?;
        Ok(())
    }

    pub fn load_item(&self, user_id: &str, id: &str) -> Result<Option<QueuedUpload>, QueueError> {
        match self.meta.get(meta_key(user_id, id))? {
            Some(raw) => Ok(Some(serde_json::from_slice(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn remove_item(&self, user_id: &str, id: &str) -> Result<(), QueueError> {
        self.meta.remove(meta_key(user_id, id))?;
        self.blob.remove(meta_key(user_id, id))?;

        let mut ids = self.list_ids(user_id)?;
        ids.remove(id);
        self.save_list(user_id, &ids)?;
        Ok(())
    }

    pub fn list_items(&self, user_id: &str) -> Result<Vec<QueuedUpload>, QueueError> {
        let ids = self.list_ids(user_id)?;
        let mut items = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(item) = self.load_item(user_id, &id)? {
                items.push(item);
            }
        }
        Ok(items)
    }

    fn list_ids(&self, user_id: &str) -> Result<BTreeSet<String>, QueueError> {
        match self.list.get(user_id)? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(BTreeSet::new()),
        }
    }

    fn save_list(&self, user_id: &str, ids: &BTreeSet<String>) -> Result<(), QueueError> {
        self.list.insert(user_id, serde_json::to_vec(ids)?)?;
        Ok(())
    }

    pub async fn flush(&self) -> Result<(), QueueError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use blob_common::Usd;

    fn sample(id: &str) -> QueuedUpload {
        QueuedUpload::new(id.into(), "a.txt".into(), "text/plain".into(), 10, 0, false, Usd::MIN_CHARGE, 3, None)
    }

    #[test]
    fn save_then_load_round_trips() {
        let storage = QueueStorage::open_temporary().unwrap();
        storage.save_item("alice", &sample("u1")).unwrap();
        let loaded = storage.load_item("alice", "u1").unwrap().unwrap();
        assert_eq!(loaded.id, "u1");
        assert_eq!(storage.list_items("alice").unwrap().len(), 1);
    }

    #[test]
    fn remove_drops_from_list_and_blob() {
        let storage = QueueStorage::open_temporary().unwrap();
        storage.save_item("alice", &sample("u1")).unwrap();
        storage.save_blob("alice", "u1", b"hello").unwrap();
        storage.remove_item("alice", "u1").unwrap();

        assert!(storage.load_item("alice", "u1").unwrap().is_none());
        assert!(storage.load_blob("alice", "u1").unwrap().is_none());
        assert!(storage.list_items("alice").unwrap().is_empty());
    }

    #[test]
    fn users_are_isolated() {
        let storage = QueueStorage::open_temporary().unwrap();
        storage.save_item("alice", &sample("u1")).unwrap();
        storage.save_item("bob", &sample("u1")).unwrap();
        assert_eq!(storage.list_items("alice").unwrap().len(), 1);
        assert_eq!(storage.list_items("bob").unwrap().len(), 1);
    }
}
