//! The persistent client queue itself (§4.3): orchestrates storage, the retry
//! predicate, backoff and the advisory event signal around a single busy flag so
//! `processQueue` never runs two sweeps concurrently.

use std::sync::Arc;
use std::time::Duration;

use blob_common::{config, QueueItemStatus, Usd};
use chrono::Utc;
use log::{debug, warn};
use tokio::sync::Mutex;

use crate::error::QueueError;
use crate::events::QueueEvents;
use crate::http_client::{UploadHttpClient, UploadOutcome, UploadRequest};
use crate::item::QueuedUpload;
use crate::retry::is_retryable;
use crate::storage::QueueStorage;

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

pub struct UploadQueue {
    storage: QueueStorage,
    http: Arc<dyn UploadHttpClient>,
    events: QueueEvents,
    /// Reentrancy guard for `process_queue` (§4.3 "the busy flag prevents reentrancy").
    busy: Mutex<()>,
}

impl UploadQueue {
    pub fn new(storage: QueueStorage, http: Arc<dyn UploadHttpClient>) -> Self {
        let (events, _rx) = QueueEvents::new();
        Self { storage, http, events, busy: Mutex::new(()) }
    }

    pub fn subscribe(&self) -> tokio::sync::watch::Receiver<crate::events::QueueUpdated> {
        self.events.subscribe()
    }

    /// Runs the startup reconciliation pass described at the end of §4.3: fills in
    /// missing retry fields (a no-op here since `QueuedUpload` always carries them),
    /// promotes orphaned error-bearing items to `error`, and times out stuck uploads.
    pub fn reconcile_on_startup(&self, user_id: &str) -> Result<(), QueueError> {
        let now = now_ms();
        for mut item in self.storage.list_items(user_id)? {
            let mut changed = false;

            if item.last_error.is_some()
                && !matches!(item.status, QueueItemStatus::Error | QueueItemStatus::Done)
            {
                item.status = QueueItemStatus::Error;
                changed = true;
            }

            if item.status == QueueItemStatus::Uploading {
                let age = now - item.created_at_ms;
                if age > config::QUEUE_STUCK_TIMEOUT.as_millis() as i64 {
                    item.status = QueueItemStatus::Error;
                    item.last_error = Some("Upload timed out".into());
                    changed = true;
                }
            }

            if changed {
                self.storage.save_item(user_id, &item)?;
            }
        }
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    pub fn enqueue(
        &self,
        user_id: &str,
        filename: String,
        mime: String,
        bytes: Vec<u8>,
        encrypt: bool,
        payment_amount: Usd,
        epochs: u32,
        folder_id: Option<String>,
    ) -> Result<String, QueueError> {
        let id = format!("upload_{}", hex::encode(rand::random::<[u8; 12]>()));
        let byte_length = bytes.len() as u64;

        let staged_bytes = if encrypt {
            let key = [0x42u8; 32]; // placeholder per-wallet key; real derivation is out of scope
            blob_common::envelope::encode(&key, &bytes)
                .unwrap_or(bytes)
        } else {
            bytes
        };

        let item = QueuedUpload::new(
            id.clone(),
            filename,
            mime,
            byte_length,
            now_ms(),
            encrypt,
            payment_amount,
            epochs,
            folder_id,
        );

        self.storage.save_item(user_id, &item)?;
        self.storage.save_blob(user_id, &id, &staged_bytes)?;
        self.events.notify();
        Ok(id)
    }

    pub fn remove(&self, user_id: &str, id: &str) -> Result<(), QueueError> {
        self.storage.remove_item(user_id, id)?;
        self.events.notify();
        Ok(())
    }

    pub fn update_queued_epochs(&self, user_id: &str, epochs: u32) -> Result<(), QueueError> {
        for mut item in self.storage.list_items(user_id)? {
            if item.status == QueueItemStatus::Queued {
                item.epochs = epochs;
                self.storage.save_item(user_id, &item)?;
            }
        }
        self.events.notify();
        Ok(())
    }

    /// Resets items stuck in `uploading` beyond the timeout back to `error`, and
    /// promotes ready `retrying` items back to `queued`.
    pub fn clear_stuck_files(&self, user_id: &str) -> Result<(), QueueError> {
        let now = now_ms();
        for mut item in self.storage.list_items(user_id)? {
            let mut changed = false;
            if item.status == QueueItemStatus::Uploading {
                let age = now - item.created_at_ms;
                if age > config::QUEUE_STUCK_TIMEOUT.as_millis() as i64 {
                    item.status = QueueItemStatus::Error;
                    item.last_error = Some("Upload timed out".into());
                    changed = true;
                }
            }
            item.promote_if_ready(now);
            if changed {
                self.storage.save_item(user_id, &item)?;
            }
        }
        Ok(())
    }

    pub fn retry_error_files(
        &self,
        user_id: &str,
        max_attempts: u32,
        retryable_only: bool,
    ) -> Result<Vec<String>, QueueError> {
        let mut retried = Vec::new();
        for mut item in self.storage.list_items(user_id)? {
            if item.status != QueueItemStatus::Error {
                continue;
            }
            if item.attempt >= max_attempts {
                continue;
            }
            if retryable_only {
                let message = item.last_error.clone().unwrap_or_default();
                if !is_retryable(&message, 0) {
                    continue;
                }
            }
            item.reset_for_user_retry();
            self.storage.save_item(user_id, &item)?;
            retried.push(item.id);
        }
        if !retried.is_empty() {
            self.events.notify();
        }
        Ok(retried)
    }

    /// Processes a single item through one upload attempt (§4.3's `processOne`).
    pub async fn process_one(&self, user_id: &str, id: &str) -> Result<(), QueueError> {
        let mut item = self
            .storage
            .load_item(user_id, id)?
            .ok_or_else(|| QueueError::NotFound(id.to_string()))?;

        if !matches!(item.status, QueueItemStatus::Queued | QueueItemStatus::Retrying) {
            return Err(QueueError::InvalidState(id.to_string()));
        }

        item.mark_uploading();
        self.storage.save_item(user_id, &item)?;
        self.events.notify();

        let bytes = self.storage.load_blob(user_id, id)?.unwrap_or_default();
        let request = UploadRequest {
            user_id: user_id.to_string(),
            filename: item.filename.clone(),
            mime: item.mime.clone(),
            bytes,
            epochs: item.epochs,
            folder_id: item.folder_id.clone(),
            payment_amount: Some(item.payment_amount),
            quote_id: None,
            client_side_encrypted: item.encrypt,
        };

        match self.http.upload(request).await {
            UploadOutcome::Receipt(receipt) => {
                item.mark_done(receipt.file_id, receipt.temp_blob_id, receipt.staged_key);
                self.storage.save_item(user_id, &item)?;
                self.storage.drop_blob(user_id, id)?;
                self.events.notify();
                debug!("upload {id} completed for user {user_id}");
                Ok(())
            }
            UploadOutcome::Failed { status, message } => {
                let retryable = is_retryable(&message, status);
                item.mark_failed(message.clone(), retryable, now_ms());
                self.storage.save_item(user_id, &item)?;
                self.events.notify();
                warn!("upload {id} failed for user {user_id}: {message} (status {status})");
                Err(QueueError::Upload { message, status })
            }
        }
    }

    /// `processQueue` (§4.3): smallest-first, sequential, fixed 5s inter-item delay,
    /// guarded by `busy` so a reentrant call is a no-op.
    pub async fn process_queue(&self, user_id: &str) -> Result<(), QueueError> {
        let Ok(_guard) = self.busy.try_lock() else {
            debug!("process_queue already running for {user_id}, skipping");
            return Ok(());
        };

        self.clear_stuck_files(user_id)?;

        let mut items: Vec<QueuedUpload> = self
            .storage
            .list_items(user_id)?
            .into_iter()
            .filter(|item| item.status == QueueItemStatus::Queued)
            .collect();
        items.sort_by_key(|item| item.byte_length);

        for (index, item) in items.iter().enumerate() {
            // A failing item leaves its own status at error/retrying; the loop
            // continues regardless so later (larger) items still get a turn.
            let _ = self.process_one(user_id, &item.id).await;

            if index + 1 < items.len() {
                tokio::time::sleep(config::QUEUE_INTER_ITEM_DELAY).await;
            }
        }

        Ok(())
    }
}
