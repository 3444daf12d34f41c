use blob_common::{QueueItemStatus, Usd};
use serde::{Deserialize, Serialize};

/// A single entry in a user's persistent upload queue (§3 `QueuedUpload`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedUpload {
    pub id: String,
    pub filename: String,
    pub mime: String,
    pub byte_length: u64,
    pub created_at_ms: i64,
    pub status: QueueItemStatus,
    pub encrypt: bool,
    pub progress: u8,
    pub last_error: Option<String>,
    pub payment_amount: Usd,
    pub epochs: u32,
    pub attempt: u32,
    pub max_attempts: u32,
    pub retry_deadline_ms: Option<i64>,
    pub folder_id: Option<String>,
    /// Server-assigned receipt once intake has staged the bytes, at which point the
    /// client may drop its local copy of `blob:{userId}:{id}`.
    pub staged_key: Option<String>,
    pub file_id: Option<String>,
    pub temp_blob_id: Option<String>,
}

impl QueuedUpload {
    pub fn new(
        id: String,
        filename: String,
        mime: String,
        byte_length: u64,
        now_ms: i64,
        encrypt: bool,
        payment_amount: Usd,
        epochs: u32,
        folder_id: Option<String>,
    ) -> Self {
        Self {
            id,
            filename,
            mime,
            byte_length,
            created_at_ms: now_ms,
            status: QueueItemStatus::Queued,
            encrypt,
            progress: 0,
            last_error: None,
            payment_amount,
            epochs,
            attempt: 0,
            max_attempts: blob_common::config::QUEUE_MAX_ATTEMPTS,
            retry_deadline_ms: None,
            folder_id,
            staged_key: None,
            file_id: None,
            temp_blob_id: None,
        }
    }

    pub fn mark_uploading(&mut self) {
        self.status = QueueItemStatus::Uploading;
        self.progress = 0;
    }

    pub fn mark_done(&mut self, file_id: String, temp_blob_id: String, staged_key: String) {
        self.status = QueueItemStatus::Done;
        self.progress = 100;
        self.last_error = None;
        self.attempt = 0;
        self.retry_deadline_ms = None;
        self.file_id = Some(file_id);
        self.temp_blob_id = Some(temp_blob_id);
        self.staged_key = Some(staged_key);
    }

    /// Applies a failed attempt, following the §4.3 transition table: retryable
    /// errors under the attempt cap go to `retrying` with a scheduled deadline;
    /// everything else is terminal `error`.
    pub fn mark_failed(&mut self, message: String, retryable: bool, now_ms: i64) {
        self.last_error = Some(message);
        self.attempt += 1;

        if retryable && self.attempt < self.max_attempts {
            self.status = QueueItemStatus::Retrying;
            let delay = crate::retry::backoff_for_attempt(self.attempt - 1);
            self.retry_deadline_ms = Some(now_ms + delay.as_millis() as i64);
        } else {
            self.status = QueueItemStatus::Error;
            self.retry_deadline_ms = None;
        }
    }

    /// User-initiated retry from the `error` state resets the attempt counter.
    pub fn reset_for_user_retry(&mut self) {
        self.status = QueueItemStatus::Queued;
        self.attempt = 0;
        self.last_error = None;
        self.retry_deadline_ms = None;
    }

    /// A `retrying` item becomes `queued` again once its backoff deadline has passed.
    pub fn promote_if_ready(&mut self, now_ms: i64) {
        if self.status == QueueItemStatus::Retrying {
            if let Some(deadline) = self.retry_deadline_ms {
                if now_ms >= deadline {
                    self.status = QueueItemStatus::Queued;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item() -> QueuedUpload {
        QueuedUpload::new(
            "id1".into(),
            "report.pdf".into(),
            "application/pdf".into(),
            1024,
            0,
            true,
            Usd::from_f64(0.01),
            3,
            None,
        )
    }

    #[test]
    fn failed_retryable_attempt_goes_to_retrying_with_backoff() {
        let mut it = item();
        it.mark_failed("network timeout".into(), true, 1_000);
        assert_eq!(it.status, QueueItemStatus::Retrying);
        assert_eq!(it.attempt, 1);
        assert_eq!(it.retry_deadline_ms, Some(1_000 + 10_000));
    }

    #[test]
    fn exhausting_max_attempts_lands_in_error() {
        let mut it = item();
        for _ in 0..it.max_attempts {
            it.mark_failed("network timeout".into(), true, 0);
        }
        assert_eq!(it.status, QueueItemStatus::Error);
    }

    #[test]
    fn non_retryable_failure_is_immediately_terminal() {
        let mut it = item();
        it.mark_failed("Insufficient balance".into(), false, 0);
        assert_eq!(it.status, QueueItemStatus::Error);
        assert_eq!(it.attempt, 1);
    }

    #[test]
    fn user_retry_resets_attempts() {
        let mut it = item();
        it.mark_failed("Insufficient balance".into(), false, 0);
        it.reset_for_user_retry();
        assert_eq!(it.status, QueueItemStatus::Queued);
        assert_eq!(it.attempt, 0);
    }

    #[test]
    fn promotes_to_queued_once_deadline_passes() {
        let mut it = item();
        it.mark_failed("timeout".into(), true, 1_000);
        it.promote_if_ready(5_000);
        assert_eq!(it.status, QueueItemStatus::Retrying);
        it.promote_if_ready(11_001);
        assert_eq!(it.status, QueueItemStatus::Queued);
    }
}
