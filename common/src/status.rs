use serde::{Deserialize, Serialize};
use strum::Display;

/// Status of a client-side `QueuedUpload` (see the persistent client queue's FSM).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum QueueItemStatus {
    Queued,
    Uploading,
    Retrying,
    Done,
    Error,
}

/// Status of a server-side `File` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl FileStatus {
    /// `dispatch` only accepts files in one of these states (pending, or a failed
    /// file the caller explicitly wants retried).
    pub fn is_dispatchable(self) -> bool {
        matches!(self, FileStatus::Pending | FileStatus::Failed)
    }
}

/// Ledger transaction direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Credit,
    Debit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_pending_and_failed_are_dispatchable() {
        assert!(FileStatus::Pending.is_dispatchable());
        assert!(FileStatus::Failed.is_dispatchable());
        assert!(!FileStatus::Processing.is_dispatchable());
        assert!(!FileStatus::Completed.is_dispatchable());
    }
}
