use thiserror::Error;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("no queued item with id {0}")]
    NotFound(String),
    #[error("item {0} is not in a state that can be processed")]
    InvalidState(String),
    #[error(transparent)]
    Storage(#[from] sled::Error),
    #[error(transparent)]
    Transaction(#[from] sled::transaction::TransactionError<std::convert::Infallible>),
    #[error("failed to (de)serialize queue record: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("upload request failed: {message} (status {status})")]
    Upload { message: String, status: u16 },
}
