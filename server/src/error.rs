//! HTTP-facing error kinds (§7): every failure the intake and trigger endpoints can
//! surface, each carrying its own status code so the `ResponseError` impl is a pure,
//! exhaustive match rather than ad hoc string sniffing (per SPEC_FULL.md's "Rust
//! shape" note).

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;

use crate::dispatcher::DispatchError;
use crate::files::FileRepoError;
use crate::ledger::LedgerError;
use crate::quoter::QuoterError;
use crate::registry::RegistryError;
use crate::staging::StagingError;
use crate::users::UserDirectoryError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InputInvalid(String),
    #[error("extension not in the allow-list: {0}")]
    DisallowedExtension(String),
    #[error("file exceeds the maximum accepted size of {max} bytes")]
    TooLarge { max: u64 },
    #[error("quote is invalid: {0}")]
    QuoteInvalid(#[from] QuoterError),
    #[error("insufficient balance")]
    InsufficientBalance,
    #[error("object store is unavailable")]
    StagingUnavailable,
    #[error("dispatch did not complete within its deadline")]
    DispatchTimeout,
    #[error("chain rejected the transaction: {0}")]
    ChainRejected(String),
    #[error("file {0} not found")]
    FileNotFound(String),
    #[error("file {0} has already completed")]
    AlreadyCompleted(String),
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<FileRepoError> for ApiError {
    fn from(err: FileRepoError) -> Self {
        match err {
            FileRepoError::NotFound(id) => ApiError::FileNotFound(id),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<StagingError> for ApiError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::Unavailable => ApiError::StagingUnavailable,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance { .. } => ApiError::InsufficientBalance,
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<UserDirectoryError> for ApiError {
    fn from(err: UserDirectoryError) -> Self {
        ApiError::Internal(err.to_string())
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::Timeout(_) => ApiError::DispatchTimeout,
            DispatchError::RelayTipTooHigh { .. } | DispatchError::Signing(_) => ApiError::ChainRejected(err.to_string()),
            DispatchError::Relay(message) => ApiError::Internal(message),
        }
    }
}

impl From<RegistryError> for ApiError {
    fn from(err: RegistryError) -> Self {
        ApiError::ChainRejected(err.to_string())
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::InputInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::DisallowedExtension(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::QuoteInvalid(_) => StatusCode::BAD_REQUEST,
            ApiError::InsufficientBalance => StatusCode::PAYMENT_REQUIRED,
            ApiError::StagingUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::DispatchTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::ChainRejected(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::FileNotFound(_) => StatusCode::NOT_FOUND,
            ApiError::AlreadyCompleted(_) => StatusCode::CONFLICT,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({ "error": self.to_string() }))
    }
}
