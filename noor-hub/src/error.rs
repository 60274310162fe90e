//! Error types for noor-hub
//!
//! `HubError` is the narrow, caller-visible taxonomy every hub operation
//! returns. Store failures are translated at the engine boundary; raw
//! database errors never reach a client.

use noor_common::events::ErrorCode;
use thiserror::Error;

use crate::store::StoreError;

/// Error returned by hub operations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum HubError {
    /// Bad input shape, length or range (never persisted, never broadcast)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced session, question, annotation or connection is missing
    #[error("Not found: {0}")]
    NotFound(String),

    /// Actor lacks rights for the operation
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Concurrent mutation kept conflicting after bounded retries
    #[error("Conflict, retry later: {0}")]
    ConflictRetryable(String),

    /// Non-retryable persistence failure
    #[error("Store error: {0}")]
    Store(String),
}

impl HubError {
    /// Stable code reported to the initiating connection
    pub fn code(&self) -> ErrorCode {
        match self {
            HubError::Validation(_) => ErrorCode::ValidationError,
            HubError::NotFound(_) => ErrorCode::NotFound,
            HubError::Unauthorized(_) => ErrorCode::Unauthorized,
            HubError::ConflictRetryable(_) => ErrorCode::ConflictRetryable,
            HubError::Store(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to show the initiating client
    pub fn client_message(&self) -> String {
        match self {
            HubError::Store(_) => "Internal error, please try again".to_string(),
            HubError::Validation(m)
            | HubError::NotFound(m)
            | HubError::Unauthorized(m)
            | HubError::ConflictRetryable(m) => m.clone(),
        }
    }
}

impl From<StoreError> for HubError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(m) => HubError::ConflictRetryable(m),
            StoreError::Duplicate(m) => HubError::Validation(m),
            StoreError::Backend(m) => HubError::Store(m),
        }
    }
}

/// Convenience Result type using HubError
pub type Result<T> = std::result::Result<T, HubError>;
