//! Typed failures at the history store and answer API boundaries.

use thiserror::Error;

pub type StoreResult<T> = Result<T, StoreError>;
pub type ApiResult<T> = Result<T, ApiError>;

/// Failures raised by a history store backend.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store connection error: {0}")]
    Connection(String),

    #[error("Store query error: {0}")]
    Query(String),

    #[error("Store serialization error: {0}")]
    Serialization(String),
}

impl From<surrealdb::Error> for StoreError {
    fn from(e: surrealdb::Error) -> Self {
        StoreError::Query(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// Failures raised while asking the answer API.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Answer API key is not configured")]
    NotConfigured,

    #[error("Answer API network error: {0}")]
    Network(String),

    #[error("Answer API request timed out")]
    Timeout,

    #[error("Answer API returned status {status}: {detail}")]
    Status { status: u16, detail: String },

    #[error("Answer API returned a malformed response: {0}")]
    MalformedResponse(String),
}

impl ApiError {
    /// Whether another attempt could reasonably succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ApiError::Network(_) | ApiError::Timeout => true,
            ApiError::Status { status, .. } => *status >= 500,
            ApiError::NotConfigured | ApiError::MalformedResponse(_) => false,
        }
    }

    /// Short reason shown to the user next to the failure message.
    pub fn user_reason(&self) -> String {
        match self {
            ApiError::NotConfigured => "Not Configured".to_string(),
            ApiError::Network(_) => "Network Error".to_string(),
            ApiError::Timeout => "Timeout".to_string(),
            ApiError::Status { status, .. } => format!("Error: {status}"),
            ApiError::MalformedResponse(_) => "Invalid Response Format".to_string(),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            ApiError::Timeout
        } else if e.is_decode() {
            ApiError::MalformedResponse(e.to_string())
        } else {
            ApiError::Network(e.to_string())
        }
    }
}

// Tests.
