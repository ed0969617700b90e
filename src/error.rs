//! Error types surfaced by the task orchestrator
//!
//! Submission-time failures are returned to the caller. Failures that happen
//! during background execution are never returned; they are recorded on the
//! task record through [`sanitize_error_message`].

use crate::store::StoreError;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;
use uuid::Uuid;

/// Main error type for orchestrator operations
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Task not found: {0}")]
    NotFound(Uuid),

    #[error("Dispatch queue unavailable: {message}")]
    DispatchUnavailable { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl OrchestratorError {
    /// Create validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Create store unavailable error
    pub fn store_unavailable<S: Into<String>>(message: S) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    /// Create dispatch unavailable error
    pub fn dispatch_unavailable<S: Into<String>>(message: S) -> Self {
        Self::DispatchUnavailable {
            message: message.into(),
        }
    }

    /// Create internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }
}

impl From<StoreError> for OrchestratorError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::NotFound(id) => OrchestratorError::NotFound(id),
            StoreError::Unavailable(message) => OrchestratorError::StoreUnavailable { message },
            StoreError::Duplicate(id) => {
                OrchestratorError::internal(format!("task id collision: {id}"))
            }
            StoreError::Corrupt(message) => OrchestratorError::Internal { message },
        }
    }
}

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

static SECRET_ASSIGNMENT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(password|token|key|secret)[=:]\s*\S+").expect("secret pattern is valid")
});

static SECRET_PATH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"/[a-zA-Z0-9._/-]+/(secrets?|\.ssh|\.aws|\.config)/[a-zA-Z0-9._/-]+")
        .expect("secret path pattern is valid")
});

const MAX_ERROR_MESSAGE_LEN: usize = 500;

/// Sanitize error messages before they are persisted on a task record
///
/// Redacts secret-looking assignments and paths, then caps the length.
pub fn sanitize_error_message(message: &str) -> String {
    let mut sanitized = SECRET_ASSIGNMENT
        .replace_all(message, "${1}=***")
        .to_string();

    sanitized = SECRET_PATH
        .replace_all(&sanitized, "/***REDACTED***/")
        .to_string();

    if sanitized.len() > MAX_ERROR_MESSAGE_LEN {
        let truncate_suffix = "...[truncated]";
        let mut cut = MAX_ERROR_MESSAGE_LEN - truncate_suffix.len();
        while !sanitized.is_char_boundary(cut) {
            cut -= 1;
        }
        sanitized = format!("{}{}", &sanitized[..cut], truncate_suffix);
    }

    sanitized
}
