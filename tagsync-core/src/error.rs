//! Error types for tagsync operations

use crate::entities::ColumnType;
use thiserror::Error;

/// Errors raised by a remote store before a write outcome could be classified.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Transport failure: {reason}")]
    Transport { reason: String },

    #[error("Malformed response: {reason}")]
    Decode { reason: String },

    #[error("Request failed with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("Not authorized: {message}")]
    Unauthorized { message: String },

    #[error("Not found: {resource}")]
    NotFound { resource: String },
}

impl StoreError {
    /// Message suitable for a user facing notification.
    pub fn user_message(&self) -> String {
        match self {
            StoreError::Status { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// Validation errors for values crossing the form/edit boundary.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Tag definition {id} has an empty name path")]
    EmptyNamePath { id: String },

    #[error("Invalid {column_type} value: {raw:?}")]
    InvalidValue { column_type: ColumnType, raw: String },

    #[error("Value does not match column type {expected}")]
    TypeMismatch { expected: ColumnType },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid config value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Master error type for engine operations.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SyncError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Loading page {page} failed: {source}")]
    ChunkFailed { page: usize, source: StoreError },

    #[error("Cursor did not advance on page {page} (offset {offset})")]
    CursorStalled { page: usize, offset: i64 },

    #[error("The value for {subject} was changed by someone else. The current value is shown, please review it.")]
    Conflict { subject: String },

    #[error("Insufficient permissions for {subject}: {message}")]
    Forbidden { subject: String, message: String },

    #[error("{message}")]
    Failed { message: String },

    #[error("Could not resolve conflict for entity {entity}: {message}")]
    ResolveFailed { entity: String, message: String },

    #[error("{message}")]
    MergeRejected {
        message: String,
        reload_required: bool,
    },

    #[error("Nothing loaded yet: {what}")]
    NotLoaded { what: &'static str },

    #[error("Unknown column {id}")]
    UnknownColumn { id: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl SyncError {
    /// True when the local state has been refreshed from the store and the user
    /// should review before retrying.
    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }

    pub fn reload_required(&self) -> bool {
        matches!(
            self,
            SyncError::MergeRejected {
                reload_required: true,
                ..
            }
        )
    }
}

/// Result type alias for tagsync operations.
pub type SyncResult<T> = Result<T, SyncError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_failure_names_page_and_message() {
        let err = SyncError::ChunkFailed {
            page: 3,
            source: StoreError::Status {
                status: 500,
                message: "database gone".to_string(),
            },
        };
        let msg = err.to_string();
        assert!(msg.contains("page 3"));
        assert!(msg.contains("database gone"));
    }

    #[test]
    fn forbidden_names_subject() {
        let err = SyncError::Forbidden {
            subject: "people -> age".to_string(),
            message: "not owner".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("people -> age"));
        assert!(msg.contains("not owner"));
    }

    #[test]
    fn user_message_prefers_server_text() {
        let err = StoreError::Status {
            status: 400,
            message: "bad value".to_string(),
        };
        assert_eq!(err.user_message(), "bad value");
        let err = StoreError::Transport {
            reason: "connection reset".to_string(),
        };
        assert!(err.user_message().contains("connection reset"));
    }

    #[test]
    fn reload_required_only_for_flagged_rejections() {
        let stale = SyncError::MergeRejected {
            message: "changed".to_string(),
            reload_required: true,
        };
        let other = SyncError::MergeRejected {
            message: "nope".to_string(),
            reload_required: false,
        };
        assert!(stale.reload_required());
        assert!(!other.reload_required());
        assert!(SyncError::Conflict {
            subject: "x".to_string()
        }
        .is_conflict());
    }

    #[test]
    fn sync_error_from_variants() {
        let store = SyncError::from(StoreError::NotFound {
            resource: "tag".to_string(),
        });
        assert!(matches!(store, SyncError::Store(_)));
        let validation = SyncError::from(ValidationError::TypeMismatch {
            expected: ColumnType::Float,
        });
        assert!(matches!(validation, SyncError::Validation(_)));
    }
}
