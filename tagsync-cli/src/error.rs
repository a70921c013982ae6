//! Error types for the command line driver.

use tagsync_client::ConfigError;
use tagsync_core::{StoreError, SyncError};

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("Could not load tag definitions: {0}")]
    Hierarchy(String),
    #[error("Unknown tag definition {0}")]
    UnknownTagDefinition(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
}
