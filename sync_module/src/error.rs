use tracker_module::TrackerError;

use crate::chat::ChatError;
use crate::config::ConfigError;
use crate::store::StoreError;

/// Failure of a single sync operation.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("tracker transport error: {0}")]
    Transport(#[source] TrackerError),
    #[error("chat transport error: {0}")]
    Chat(#[from] ChatError),
    #[error("stale version for task {task_id}")]
    VersionConflict { task_id: i64 },
    #[error("not found: {0}")]
    NotFound(String),
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}

impl From<TrackerError> for SyncError {
    fn from(err: TrackerError) -> Self {
        match err {
            TrackerError::VersionConflict { task_id } => SyncError::VersionConflict { task_id },
            TrackerError::NotFound(resource) => SyncError::NotFound(resource),
            TrackerError::Auth(message) => SyncError::Auth(message),
            other => SyncError::Transport(other),
        }
    }
}

impl From<ConfigError> for SyncError {
    fn from(err: ConfigError) -> Self {
        SyncError::Configuration(err.to_string())
    }
}
