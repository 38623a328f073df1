use reqwest::StatusCode;

/// Error types for tracker requests.
#[derive(Debug, thiserror::Error)]
pub enum TrackerError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("tracker returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("tracker resource not found: {0}")]
    NotFound(String),
    #[error("stale version for task {task_id}")]
    VersionConflict { task_id: i64 },
    #[error("authentication failed: {0}")]
    Auth(String),
    #[error("json error: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("missing response header: {0}")]
    MissingHeader(&'static str),
}

