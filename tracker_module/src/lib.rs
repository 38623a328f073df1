//! Taiga tracker client.
//!
//! Typed request/response wrappers for the task, comment, attachment and
//! status endpoints, plus the bearer token cache every request goes through.

pub mod auth;
pub mod client;
pub mod error;
pub mod models;

use async_trait::async_trait;

pub use auth::{CredentialCache, ACCESS_TOKEN_TTL, REFRESH_TOKEN_TTL};
pub use client::{TaigaClient, TaigaConfig, PAGE_SIZE, PAGINATION_COUNT_HEADER};
pub use error::TrackerError;
pub use models::{HistoryEntry, NewTask, Task, TaskUpdate, TrackerStatus, UploadedAttachment};

/// Operations the sync engine needs from the tracker.
#[async_trait]
pub trait TrackerApi: Send + Sync {
    async fn list_statuses(&self, project_id: i64) -> Result<Vec<TrackerStatus>, TrackerError>;

    async fn get_task(&self, task_id: i64) -> Result<Task, TrackerError>;

    /// All tasks of a project at one status, ordered by kanban priority.
    async fn list_tasks(&self, project_id: i64, status_id: i64) -> Result<Vec<Task>, TrackerError>;

    /// Create a task and return its id.
    async fn create_task(&self, task: &NewTask) -> Result<i64, TrackerError>;

    /// Apply one update at the given version. A stale version fails with
    /// `TrackerError::VersionConflict`.
    async fn update_task(
        &self,
        task_id: i64,
        version: i64,
        update: &TaskUpdate,
    ) -> Result<(), TrackerError>;

    /// Replace the kanban order of a status column with `task_ids`.
    async fn reorder_tasks(
        &self,
        project_id: i64,
        status_id: i64,
        task_ids: &[i64],
    ) -> Result<(), TrackerError>;

    /// History entries of a task, newest first.
    async fn list_history(&self, task_id: i64) -> Result<Vec<HistoryEntry>, TrackerError>;

    async fn edit_comment(
        &self,
        task_id: i64,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TrackerError>;

    async fn upload_attachment(
        &self,
        project_id: i64,
        task_id: i64,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAttachment, TrackerError>;

    async fn delete_attachment(&self, attachment_id: i64) -> Result<(), TrackerError>;
}
