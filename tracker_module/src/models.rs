//! Request and response payloads for the Taiga REST API.

use serde::{Deserialize, Serialize};

/// A workflow status as listed by `/userstory-statuses`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TrackerStatus {
    pub id: i64,
    pub slug: String,
    #[serde(default)]
    pub name: String,
}

/// The subset of a user story ("task") this service reads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Task {
    pub id: i64,
    #[serde(default)]
    pub subject: String,
    pub version: i64,
    pub status: i64,
    #[serde(default)]
    pub kanban_order: i64,
}

/// Body for creating a task.
#[derive(Debug, Clone, Serialize)]
pub struct NewTask {
    pub subject: String,
    pub description: String,
    pub project: i64,
    pub status: i64,
    pub kanban_order: i64,
}

/// A single mutation applied to a task.
///
/// Taiga patches take one field at a time together with the version the
/// caller believes is current. Comments are posted as a task patch too.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskUpdate {
    Subject(String),
    Description(String),
    Comment(String),
}

impl TaskUpdate {
    pub fn label(&self) -> &'static str {
        match self {
            TaskUpdate::Subject(_) => "subject",
            TaskUpdate::Description(_) => "description",
            TaskUpdate::Comment(_) => "comment",
        }
    }
}

#[derive(Debug, Serialize)]
pub(crate) struct TaskPatch<'a> {
    #[serde(flatten)]
    pub update: &'a TaskUpdate,
    pub version: i64,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CreatedTask {
    pub id: i64,
}

#[derive(Debug, Serialize)]
pub(crate) struct KanbanOrderRequest<'a> {
    pub project_id: i64,
    pub status_id: i64,
    pub bulk_userstories: &'a [i64],
}

/// One entry of a task's history feed. Entries without a comment are field
/// changes.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    #[serde(default)]
    pub comment: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct EditCommentRequest<'a> {
    pub comment: &'a str,
}

/// Result of mirroring a file onto a task.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedAttachment {
    pub id: i64,
    pub preview_url: String,
}

#[derive(Debug, Serialize)]
pub(crate) struct LoginRequest<'a> {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(crate) struct RefreshRequest<'a> {
    pub refresh: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
    pub auth_token: String,
    #[serde(default)]
    pub refresh: Option<String>,
}
