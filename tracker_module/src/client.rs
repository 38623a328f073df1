//! Typed wrappers around the Taiga REST endpoints used by the sync service.

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::auth::CredentialCache;
use crate::error::TrackerError;
use crate::models::{
    CreatedTask, EditCommentRequest, HistoryEntry, KanbanOrderRequest, NewTask, Task, TaskPatch,
    TaskUpdate, TrackerStatus, UploadedAttachment,
};
use crate::TrackerApi;

/// Page size requested when listing tasks.
pub const PAGE_SIZE: i64 = 100;
/// Response header carrying the total number of items across all pages.
pub const PAGINATION_COUNT_HEADER: &str = "x-pagination-count";

/// Connection settings for a Taiga instance.
#[derive(Clone)]
pub struct TaigaConfig {
    /// Base URL of the instance, without the `/api/v1` suffix.
    pub base_url: String,
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for TaigaConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaigaConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}

impl TaigaConfig {
    pub fn api_base(&self) -> String {
        format!("{}/api/v1", self.base_url.trim_end_matches('/'))
    }
}

/// HTTP client for the Taiga API.
#[derive(Debug, Clone)]
pub struct TaigaClient {
    http: reqwest::Client,
    api_base: String,
    credentials: Arc<CredentialCache>,
}

impl TaigaClient {
    pub fn new(config: TaigaConfig) -> Self {
        let http = reqwest::Client::new();
        let api_base = config.api_base();
        let credentials = Arc::new(CredentialCache::new(
            http.clone(),
            api_base.clone(),
            config.username,
            config.password,
        ));
        Self {
            http,
            api_base,
            credentials,
        }
    }

    async fn request(&self, method: Method, path: &str) -> Result<RequestBuilder, TrackerError> {
        let token = self.credentials.token().await?;
        Ok(self
            .http
            .request(method, format!("{}/{}", self.api_base, path))
            .bearer_auth(token))
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, TrackerError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::NOT_FOUND => Err(TrackerError::NotFound(resource.to_string())),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                Err(TrackerError::Auth(format!("HTTP {}: {}", status, body)))
            }
            _ => Err(TrackerError::Status { status, body }),
        }
    }
}

async fn decode<T: DeserializeOwned>(response: Response) -> Result<T, TrackerError> {
    let text = response.text().await?;
    Ok(serde_json::from_str(&text)?)
}

fn is_version_rejection(status: StatusCode, body: &str) -> bool {
    match status {
        StatusCode::CONFLICT | StatusCode::PRECONDITION_FAILED => true,
        StatusCode::BAD_REQUEST => body.to_ascii_lowercase().contains("version"),
        _ => false,
    }
}

#[async_trait]
impl TrackerApi for TaigaClient {
    async fn list_statuses(&self, project_id: i64) -> Result<Vec<TrackerStatus>, TrackerError> {
        let request = self
            .request(Method::GET, "userstory-statuses")
            .await?
            .query(&[("project", project_id)]);
        decode(self.send(request, "userstory-statuses").await?).await
    }

    async fn get_task(&self, task_id: i64) -> Result<Task, TrackerError> {
        let path = format!("userstories/{}", task_id);
        let request = self.request(Method::GET, &path).await?;
        decode(self.send(request, &path).await?).await
    }

    async fn list_tasks(&self, project_id: i64, status_id: i64) -> Result<Vec<Task>, TrackerError> {
        let mut tasks: Vec<Task> = Vec::new();
        let mut page = 1;
        loop {
            let request = self.request(Method::GET, "userstories").await?.query(&[
                ("project", project_id),
                ("status", status_id),
                ("page_size", PAGE_SIZE),
                ("page", page),
            ]);
            let response = self.send(request, "userstories").await?;
            let total = response
                .headers()
                .get(PAGINATION_COUNT_HEADER)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.trim().parse::<usize>().ok())
                .ok_or(TrackerError::MissingHeader(PAGINATION_COUNT_HEADER))?;
            let batch: Vec<Task> = decode(response).await?;
            let exhausted = batch.is_empty();
            tasks.extend(batch);
            if exhausted || tasks.len() >= total {
                break;
            }
            page += 1;
        }
        tasks.sort_by_key(|task| task.kanban_order);
        debug!(
            "listed {} tasks for project {} status {} over {} page(s)",
            tasks.len(),
            project_id,
            status_id,
            page
        );
        Ok(tasks)
    }

    async fn create_task(&self, task: &NewTask) -> Result<i64, TrackerError> {
        let request = self.request(Method::POST, "userstories").await?.json(task);
        let created: CreatedTask = decode(self.send(request, "userstories").await?).await?;
        Ok(created.id)
    }

    async fn update_task(
        &self,
        task_id: i64,
        version: i64,
        update: &TaskUpdate,
    ) -> Result<(), TrackerError> {
        let path = format!("userstories/{}", task_id);
        let request = self
            .request(Method::PATCH, &path)
            .await?
            .json(&TaskPatch { update, version });
        match self.send(request, &path).await {
            Ok(_) => Ok(()),
            Err(TrackerError::Status { status, body }) if is_version_rejection(status, &body) => {
                warn!(
                    "Taiga rejected {} update for task {} at version {}",
                    update.label(),
                    task_id,
                    version
                );
                Err(TrackerError::VersionConflict { task_id })
            }
            Err(err) => Err(err),
        }
    }

    async fn reorder_tasks(
        &self,
        project_id: i64,
        status_id: i64,
        task_ids: &[i64],
    ) -> Result<(), TrackerError> {
        let body = KanbanOrderRequest {
            project_id,
            status_id,
            bulk_userstories: task_ids,
        };
        let request = self
            .request(Method::POST, "userstories/bulk_update_kanban_order")
            .await?
            .json(&body);
        self.send(request, "userstories/bulk_update_kanban_order")
            .await?;
        Ok(())
    }

    async fn list_history(&self, task_id: i64) -> Result<Vec<HistoryEntry>, TrackerError> {
        let path = format!("history/userstory/{}", task_id);
        let request = self.request(Method::GET, &path).await?;
        let mut entries: Vec<HistoryEntry> = decode(self.send(request, &path).await?).await?;
        entries.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(entries)
    }

    async fn edit_comment(
        &self,
        task_id: i64,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TrackerError> {
        let path = format!("history/userstory/{}/edit_comment", task_id);
        let request = self
            .request(Method::POST, &path)
            .await?
            .query(&[("id", comment_id)])
            .json(&EditCommentRequest { comment: text });
        self.send(request, &path).await?;
        Ok(())
    }

    async fn upload_attachment(
        &self,
        project_id: i64,
        task_id: i64,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAttachment, TrackerError> {
        let part = reqwest::multipart::Part::bytes(bytes).file_name(filename.to_string());
        let form = reqwest::multipart::Form::new()
            .part("attached_file", part)
            .text("object_id", task_id.to_string())
            .text("project", project_id.to_string());
        let request = self
            .request(Method::POST, "userstories/attachments")
            .await?
            .multipart(form);
        decode(self.send(request, "userstories/attachments").await?).await
    }

    async fn delete_attachment(&self, attachment_id: i64) -> Result<(), TrackerError> {
        let path = format!("userstories/attachments/{}", attachment_id);
        let request = self.request(Method::DELETE, &path).await?;
        self.send(request, &path).await?;
        Ok(())
    }
}
