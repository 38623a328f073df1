//! In-memory fakes of the tracker and chat APIs for engine tests.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tempfile::TempDir;
use tracker_module::{
    HistoryEntry, NewTask, Task, TaskUpdate, TrackerApi, TrackerError, TrackerStatus,
    UploadedAttachment,
};

use crate::chat::{ChatApi, ChatError, ThreadInfo};
use crate::statuses::{ProjectDirectory, ProjectStatuses, Status, StatusRole};
use crate::store::CorrelationStore;

pub(crate) const PROJECT_ID: i64 = 7;
pub(crate) const CHANNEL_ID: &str = "1001";
pub(crate) const BACKLOG: i64 = 11;
pub(crate) const IN_PROGRESS: i64 = 12;
pub(crate) const COMPLETED: i64 = 13;

pub(crate) fn test_store() -> (TempDir, CorrelationStore) {
    let temp = TempDir::new().expect("tempdir");
    let store = CorrelationStore::open(temp.path().join("tasks.db")).expect("store");
    (temp, store)
}

pub(crate) fn directory() -> ProjectDirectory {
    let statuses = [
        (StatusRole::Backlog, "new", BACKLOG),
        (StatusRole::InProgress, "in-progress", IN_PROGRESS),
        (StatusRole::Completed, "done", COMPLETED),
    ]
    .into_iter()
    .map(|(role, slug, id)| Status {
        role,
        name: role.display_name().to_string(),
        slug: slug.to_string(),
        id,
    })
    .collect();
    ProjectDirectory::new(vec![ProjectStatuses::new(PROJECT_ID, CHANNEL_ID, statuses)])
}

#[derive(Debug, Clone)]
pub(crate) struct FakeTask {
    pub project_id: i64,
    pub task: Task,
    pub description: String,
}

#[derive(Debug, Default)]
pub(crate) struct TrackerState {
    pub statuses: HashMap<i64, Vec<TrackerStatus>>,
    pub tasks: Vec<FakeTask>,
    /// Newest first, per task.
    pub history: HashMap<i64, Vec<HistoryEntry>>,
    pub created: Vec<NewTask>,
    pub updates: Vec<(i64, i64, TaskUpdate)>,
    pub reorders: Vec<(i64, i64, Vec<i64>)>,
    pub comment_edits: Vec<(i64, String, String)>,
    pub uploads: Vec<(i64, i64, String, Vec<u8>)>,
    pub deleted_attachments: Vec<i64>,
    pub get_task_calls: usize,
    /// Bump the task version right before this many upcoming updates, as if
    /// another writer got there first.
    pub concurrent_writes: usize,
    /// Attachment ids whose deletion reports 404.
    pub vanished_attachments: HashSet<i64>,
    /// Status columns whose listing fails.
    pub failing_lists: HashSet<i64>,
    /// Posted comments are accepted but never show up in the history.
    pub hidden_comments: bool,
    history_seq: u32,
}

#[derive(Debug, Default)]
pub(crate) struct FakeTracker {
    state: Mutex<TrackerState>,
}

impl FakeTracker {
    pub fn state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().expect("tracker state")
    }

    pub fn with_statuses(&self, project_id: i64, statuses: &[(i64, &str)]) {
        self.state().statuses.insert(
            project_id,
            statuses
                .iter()
                .map(|(id, slug)| TrackerStatus {
                    id: *id,
                    slug: slug.to_string(),
                    name: slug.to_string(),
                })
                .collect(),
        );
    }

    pub fn add_task(&self, task_id: i64, status: i64, kanban_order: i64) {
        self.state().tasks.push(FakeTask {
            project_id: PROJECT_ID,
            task: Task {
                id: task_id,
                subject: format!("task {}", task_id),
                version: 1,
                status,
                kanban_order,
            },
            description: String::new(),
        });
    }

    pub fn task(&self, task_id: i64) -> Option<FakeTask> {
        self.state()
            .tasks
            .iter()
            .find(|fake| fake.task.id == task_id)
            .cloned()
    }

    pub fn move_task(&self, task_id: i64, status: i64) {
        let mut state = self.state();
        if let Some(fake) = state.tasks.iter_mut().find(|fake| fake.task.id == task_id) {
            fake.task.status = status;
            fake.task.version += 1;
        }
    }
}

fn not_found(resource: String) -> TrackerError {
    TrackerError::NotFound(resource)
}

#[async_trait]
impl TrackerApi for FakeTracker {
    async fn list_statuses(&self, project_id: i64) -> Result<Vec<TrackerStatus>, TrackerError> {
        Ok(self
            .state()
            .statuses
            .get(&project_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn get_task(&self, task_id: i64) -> Result<Task, TrackerError> {
        let mut state = self.state();
        state.get_task_calls += 1;
        state
            .tasks
            .iter()
            .find(|fake| fake.task.id == task_id)
            .map(|fake| fake.task.clone())
            .ok_or_else(|| not_found(format!("userstory {}", task_id)))
    }

    async fn list_tasks(&self, project_id: i64, status_id: i64) -> Result<Vec<Task>, TrackerError> {
        let state = self.state();
        if state.failing_lists.contains(&status_id) {
            return Err(TrackerError::MissingHeader("x-pagination-count"));
        }
        let mut tasks: Vec<Task> = state
            .tasks
            .iter()
            .filter(|fake| fake.project_id == project_id && fake.task.status == status_id)
            .map(|fake| fake.task.clone())
            .collect();
        tasks.sort_by_key(|task| task.kanban_order);
        Ok(tasks)
    }

    async fn create_task(&self, task: &NewTask) -> Result<i64, TrackerError> {
        let mut state = self.state();
        let id = 100 + state.created.len() as i64;
        state.created.push(task.clone());
        state.tasks.push(FakeTask {
            project_id: task.project,
            task: Task {
                id,
                subject: task.subject.clone(),
                version: 1,
                status: task.status,
                kanban_order: task.kanban_order,
            },
            description: task.description.clone(),
        });
        Ok(id)
    }

    async fn update_task(
        &self,
        task_id: i64,
        version: i64,
        update: &TaskUpdate,
    ) -> Result<(), TrackerError> {
        let mut state = self.state();
        let racing = state.concurrent_writes > 0;
        if racing {
            state.concurrent_writes -= 1;
        }
        state.history_seq += 1;
        let seq = state.history_seq;
        let fake = state
            .tasks
            .iter_mut()
            .find(|fake| fake.task.id == task_id)
            .ok_or_else(|| not_found(format!("userstory {}", task_id)))?;
        if racing {
            fake.task.version += 1;
        }
        if fake.task.version != version {
            return Err(TrackerError::VersionConflict { task_id });
        }
        fake.task.version += 1;
        match update {
            TaskUpdate::Subject(subject) => fake.task.subject = subject.clone(),
            TaskUpdate::Description(description) => fake.description = description.clone(),
            TaskUpdate::Comment(_) => {}
        }
        let recorded = !state.hidden_comments;
        if let (TaskUpdate::Comment(text), true) = (update, recorded) {
            state.history.entry(task_id).or_default().insert(
                0,
                HistoryEntry {
                    id: format!("h-{}", seq),
                    comment: text.clone(),
                    created_at: format!("2024-01-01T00:00:{:02}Z", seq),
                },
            );
        }
        state.updates.push((task_id, version, update.clone()));
        Ok(())
    }

    async fn reorder_tasks(
        &self,
        project_id: i64,
        status_id: i64,
        task_ids: &[i64],
    ) -> Result<(), TrackerError> {
        let mut state = self.state();
        for (position, id) in task_ids.iter().enumerate() {
            if let Some(fake) = state.tasks.iter_mut().find(|fake| fake.task.id == *id) {
                fake.task.kanban_order = position as i64 + 1;
            }
        }
        state
            .reorders
            .push((project_id, status_id, task_ids.to_vec()));
        Ok(())
    }

    async fn list_history(&self, task_id: i64) -> Result<Vec<HistoryEntry>, TrackerError> {
        Ok(self
            .state()
            .history
            .get(&task_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn edit_comment(
        &self,
        task_id: i64,
        comment_id: &str,
        text: &str,
    ) -> Result<(), TrackerError> {
        let mut state = self.state();
        state
            .comment_edits
            .push((task_id, comment_id.to_string(), text.to_string()));
        if let Some(entry) = state
            .history
            .get_mut(&task_id)
            .and_then(|entries| entries.iter_mut().find(|entry| entry.id == comment_id))
        {
            entry.comment = text.to_string();
        }
        Ok(())
    }

    async fn upload_attachment(
        &self,
        project_id: i64,
        task_id: i64,
        filename: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAttachment, TrackerError> {
        let mut state = self.state();
        let id = 500 + state.uploads.len() as i64;
        state
            .uploads
            .push((project_id, task_id, filename.to_string(), bytes));
        Ok(UploadedAttachment {
            id,
            preview_url: format!("https://tracker.test/attachments/{}/{}", id, filename),
        })
    }

    async fn delete_attachment(&self, attachment_id: i64) -> Result<(), TrackerError> {
        let mut state = self.state();
        if state.vanished_attachments.contains(&attachment_id) {
            return Err(not_found(format!("attachment {}", attachment_id)));
        }
        state.deleted_attachments.push(attachment_id);
        Ok(())
    }
}

#[derive(Debug, Default)]
pub(crate) struct ChatState {
    pub threads: HashMap<String, ThreadInfo>,
    pub sent: Vec<(String, String)>,
    pub archived: Vec<String>,
    pub downloads: Vec<String>,
    /// Threads where sending fails.
    pub unreachable: HashSet<String>,
}

#[derive(Debug, Default)]
pub(crate) struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn state(&self) -> MutexGuard<'_, ChatState> {
        self.state.lock().expect("chat state")
    }

    pub fn add_thread(&self, thread_id: &str, parent_id: &str, name: &str, message_count: u32) {
        self.state().threads.insert(
            thread_id.to_string(),
            ThreadInfo {
                id: thread_id.to_string(),
                parent_id: Some(parent_id.to_string()),
                name: name.to_string(),
                message_count,
            },
        );
    }
}

#[async_trait]
impl ChatApi for FakeChat {
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, ChatError> {
        self.state()
            .threads
            .get(thread_id)
            .cloned()
            .ok_or_else(|| ChatError::NotAThread(thread_id.to_string()))
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<(), ChatError> {
        let mut state = self.state();
        if state.unreachable.contains(thread_id) {
            return Err(ChatError::InvalidId(thread_id.to_string()));
        }
        state.sent.push((thread_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        self.state().archived.push(thread_id.to_string());
        Ok(())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ChatError> {
        self.state().downloads.push(url.to_string());
        Ok(url.as_bytes().to_vec())
    }
}
