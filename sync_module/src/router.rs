//! Turns chat events into tracker mutations.
//!
//! Each event resolves to at most one action against the tracker. Store
//! writes happen only after the tracker call they describe has succeeded.

use std::iter;
use std::sync::Arc;

use tracing::{debug, info};
use tracker_module::{HistoryEntry, NewTask, TaskUpdate, TrackerApi};

use crate::attachments::AttachmentReconciler;
use crate::chat::{ChatApi, ChatError, ChatEvent, ChatMessage, ThreadInfo};
use crate::error::SyncError;
use crate::statuses::{ProjectDirectory, ProjectStatuses, StatusRole};
use crate::store::{CommentLink, CorrelationStore, TaskLink};
use crate::update::update_task_versioned;

/// What a handled event did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    TaskCreated { task_id: i64 },
    CommentCreated { task_id: i64, comment_id: String },
    SubjectUpdated { task_id: i64 },
    DescriptionUpdated { task_id: i64 },
    CommentUpdated { task_id: i64, comment_id: String },
    Ignored(&'static str),
}

/// Applies chat events to the tracker and records the resulting links.
pub struct EventRouter {
    tracker: Arc<dyn TrackerApi>,
    chat: Arc<dyn ChatApi>,
    store: Arc<CorrelationStore>,
    directory: Arc<ProjectDirectory>,
    attachments: AttachmentReconciler,
}

impl EventRouter {
    pub fn new(
        tracker: Arc<dyn TrackerApi>,
        chat: Arc<dyn ChatApi>,
        store: Arc<CorrelationStore>,
        directory: Arc<ProjectDirectory>,
    ) -> Self {
        let attachments = AttachmentReconciler::new(tracker.clone(), chat.clone(), store.clone());
        Self {
            tracker,
            chat,
            store,
            directory,
            attachments,
        }
    }

    pub async fn handle(&self, event: ChatEvent) -> Result<RouteOutcome, SyncError> {
        let outcome = match event {
            ChatEvent::MessageCreated(message) => self.message_created(&message).await?,
            ChatEvent::MessageEdited(message) => self.message_edited(&message).await?,
            ChatEvent::ThreadRenamed { thread_id, name } => {
                self.thread_renamed(&thread_id, &name).await?
            }
        };
        if let RouteOutcome::Ignored(reason) = outcome {
            debug!("event ignored: {}", reason);
        }
        Ok(outcome)
    }

    /// The thread and its project, or `None` when the thread does not sit
    /// under a tracked channel.
    async fn tracked_thread(
        &self,
        thread_id: &str,
    ) -> Result<Option<(ThreadInfo, &ProjectStatuses)>, SyncError> {
        let thread = match self.chat.fetch_thread(thread_id).await {
            Ok(thread) => thread,
            Err(ChatError::NotAThread(_)) => return Ok(None),
            Err(err) => return Err(err.into()),
        };
        let project = thread
            .parent_id
            .as_deref()
            .and_then(|parent| self.directory.by_channel(parent));
        Ok(project.map(|project| (thread, project)))
    }

    async fn message_created(&self, message: &ChatMessage) -> Result<RouteOutcome, SyncError> {
        let Some((thread, project)) = self.tracked_thread(&message.thread_id).await? else {
            return Ok(RouteOutcome::Ignored("channel is not tracked"));
        };
        if thread.message_count == 0 {
            // The count can lag behind; only the origin message is a redelivery.
            match self.store.task_link_by_thread(&thread.id)? {
                None => return self.create_task(project, &thread, message).await,
                Some(link) if link.origin_message_id == message.id => {
                    return Ok(RouteOutcome::Ignored("thread already has a task"));
                }
                Some(_) => {}
            }
        }
        self.create_comment(project, &thread, message).await
    }

    async fn create_task(
        &self,
        project: &ProjectStatuses,
        thread: &ThreadInfo,
        message: &ChatMessage,
    ) -> Result<RouteOutcome, SyncError> {
        let backlog = project.by_role(StatusRole::Backlog).ok_or_else(|| {
            SyncError::Configuration(format!("project {} has no backlog", project.project_id))
        })?;

        let existing = self
            .tracker
            .list_tasks(project.project_id, backlog.id)
            .await?;
        let task_id = self
            .tracker
            .create_task(&NewTask {
                subject: thread.name.clone(),
                description: task_description(&message.author, &message.content, ""),
                project: project.project_id,
                status: backlog.id,
                kanban_order: 1,
            })
            .await?;
        self.store.insert_task_link(&TaskLink {
            thread_id: thread.id.clone(),
            task_id,
            status_id: backlog.id,
            origin_message_id: message.id.clone(),
        })?;
        info!(
            "created task {} in project {} for thread {}",
            task_id, project.project_id, thread.id
        );

        let order: Vec<i64> = iter::once(task_id)
            .chain(existing.iter().map(|task| task.id).filter(|id| *id != task_id))
            .collect();
        self.tracker
            .reorder_tasks(project.project_id, backlog.id, &order)
            .await?;

        let fragment = self
            .attachments
            .reconcile(project.project_id, &message.attachments, task_id, &message.id)
            .await?;
        if !fragment.is_empty() {
            let description = task_description(&message.author, &message.content, &fragment);
            update_task_versioned(
                self.tracker.as_ref(),
                task_id,
                &TaskUpdate::Description(description),
            )
            .await?;
        }
        Ok(RouteOutcome::TaskCreated { task_id })
    }

    async fn create_comment(
        &self,
        project: &ProjectStatuses,
        thread: &ThreadInfo,
        message: &ChatMessage,
    ) -> Result<RouteOutcome, SyncError> {
        // Some clients repeat the thread title as the first reply.
        if message.attachments.is_empty() && message.content.trim() == thread.name.trim() {
            return Ok(RouteOutcome::Ignored("reply repeats the thread title"));
        }
        let Some(link) = self.store.task_link_by_thread(&thread.id)? else {
            return Ok(RouteOutcome::Ignored("thread has no task"));
        };
        if self.store.comment_link_by_message(&message.id)?.is_some() {
            return Ok(RouteOutcome::Ignored("message already has a comment"));
        }

        let fragment = self
            .attachments
            .reconcile(project.project_id, &message.attachments, link.task_id, &message.id)
            .await?;
        let body = comment_body(&message.author, &message.content, &fragment);
        update_task_versioned(
            self.tracker.as_ref(),
            link.task_id,
            &TaskUpdate::Comment(body.clone()),
        )
        .await?;

        // Comment creation does not return an id; find it in the history.
        let history = self.tracker.list_history(link.task_id).await?;
        let comment_id = posted_comment_id(&history, &body).ok_or_else(|| {
            SyncError::NotFound(format!("new comment on task {}", link.task_id))
        })?;
        self.store.insert_comment_link(&CommentLink {
            message_id: message.id.clone(),
            comment_id: comment_id.clone(),
            task_id: link.task_id,
            last_edited_at: message.timestamp,
        })?;
        info!(
            "commented on task {} from message {} (comment {})",
            link.task_id, message.id, comment_id
        );
        Ok(RouteOutcome::CommentCreated {
            task_id: link.task_id,
            comment_id,
        })
    }

    async fn message_edited(&self, message: &ChatMessage) -> Result<RouteOutcome, SyncError> {
        let task_link = self.store.task_link_by_message(&message.id)?;
        let comment_link = match task_link {
            Some(_) => None,
            None => self.store.comment_link_by_message(&message.id)?,
        };
        if task_link.is_none() && comment_link.is_none() {
            return Ok(RouteOutcome::Ignored("message is not mirrored"));
        }
        let Some((_, project)) = self.tracked_thread(&message.thread_id).await? else {
            return Ok(RouteOutcome::Ignored("channel is not tracked"));
        };

        if let Some(link) = task_link {
            let fragment = self
                .attachments
                .reconcile(project.project_id, &message.attachments, link.task_id, &message.id)
                .await?;
            let description = task_description(&message.author, &message.content, &fragment);
            update_task_versioned(
                self.tracker.as_ref(),
                link.task_id,
                &TaskUpdate::Description(description),
            )
            .await?;
            info!("updated description of task {}", link.task_id);
            return Ok(RouteOutcome::DescriptionUpdated {
                task_id: link.task_id,
            });
        }

        let Some(link) = comment_link else {
            return Ok(RouteOutcome::Ignored("message is not mirrored"));
        };
        let fragment = self
            .attachments
            .reconcile(project.project_id, &message.attachments, link.task_id, &message.id)
            .await?;
        let body = comment_body(&message.author, &message.content, &fragment);
        self.tracker
            .edit_comment(link.task_id, &link.comment_id, &body)
            .await?;
        self.store
            .touch_comment_link(&message.id, &link.comment_id, message.timestamp)?;
        info!(
            "updated comment {} on task {}",
            link.comment_id, link.task_id
        );
        Ok(RouteOutcome::CommentUpdated {
            task_id: link.task_id,
            comment_id: link.comment_id,
        })
    }

    async fn thread_renamed(&self, thread_id: &str, name: &str) -> Result<RouteOutcome, SyncError> {
        let Some(link) = self.store.task_link_by_thread(thread_id)? else {
            return Ok(RouteOutcome::Ignored("thread has no task"));
        };
        let task = self.tracker.get_task(link.task_id).await?;
        if task.subject == name {
            return Ok(RouteOutcome::Ignored("subject already matches"));
        }
        update_task_versioned(
            self.tracker.as_ref(),
            link.task_id,
            &TaskUpdate::Subject(name.to_string()),
        )
        .await?;
        info!("renamed task {} to {:?}", link.task_id, name);
        Ok(RouteOutcome::SubjectUpdated {
            task_id: link.task_id,
        })
    }
}

fn task_description(author: &str, content: &str, attachments: &str) -> String {
    format!("Created by {}: \n\n{}{}", author, content, attachments)
}

fn comment_body(author: &str, content: &str, attachments: &str) -> String {
    format!("Comment from {}: \n\n{}{}", author, content, attachments)
}

/// The newest history entry carrying exactly `body`.
fn posted_comment_id(history: &[HistoryEntry], body: &str) -> Option<String> {
    history
        .iter()
        .find(|entry| entry.comment == body)
        .map(|entry| entry.id.clone())
}
