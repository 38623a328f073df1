//! Mirrors a message's files onto its task.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};
use tracker_module::{TrackerApi, TrackerError};

use crate::chat::{ChatApi, ChatAttachment};
use crate::error::SyncError;
use crate::store::{CorrelationStore, NewAttachmentLink};

const ATTACHMENTS_HEADER: &str = "\n\nAttachments:";

/// Mirrors message attachments onto tracker tasks.
pub struct AttachmentReconciler {
    tracker: Arc<dyn TrackerApi>,
    chat: Arc<dyn ChatApi>,
    store: Arc<CorrelationStore>,
}

impl AttachmentReconciler {
    pub fn new(
        tracker: Arc<dyn TrackerApi>,
        chat: Arc<dyn ChatApi>,
        store: Arc<CorrelationStore>,
    ) -> Self {
        Self {
            tracker,
            chat,
            store,
        }
    }

    /// Bring the task's copies of `message_id`'s files in line with
    /// `attachments` and return the markdown listing them.
    ///
    /// Files mirrored earlier are reused. Files the message no longer carries
    /// are deleted from the tracker and forgotten.
    pub async fn reconcile(
        &self,
        project_id: i64,
        attachments: &[ChatAttachment],
        task_id: i64,
        message_id: &str,
    ) -> Result<String, SyncError> {
        let mut markdown = String::new();
        if !attachments.is_empty() {
            markdown.push_str(ATTACHMENTS_HEADER);
        }
        for attachment in attachments {
            let url = self
                .mirror(project_id, attachment, task_id, message_id)
                .await?;
            let bang = if attachment.is_image() { "!" } else { "" };
            markdown.push_str(&format!("\n{}[{}]({})", bang, attachment.filename, url));
        }

        self.delete_stale(attachments, task_id, message_id).await?;
        Ok(markdown)
    }

    async fn mirror(
        &self,
        project_id: i64,
        attachment: &ChatAttachment,
        task_id: i64,
        message_id: &str,
    ) -> Result<String, SyncError> {
        if let Some(link) = self
            .store
            .attachment_link(message_id, &attachment.id, task_id)?
        {
            return Ok(link.preview_url);
        }

        let bytes = self.chat.download_attachment(&attachment.url).await?;
        let uploaded = self
            .tracker
            .upload_attachment(project_id, task_id, &attachment.filename, bytes)
            .await?;
        self.store.insert_attachment_link(&NewAttachmentLink {
            message_id,
            chat_file_id: &attachment.id,
            tracker_file_id: uploaded.id,
            preview_url: &uploaded.preview_url,
            task_id,
        })?;
        info!(
            "mirrored attachment {} of message {} to task {} as {}",
            attachment.id, message_id, task_id, uploaded.id
        );
        Ok(uploaded.preview_url)
    }

    async fn delete_stale(
        &self,
        attachments: &[ChatAttachment],
        task_id: i64,
        message_id: &str,
    ) -> Result<(), SyncError> {
        let current: HashSet<&str> = attachments.iter().map(|a| a.id.as_str()).collect();
        let stale = self
            .store
            .attachment_links_for(task_id, message_id)?
            .into_iter()
            .filter(|link| !current.contains(link.chat_file_id.as_str()));

        for link in stale {
            match self.tracker.delete_attachment(link.tracker_file_id).await {
                Ok(()) => {}
                Err(TrackerError::NotFound(_)) => {
                    warn!(
                        "attachment {} of task {} already gone from tracker",
                        link.tracker_file_id, task_id
                    );
                }
                Err(err) => return Err(err.into()),
            }
            self.store.delete_attachment_link(link.id)?;
            info!(
                "removed attachment {} from task {} (message {})",
                link.tracker_file_id, task_id, message_id
            );
        }
        Ok(())
    }
}
