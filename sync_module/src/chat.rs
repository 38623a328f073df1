//! Chat-side view of Discord used by the sync engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serenity::builder::{CreateMessage, EditThread};
use serenity::http::Http;
use serenity::model::channel::{Channel, Message};
use serenity::model::id::ChannelId;
use serenity::model::Timestamp;

#[derive(Debug, thiserror::Error)]
pub enum ChatError {
    #[error("discord error: {0}")]
    Discord(#[from] serenity::Error),
    #[error("attachment download failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid discord id: {0:?}")]
    InvalidId(String),
    #[error("channel {0} is not a thread")]
    NotAThread(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatAttachment {
    pub id: String,
    pub filename: String,
    pub content_type: Option<String>,
    pub url: String,
}

impl ChatAttachment {
    pub fn is_image(&self) -> bool {
        self.content_type
            .as_deref()
            .is_some_and(|kind| kind.starts_with("image"))
    }
}

/// A message as the engine sees it, independent of the gateway payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub id: String,
    pub thread_id: String,
    pub author: String,
    pub content: String,
    pub attachments: Vec<ChatAttachment>,
    /// Edit time for edited messages, send time otherwise.
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn from_discord(message: &Message) -> Self {
        let author = message
            .author
            .global_name
            .clone()
            .unwrap_or_else(|| message.author.name.clone());
        let attachments = message
            .attachments
            .iter()
            .map(|attachment| ChatAttachment {
                id: attachment.id.to_string(),
                filename: attachment.filename.clone(),
                content_type: attachment.content_type.clone(),
                url: attachment.url.clone(),
            })
            .collect();
        Self {
            id: message.id.to_string(),
            thread_id: message.channel_id.to_string(),
            author,
            content: message.content.clone(),
            attachments,
            timestamp: to_utc(message.edited_timestamp.unwrap_or(message.timestamp)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadInfo {
    pub id: String,
    pub parent_id: Option<String>,
    pub name: String,
    /// Messages in the thread excluding the starter message.
    pub message_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatEvent {
    MessageCreated(ChatMessage),
    MessageEdited(ChatMessage),
    ThreadRenamed { thread_id: String, name: String },
}

/// Chat operations the engine needs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, ChatError>;

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<(), ChatError>;

    async fn archive_thread(&self, thread_id: &str) -> Result<(), ChatError>;

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ChatError>;
}

/// [`ChatApi`] over serenity's REST client.
#[derive(Clone)]
pub struct SerenityChat {
    http: Arc<Http>,
    downloader: reqwest::Client,
}

impl SerenityChat {
    pub fn new(http: Arc<Http>) -> Self {
        Self {
            http,
            downloader: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl ChatApi for SerenityChat {
    async fn fetch_thread(&self, thread_id: &str) -> Result<ThreadInfo, ChatError> {
        let channel = self.http.get_channel(parse_channel_id(thread_id)?).await?;
        let Channel::Guild(channel) = channel else {
            return Err(ChatError::NotAThread(thread_id.to_string()));
        };
        if channel.thread_metadata.is_none() {
            return Err(ChatError::NotAThread(thread_id.to_string()));
        }
        Ok(ThreadInfo {
            id: channel.id.to_string(),
            parent_id: channel.parent_id.map(|id| id.to_string()),
            name: channel.name,
            message_count: channel.message_count.unwrap_or(0),
        })
    }

    async fn send_message(&self, thread_id: &str, text: &str) -> Result<(), ChatError> {
        parse_channel_id(thread_id)?
            .send_message(self.http.as_ref(), CreateMessage::new().content(text))
            .await?;
        Ok(())
    }

    async fn archive_thread(&self, thread_id: &str) -> Result<(), ChatError> {
        parse_channel_id(thread_id)?
            .edit_thread(self.http.as_ref(), EditThread::new().archived(true))
            .await?;
        Ok(())
    }

    async fn download_attachment(&self, url: &str) -> Result<Vec<u8>, ChatError> {
        let response = self.downloader.get(url).send().await?.error_for_status()?;
        Ok(response.bytes().await?.to_vec())
    }
}

fn parse_channel_id(raw: &str) -> Result<ChannelId, ChatError> {
    raw.parse::<u64>()
        .ok()
        .filter(|id| *id != 0)
        .map(ChannelId::new)
        .ok_or_else(|| ChatError::InvalidId(raw.to_string()))
}

fn to_utc(timestamp: Timestamp) -> DateTime<Utc> {
    DateTime::from_timestamp(timestamp.unix_timestamp(), 0).unwrap_or_else(Utc::now)
}
