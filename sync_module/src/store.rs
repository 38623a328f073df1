//! Correlation store between Discord identifiers and Taiga identifiers.
//!
//! Three tables pair threads with tasks, reply messages with task comments,
//! and mirrored files with their tracker-side copies. The store keeps exactly
//! one SQLite connection behind a mutex, so every read and write from the
//! event handlers and the status poller is serialized.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};

const CORRELATION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS task_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    thread_id TEXT NOT NULL,
    origin_message_id TEXT NOT NULL,
    task_id INTEGER NOT NULL,
    status_id INTEGER NOT NULL,
    UNIQUE(thread_id, task_id)
);

CREATE INDEX IF NOT EXISTS idx_task_links_message
ON task_links(origin_message_id);

CREATE INDEX IF NOT EXISTS idx_task_links_status
ON task_links(status_id);

CREATE TABLE IF NOT EXISTS comment_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    message_id TEXT NOT NULL,
    comment_id TEXT NOT NULL,
    task_id INTEGER NOT NULL,
    last_edited_at TEXT NOT NULL,
    UNIQUE(message_id, comment_id)
);

CREATE TABLE IF NOT EXISTS attachment_links (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    task_id INTEGER NOT NULL,
    message_id TEXT NOT NULL,
    chat_file_id TEXT NOT NULL,
    tracker_file_id INTEGER NOT NULL,
    preview_url TEXT NOT NULL,
    UNIQUE(message_id, chat_file_id, task_id)
);
"#;

/// A chat thread paired with the task created for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskLink {
    pub thread_id: String,
    pub task_id: i64,
    pub status_id: i64,
    /// The message whose content became the task description.
    pub origin_message_id: String,
}

/// A reply message paired with the task comment it produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentLink {
    pub message_id: String,
    pub comment_id: String,
    pub task_id: i64,
    pub last_edited_at: DateTime<Utc>,
}

/// A chat file already mirrored onto a task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentLink {
    pub id: i64,
    pub message_id: String,
    pub chat_file_id: String,
    pub tracker_file_id: i64,
    pub preview_url: String,
    pub task_id: i64,
}

/// Insert form of [`AttachmentLink`].
#[derive(Debug, Clone)]
pub struct NewAttachmentLink<'a> {
    pub message_id: &'a str,
    pub chat_file_id: &'a str,
    pub tracker_file_id: i64,
    pub preview_url: &'a str,
    pub task_id: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("datetime parse error: {0}")]
    DateTimeParse(#[from] chrono::ParseError),
}

/// SQLite store linking chat threads and messages to tracker objects.
#[derive(Debug)]
pub struct CorrelationStore {
    conn: Mutex<Connection>,
}

impl CorrelationStore {
    /// Open (creating if needed) the store at `path`.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(CORRELATION_SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave SQLite half-written.
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record a new thread/task pairing. Re-inserting the same pair is a no-op.
    pub fn insert_task_link(&self, link: &TaskLink) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO task_links (thread_id, origin_message_id, task_id, status_id)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.thread_id,
                link.origin_message_id,
                link.task_id,
                link.status_id
            ],
        )?;
        Ok(())
    }

    pub fn task_link_by_thread(&self, thread_id: &str) -> Result<Option<TaskLink>, StoreError> {
        let link = self
            .conn()
            .query_row(
                "SELECT thread_id, task_id, status_id, origin_message_id
                 FROM task_links WHERE thread_id = ?1
                 ORDER BY id LIMIT 1",
                params![thread_id],
                task_link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    pub fn task_link_by_message(&self, message_id: &str) -> Result<Option<TaskLink>, StoreError> {
        let link = self
            .conn()
            .query_row(
                "SELECT thread_id, task_id, status_id, origin_message_id
                 FROM task_links WHERE origin_message_id = ?1
                 ORDER BY id LIMIT 1",
                params![message_id],
                task_link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// All links whose last known status is `status_id`.
    pub fn task_links_with_status(&self, status_id: i64) -> Result<Vec<TaskLink>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT thread_id, task_id, status_id, origin_message_id
             FROM task_links WHERE status_id = ?1
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![status_id], task_link_from_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    pub fn update_task_status(&self, task_id: i64, status_id: i64) -> Result<bool, StoreError> {
        let rows_affected = self.conn().execute(
            "UPDATE task_links SET status_id = ?1 WHERE task_id = ?2",
            params![status_id, task_id],
        )?;
        Ok(rows_affected > 0)
    }

    pub fn insert_comment_link(&self, link: &CommentLink) -> Result<(), StoreError> {
        self.conn().execute(
            "INSERT OR IGNORE INTO comment_links (message_id, comment_id, task_id, last_edited_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                link.message_id,
                link.comment_id,
                link.task_id,
                format_datetime(link.last_edited_at)
            ],
        )?;
        Ok(())
    }

    pub fn comment_link_by_message(
        &self,
        message_id: &str,
    ) -> Result<Option<CommentLink>, StoreError> {
        let row = self
            .conn()
            .query_row(
                "SELECT message_id, comment_id, task_id, last_edited_at
                 FROM comment_links WHERE message_id = ?1
                 ORDER BY id LIMIT 1",
                params![message_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((message_id, comment_id, task_id, last_edited_at)) => Ok(Some(CommentLink {
                message_id,
                comment_id,
                task_id,
                last_edited_at: parse_datetime(&last_edited_at)?,
            })),
            None => Ok(None),
        }
    }

    pub fn touch_comment_link(
        &self,
        message_id: &str,
        comment_id: &str,
        edited_at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.conn().execute(
            "UPDATE comment_links SET last_edited_at = ?1 WHERE message_id = ?2 AND comment_id = ?3",
            params![format_datetime(edited_at), message_id, comment_id],
        )?;
        Ok(())
    }

    pub fn attachment_link(
        &self,
        message_id: &str,
        chat_file_id: &str,
        task_id: i64,
    ) -> Result<Option<AttachmentLink>, StoreError> {
        let link = self
            .conn()
            .query_row(
                "SELECT id, message_id, chat_file_id, tracker_file_id, preview_url, task_id
                 FROM attachment_links
                 WHERE message_id = ?1 AND chat_file_id = ?2 AND task_id = ?3",
                params![message_id, chat_file_id, task_id],
                attachment_link_from_row,
            )
            .optional()?;
        Ok(link)
    }

    /// Links mirrored for one message on one task.
    pub fn attachment_links_for(
        &self,
        task_id: i64,
        message_id: &str,
    ) -> Result<Vec<AttachmentLink>, StoreError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, message_id, chat_file_id, tracker_file_id, preview_url, task_id
             FROM attachment_links
             WHERE task_id = ?1 AND message_id = ?2
             ORDER BY id",
        )?;
        let rows = stmt.query_map(params![task_id, message_id], attachment_link_from_row)?;
        let mut links = Vec::new();
        for row in rows {
            links.push(row?);
        }
        Ok(links)
    }

    pub fn insert_attachment_link(&self, link: &NewAttachmentLink<'_>) -> Result<i64, StoreError> {
        let conn = self.conn();
        conn.execute(
            "INSERT INTO attachment_links (task_id, message_id, chat_file_id, tracker_file_id, preview_url)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(message_id, chat_file_id, task_id) DO UPDATE SET
                tracker_file_id = excluded.tracker_file_id,
                preview_url = excluded.preview_url",
            params![
                link.task_id,
                link.message_id,
                link.chat_file_id,
                link.tracker_file_id,
                link.preview_url
            ],
        )?;
        let id = conn.query_row(
            "SELECT id FROM attachment_links
             WHERE message_id = ?1 AND chat_file_id = ?2 AND task_id = ?3",
            params![link.message_id, link.chat_file_id, link.task_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn delete_attachment_link(&self, id: i64) -> Result<bool, StoreError> {
        let rows_affected = self
            .conn()
            .execute("DELETE FROM attachment_links WHERE id = ?1", params![id])?;
        Ok(rows_affected > 0)
    }
}

fn task_link_from_row(row: &Row<'_>) -> rusqlite::Result<TaskLink> {
    Ok(TaskLink {
        thread_id: row.get(0)?,
        task_id: row.get(1)?,
        status_id: row.get(2)?,
        origin_message_id: row.get(3)?,
    })
}

fn attachment_link_from_row(row: &Row<'_>) -> rusqlite::Result<AttachmentLink> {
    Ok(AttachmentLink {
        id: row.get(0)?,
        message_id: row.get(1)?,
        chat_file_id: row.get(2)?,
        tracker_file_id: row.get(3)?,
        preview_url: row.get(4)?,
        task_id: row.get(5)?,
    })
}

fn format_datetime(value: DateTime<Utc>) -> String {
    value.to_rfc3339()
}

fn parse_datetime(value: &str) -> Result<DateTime<Utc>, chrono::ParseError> {
    Ok(DateTime::parse_from_rfc3339(value)?.with_timezone(&Utc))
}
