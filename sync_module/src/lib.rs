//! Keeps Discord threads and Taiga tasks in step.
//!
//! Thread creation, replies, edits and renames flow through [`EventRouter`]
//! into the tracker. [`StatusPoller`] watches the tracker for status changes
//! and reports them back into the thread.

pub mod attachments;
pub mod chat;
pub mod config;
pub mod error;
pub mod gateway;
pub mod poller;
pub mod router;
pub mod statuses;
pub mod store;
pub mod update;

#[cfg(test)]
pub(crate) mod test_support;

pub use attachments::AttachmentReconciler;
pub use chat::{ChatApi, ChatAttachment, ChatError, ChatEvent, ChatMessage, SerenityChat, ThreadInfo};
pub use config::{ConfigError, ProjectConfig, SyncConfig};
pub use error::SyncError;
pub use poller::{PollReport, StatusPoller};
pub use router::{EventRouter, RouteOutcome};
pub use statuses::{ProjectDirectory, ProjectStatuses, Status, StatusRole};
pub use store::{CorrelationStore, StoreError};
