//! Kanban status table.
//!
//! Each configured project tracks three workflow roles. The operator names
//! them by slug and the ids are looked up once at startup; a slug that does
//! not match exactly one tracker status is a configuration error.

use tracing::info;
use tracker_module::TrackerApi;

use crate::config::ProjectConfig;
use crate::error::SyncError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusRole {
    Backlog,
    InProgress,
    Completed,
}

impl StatusRole {
    pub const ALL: [StatusRole; 3] = [
        StatusRole::Backlog,
        StatusRole::InProgress,
        StatusRole::Completed,
    ];

    /// Name shown in chat notifications.
    pub fn display_name(self) -> &'static str {
        match self {
            StatusRole::Backlog => "Backlog",
            StatusRole::InProgress => "In Progress",
            StatusRole::Completed => "Completed",
        }
    }

    pub(crate) fn env_suffix(self) -> &'static str {
        match self {
            StatusRole::Backlog => "BACKLOG",
            StatusRole::InProgress => "IN_PROGRESS",
            StatusRole::Completed => "COMPLETED",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, StatusRole::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub role: StatusRole,
    pub name: String,
    pub slug: String,
    pub id: i64,
}

/// Resolved statuses of one project, in role order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectStatuses {
    pub project_id: i64,
    pub channel_id: String,
    statuses: Vec<Status>,
}

impl ProjectStatuses {
    pub fn new(project_id: i64, channel_id: impl Into<String>, statuses: Vec<Status>) -> Self {
        Self {
            project_id,
            channel_id: channel_id.into(),
            statuses,
        }
    }

    pub fn statuses(&self) -> &[Status] {
        &self.statuses
    }

    pub fn by_role(&self, role: StatusRole) -> Option<&Status> {
        self.statuses.iter().find(|status| status.role == role)
    }

    pub fn by_id(&self, id: i64) -> Option<&Status> {
        self.statuses.iter().find(|status| status.id == id)
    }

    pub fn by_slug(&self, slug: &str) -> Option<&Status> {
        self.statuses.iter().find(|status| status.slug == slug)
    }
}

/// Every configured project, addressable by its chat channel.
#[derive(Debug, Clone, Default)]
pub struct ProjectDirectory {
    projects: Vec<ProjectStatuses>,
}

impl ProjectDirectory {
    pub fn new(projects: Vec<ProjectStatuses>) -> Self {
        Self { projects }
    }

    /// Look up each project's status list and pin every configured slug to
    /// its id.
    pub async fn resolve(
        configs: &[ProjectConfig],
        tracker: &dyn TrackerApi,
    ) -> Result<Self, SyncError> {
        let mut projects = Vec::with_capacity(configs.len());
        for config in configs {
            let available = tracker.list_statuses(config.project_id).await?;
            let mut statuses = Vec::with_capacity(StatusRole::ALL.len());
            for role in StatusRole::ALL {
                let slug = config.slug_for(role);
                let mut matches = available.iter().filter(|status| status.slug == slug);
                let found = match (matches.next(), matches.next()) {
                    (Some(found), None) => found,
                    (None, _) => {
                        return Err(SyncError::Configuration(format!(
                            "project {}: status slug {:?} ({}) not found",
                            config.project_id,
                            slug,
                            role.display_name()
                        )))
                    }
                    (Some(_), Some(_)) => {
                        return Err(SyncError::Configuration(format!(
                            "project {}: status slug {:?} ({}) is ambiguous",
                            config.project_id,
                            slug,
                            role.display_name()
                        )))
                    }
                };
                statuses.push(Status {
                    role,
                    name: role.display_name().to_string(),
                    slug: slug.to_string(),
                    id: found.id,
                });
            }
            info!(
                "resolved statuses for project {}: {}",
                config.project_id,
                statuses
                    .iter()
                    .map(|status| format!("{}={}", status.slug, status.id))
                    .collect::<Vec<_>>()
                    .join(", ")
            );
            projects.push(ProjectStatuses::new(
                config.project_id,
                config.channel_id.clone(),
                statuses,
            ));
        }
        Ok(Self { projects })
    }

    pub fn projects(&self) -> &[ProjectStatuses] {
        &self.projects
    }

    pub fn by_channel(&self, channel_id: &str) -> Option<&ProjectStatuses> {
        self.projects
            .iter()
            .find(|project| project.channel_id == channel_id)
    }
}
