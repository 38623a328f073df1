use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use tracker_module::TaigaConfig;

use crate::statuses::StatusRole;

pub const DEFAULT_DATABASE_PATH: &str = "data/tasks.db";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(String),
    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: String, value: String },
    #[error("channel {channel_id} is mapped to both project {first} and project {second}")]
    DuplicateChannel {
        channel_id: String,
        first: i64,
        second: i64,
    },
}

/// One tracker project and the chat channel whose threads feed it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectConfig {
    pub project_id: i64,
    pub channel_id: String,
    pub backlog_slug: String,
    pub in_progress_slug: String,
    pub completed_slug: String,
}

impl ProjectConfig {
    pub fn slug_for(&self, role: StatusRole) -> &str {
        match role {
            StatusRole::Backlog => &self.backlog_slug,
            StatusRole::InProgress => &self.in_progress_slug,
            StatusRole::Completed => &self.completed_slug,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub taiga: TaigaConfig,
    pub discord_token: String,
    pub database_path: PathBuf,
    pub poll_interval: Duration,
    pub projects: Vec<ProjectConfig>,
}

impl SyncConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };
        let require = |key: &str| get(key).ok_or_else(|| ConfigError::Missing(key.to_string()));

        let taiga = TaigaConfig {
            base_url: require("TAIGA_URL")?,
            username: require("TAIGA_USERNAME")?,
            password: require("TAIGA_PASSWORD")?,
        };
        let discord_token = require("DISCORD_TOKEN")?;

        let database_path = get("SYNC_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));

        let poll_interval = match get("STATUS_POLL_INTERVAL_SECS") {
            Some(raw) => raw
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .map(Duration::from_secs)
                .ok_or(ConfigError::Invalid {
                    key: "STATUS_POLL_INTERVAL_SECS".to_string(),
                    value: raw,
                })?,
            None => DEFAULT_POLL_INTERVAL,
        };

        let raw_projects = require("TAIGA_PROJECTS")?;
        let mut projects = Vec::new();
        let mut channels: HashMap<String, i64> = HashMap::new();
        for raw in raw_projects.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            let project_id = raw.parse::<i64>().map_err(|_| ConfigError::Invalid {
                key: "TAIGA_PROJECTS".to_string(),
                value: raw.to_string(),
            })?;
            let project = ProjectConfig {
                project_id,
                channel_id: require(&format!("{}_CHANNEL_ID", raw))?,
                backlog_slug: require(&format!("{}_{}", raw, StatusRole::Backlog.env_suffix()))?,
                in_progress_slug: require(&format!(
                    "{}_{}",
                    raw,
                    StatusRole::InProgress.env_suffix()
                ))?,
                completed_slug: require(&format!(
                    "{}_{}",
                    raw,
                    StatusRole::Completed.env_suffix()
                ))?,
            };
            if let Some(first) = channels.insert(project.channel_id.clone(), project_id) {
                return Err(ConfigError::DuplicateChannel {
                    channel_id: project.channel_id,
                    first,
                    second: project_id,
                });
            }
            projects.push(project);
        }
        if projects.is_empty() {
            return Err(ConfigError::Missing("TAIGA_PROJECTS".to_string()));
        }

        Ok(Self {
            taiga,
            discord_token,
            database_path,
            poll_interval,
            projects,
        })
    }
}
