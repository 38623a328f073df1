//! Periodic status drift detection.
//!
//! The tracker cannot push changes, so every tick lists each tracked status
//! column and looks for linked tasks that left it. Changes are only applied
//! after the whole scan, once each task's new status has been read back from
//! the tracker.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tracker_module::TrackerApi;

use crate::chat::ChatApi;
use crate::error::SyncError;
use crate::statuses::{ProjectDirectory, ProjectStatuses, Status};
use crate::store::{CorrelationStore, TaskLink};

/// Counts from one poll tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PollReport {
    pub notified: usize,
    pub archived: usize,
    pub failures: usize,
}

#[derive(Debug)]
struct StatusChange {
    link: TaskLink,
    status: Status,
}

/// Announces tracker status changes in their chat threads.
pub struct StatusPoller {
    tracker: Arc<dyn TrackerApi>,
    chat: Arc<dyn ChatApi>,
    store: Arc<CorrelationStore>,
    directory: Arc<ProjectDirectory>,
    interval: Duration,
}

impl StatusPoller {
    pub fn new(
        tracker: Arc<dyn TrackerApi>,
        chat: Arc<dyn ChatApi>,
        store: Arc<CorrelationStore>,
        directory: Arc<ProjectDirectory>,
        interval: Duration,
    ) -> Self {
        Self {
            tracker,
            chat,
            store,
            directory,
            interval,
        }
    }

    /// Poll every `interval` until `shutdown` flips to true or its sender is
    /// dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!("status poller started with {:?} interval", self.interval);
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let report = self.poll_once().await;
                    if report == PollReport::default() {
                        debug!("status poll found no changes");
                    } else {
                        info!(
                            "status poll: {} notified, {} archived, {} failures",
                            report.notified, report.archived, report.failures
                        );
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        info!("status poller stopped");
    }

    pub async fn poll_once(&self) -> PollReport {
        let mut report = PollReport::default();
        let mut changes = Vec::new();

        for project in self.directory.projects() {
            for status in project.statuses() {
                if let Err(err) = self
                    .scan_status(project, status, &mut changes, &mut report)
                    .await
                {
                    report.failures += 1;
                    warn!(
                        "failed to scan status {} of project {}: {}",
                        status.slug, project.project_id, err
                    );
                }
            }
        }

        for change in changes {
            self.apply(change, &mut report).await;
        }
        report
    }

    async fn scan_status(
        &self,
        project: &ProjectStatuses,
        status: &Status,
        changes: &mut Vec<StatusChange>,
        report: &mut PollReport,
    ) -> Result<(), SyncError> {
        let live: HashSet<i64> = self
            .tracker
            .list_tasks(project.project_id, status.id)
            .await?
            .into_iter()
            .map(|task| task.id)
            .collect();

        for link in self.store.task_links_with_status(status.id)? {
            if live.contains(&link.task_id) {
                continue;
            }
            let task = match self.tracker.get_task(link.task_id).await {
                Ok(task) => task,
                Err(err) => {
                    report.failures += 1;
                    warn!("failed to fetch task {}: {}", link.task_id, err);
                    continue;
                }
            };
            if task.status == link.status_id {
                continue;
            }
            match project.by_id(task.status) {
                Some(new_status) => changes.push(StatusChange {
                    link,
                    status: new_status.clone(),
                }),
                None => debug!(
                    "task {} moved to untracked status {}",
                    task.id, task.status
                ),
            }
        }
        Ok(())
    }

    async fn apply(&self, change: StatusChange, report: &mut PollReport) {
        let StatusChange { link, status } = change;
        let notice = format!("Task status has been updated to \"{}\"", status.name);
        if let Err(err) = self.chat.send_message(&link.thread_id, &notice).await {
            // Left at the old status so the next tick retries.
            report.failures += 1;
            warn!(
                "failed to announce status of task {} in thread {}: {}",
                link.task_id, link.thread_id, err
            );
            return;
        }
        report.notified += 1;

        if status.role.is_terminal() {
            match self.chat.archive_thread(&link.thread_id).await {
                Ok(()) => {
                    report.archived += 1;
                    info!("archived thread {} for task {}", link.thread_id, link.task_id);
                }
                Err(err) => {
                    report.failures += 1;
                    warn!("failed to archive thread {}: {}", link.thread_id, err);
                }
            }
        }

        match self.store.update_task_status(link.task_id, status.id) {
            Ok(_) => info!(
                "task {} moved to {} ({})",
                link.task_id, status.name, status.id
            ),
            Err(err) => {
                report.failures += 1;
                error!("failed to record status of task {}: {}", link.task_id, err);
            }
        }
    }
}
