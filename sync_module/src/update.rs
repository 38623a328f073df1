use tracing::{debug, warn};
use tracker_module::{TaskUpdate, TrackerApi, TrackerError};

use crate::error::SyncError;

/// Apply `update` at the task's current version.
///
/// The version is read right before the patch. A stale-version rejection
/// re-reads it and tries once more; a second rejection is returned as
/// `SyncError::VersionConflict`.
pub async fn update_task_versioned(
    tracker: &dyn TrackerApi,
    task_id: i64,
    update: &TaskUpdate,
) -> Result<(), SyncError> {
    let version = tracker.get_task(task_id).await?.version;
    debug!("updating {} of task {} at version {}", update.label(), task_id, version);
    match tracker.update_task(task_id, version, update).await {
        Err(TrackerError::VersionConflict { .. }) => {
            warn!(
                "version {} of task {} is stale, retrying {} update",
                version,
                task_id,
                update.label()
            );
            let version = tracker.get_task(task_id).await?.version;
            tracker.update_task(task_id, version, update).await?;
            Ok(())
        }
        other => Ok(other?),
    }
}
