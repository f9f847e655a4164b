use time::OffsetDateTime;
use tracing::{info, instrument, warn};

use kecs_model::{Cluster, StopCode, Task, TaskStatus, api::StopTaskRequest};

use super::TaskEngine;
use crate::{error::CoreError, store::mutate_task};

const DEFAULT_STOP_REASON: &str = "Task stopped by user";

impl TaskEngine {
    /// Stops a task in two persisted phases around pod deletion.
    ///
    /// STOPPING is written before the pod is touched, so a crash in between leaves a
    /// visible in-flight stop instead of a task that silently keeps RUNNING. Stopping an
    /// already stopped task returns it as is.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster, task = ?req.task))]
    pub async fn stop_task(&self, req: StopTaskRequest) -> Result<Task, CoreError> {
        let id = req
            .task
            .as_deref()
            .filter(|s| !s.is_empty())
            .ok_or_else(|| CoreError::validation("task is required"))?;
        let cluster = self.resolve_cluster(req.cluster.as_deref()).await?;
        let task_arn = self.qualify_task_arn(&cluster, id);

        let task = self.store.tasks().get(&cluster.cluster_arn, &task_arn).await?;
        if task.last_status.is_terminal() {
            return Ok(task);
        }

        let reason = req.reason.unwrap_or_else(|| DEFAULT_STOP_REASON.to_string());
        let now = self.clock.now();
        let stopping = mutate_task(self.store.tasks(), task, |t| {
            if t.last_status.is_terminal() {
                return;
            }
            t.desired_status = TaskStatus::Stopped;
            if t.last_status.can_advance_to(TaskStatus::Stopping) {
                t.last_status = TaskStatus::Stopping;
            }
            t.stopping_at.get_or_insert(now);
            t.stop_code.get_or_insert(StopCode::UserInitiated);
            if t.stopped_reason.is_none() {
                t.stopped_reason = Some(reason.clone());
            }
        })
        .await?;

        if stopping.last_status.is_terminal() {
            return Ok(stopping);
        }

        let stopped = self.finish_stop(&cluster, stopping).await?;

        info!(task = %stopped.task_arn, reason = ?stopped.stopped_reason, "task stopped");
        Ok(stopped)
    }

    /// Deletes the pod of a STOPPING task and records it as STOPPED.
    ///
    /// Deletion errors other than not-found are logged and the stop still completes.
    pub(super) async fn finish_stop(&self, cluster: &Cluster, stopping: Task) -> Result<Task, CoreError> {
        match self.runtime.delete(cluster, &stopping).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => warn!(task = %stopping.task_arn, error = %e, "pod deletion failed; completing stop locally"),
        }

        let now = self.clock.now();
        let stopped = mutate_task(self.store.tasks(), stopping, |t| complete_stop(t, now)).await?;
        Ok(stopped)
    }
}

fn complete_stop(t: &mut Task, now: OffsetDateTime) {
    t.last_status = TaskStatus::Stopped;
    t.desired_status = TaskStatus::Stopped;
    t.stopped_at.get_or_insert(now);
    t.execution_stopped_at.get_or_insert(now);
    for c in &mut t.containers {
        c.last_status = TaskStatus::Stopped;
    }
}
