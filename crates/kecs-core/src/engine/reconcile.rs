use time::OffsetDateTime;
use tracing::{debug, info, warn};

use kecs_model::{Cluster, HealthStatus, StopCode, Task, TaskFilter, TaskStatus};

use super::TaskEngine;
use crate::{
    error::CoreError,
    runtime::{ContainerState, PodObservation, PodPhase},
    store::mutate_task,
};

const REASON_POD_NOT_FOUND: &str = "Pod not found";
const REASON_SUCCEEDED: &str = "Task completed successfully";
const REASON_FAILED: &str = "Task failed";

/// Page size used when walking a cluster's tasks.
const SYNC_PAGE: usize = 500;

/// Folds one pod observation into a task record.
///
/// `None` means the pod is gone. Status only ever moves forward; a task already STOPPED
/// is left untouched.
pub fn apply_observation(task: &mut Task, observed: Option<&PodObservation>, now: OffsetDateTime) {
    if task.last_status.is_terminal() {
        return;
    }

    let Some(obs) = observed else {
        let code = if task.started_at.is_none() {
            StopCode::TaskFailedToStart
        } else {
            StopCode::EssentialContainerExited
        };
        mark_stopped(task, now, code, REASON_POD_NOT_FOUND);
        return;
    };

    apply_containers(task, obs);

    match obs.phase {
        PodPhase::Pending => {
            advance(task, TaskStatus::Pending);
        }
        PodPhase::Running => {
            if advance(task, TaskStatus::Running) {
                task.started_at.get_or_insert(obs.started_at.unwrap_or(now));
                task.pull_started_at.get_or_insert(now);
                task.pull_stopped_at.get_or_insert(now);
                for c in &mut task.containers {
                    if c.last_status.can_advance_to(TaskStatus::Running) {
                        c.last_status = TaskStatus::Running;
                    }
                }
            }
        }
        PodPhase::Succeeded | PodPhase::Failed => {
            let fallback = if obs.phase == PodPhase::Succeeded {
                REASON_SUCCEEDED
            } else {
                REASON_FAILED
            };
            let reason = match task.essential_exit_code() {
                Some(0) => REASON_SUCCEEDED.to_string(),
                Some(code) => format!("Essential container exited with code {code}"),
                None => obs.reason.clone().unwrap_or_else(|| fallback.to_string()),
            };
            mark_stopped(task, now, StopCode::EssentialContainerExited, &reason);
        }
        PodPhase::Unknown => {}
    }
}

/// Moves `task.last_status` to `next` if that is a step forward.
fn advance(task: &mut Task, next: TaskStatus) -> bool {
    if task.last_status.can_advance_to(next) {
        task.last_status = next;
        true
    } else {
        false
    }
}

fn apply_containers(task: &mut Task, obs: &PodObservation) {
    for c in &mut task.containers {
        let Some(seen) = obs.container(&c.name) else {
            continue;
        };
        match &seen.state {
            ContainerState::Waiting => {}
            ContainerState::Running => {
                if c.last_status.can_advance_to(TaskStatus::Running) {
                    c.last_status = TaskStatus::Running;
                }
            }
            ContainerState::Terminated { exit_code, reason } => {
                c.last_status = TaskStatus::Stopped;
                c.exit_code.get_or_insert(*exit_code);
                if c.reason.is_none() {
                    c.reason = reason.clone();
                }
            }
        }
        if seen.health.is_some() {
            c.health_status = seen.health;
        }
    }

    task.health_status = HealthStatus::aggregate(
        task.containers
            .iter()
            .filter(|c| c.is_essential())
            .map(|c| c.health_status.unwrap_or_default()),
    );
}

fn mark_stopped(task: &mut Task, now: OffsetDateTime, code: StopCode, reason: &str) {
    task.last_status = TaskStatus::Stopped;
    task.desired_status = TaskStatus::Stopped;
    task.stopped_at.get_or_insert(now);
    task.execution_stopped_at.get_or_insert(now);
    task.stop_code.get_or_insert(code);
    if task.stopped_reason.is_none() {
        task.stopped_reason = Some(reason.to_string());
    }
    for c in &mut task.containers {
        c.last_status = TaskStatus::Stopped;
    }
}

impl TaskEngine {
    /// Reconciles one task against its pod and persists any change.
    ///
    /// Runtime errors other than "pod not found" leave the stored task as it was.
    pub(crate) async fn reconcile(&self, cluster: &Cluster, task: Task) -> Task {
        if task.last_status.is_terminal() {
            return task;
        }

        // A stop that never got past its first write is finished here, whatever the pod says.
        if task.last_status == TaskStatus::Stopping && task.desired_status == TaskStatus::Stopped {
            let arn = task.task_arn.clone();
            return match self.finish_stop(cluster, task.clone()).await {
                Ok(stopped) => {
                    info!(task = %arn, "interrupted stop completed");
                    stopped
                }
                Err(e) => {
                    warn!(task = %arn, error = %e, "failed to complete interrupted stop");
                    task
                }
            };
        }

        let observed = match self.runtime.observe(cluster, &task).await {
            Ok(obs) => Some(obs),
            Err(e) if e.is_not_found() => None,
            Err(e) => {
                warn!(task = %task.task_arn, error = %e, "pod observation failed; keeping stored status");
                return task;
            }
        };

        let now = self.clock.now();
        let before = task.last_status;
        match mutate_task(self.store.tasks(), task.clone(), |t| {
            apply_observation(t, observed.as_ref(), now)
        })
        .await
        {
            Ok(updated) => {
                if updated.last_status != before {
                    info!(
                        task = %updated.task_arn,
                        from = %before,
                        to = %updated.last_status,
                        "task status changed"
                    );
                }
                updated
            }
            Err(e) => {
                warn!(task = %task.task_arn, error = %e, "failed to persist reconciled task");
                task
            }
        }
    }

    /// Reconciles every non-terminal task in `cluster`. Returns how many changed status.
    pub async fn reconcile_cluster(&self, cluster: &Cluster) -> Result<usize, CoreError> {
        let mut offset = 0;
        let mut pending = Vec::new();
        loop {
            let filter = TaskFilter::new().with_limit(SYNC_PAGE).with_offset(offset);
            let page = self.store.tasks().list(&cluster.cluster_arn, &filter).await?;
            let next = page.next_offset(offset);
            pending.extend(page.items.into_iter().filter(|t| !t.last_status.is_terminal()));
            match next {
                Some(n) => offset = n,
                None => break,
            }
        }

        let mut changed = 0;
        for task in pending {
            let before = task.last_status;
            if self.reconcile(cluster, task).await.last_status != before {
                changed += 1;
            }
        }
        debug!(cluster = %cluster.cluster_name, changed, "cluster reconciled");
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use kecs_model::{ContainerStatus, LaunchType};
    use time::Duration;

    use super::*;
    use crate::runtime::ContainerObservation;

    fn now() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn task() -> Task {
        let task_arn = "arn:aws:ecs:us-east-1:000000000000:task/default/t1".to_string();
        Task {
            containers: vec![ContainerStatus {
                name: "app".into(),
                image: Some("busybox".into()),
                container_arn: format!("{task_arn}/container/app"),
                task_arn: task_arn.clone(),
                last_status: TaskStatus::Pending,
                exit_code: None,
                reason: None,
                essential: Some(true),
                cpu: None,
                memory: None,
                health_status: None,
            }],
            task_arn,
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            task_definition_arn: "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1".into(),
            container_instance_arn: None,
            last_status: TaskStatus::Provisioning,
            desired_status: TaskStatus::Running,
            launch_type: LaunchType::Fargate,
            cpu: None,
            memory: None,
            group: None,
            started_by: None,
            overrides: None,
            tags: vec![],
            stop_code: None,
            stopped_reason: None,
            health_status: HealthStatus::Unknown,
            pod_name: Some("t1".into()),
            namespace: Some("default-us-east-1".into()),
            version: 1,
            created_at: now(),
            started_at: None,
            pull_started_at: None,
            pull_stopped_at: None,
            stopping_at: None,
            stopped_at: None,
            execution_stopped_at: None,
        }
    }

    fn terminated(code: i32) -> PodObservation {
        PodObservation::new(PodPhase::Failed).with_container(ContainerObservation {
            name: "app".into(),
            state: ContainerState::Terminated {
                exit_code: code,
                reason: Some("Error".into()),
            },
            health: None,
        })
    }

    #[test]
    fn running_sets_start_time_once() {
        let mut t = task();
        let started = now() - Duration::seconds(3);
        let obs = PodObservation::new(PodPhase::Running).with_started_at(started);

        apply_observation(&mut t, Some(&obs), now());
        assert_eq!(t.last_status, TaskStatus::Running);
        assert_eq!(t.started_at, Some(started));
        assert_eq!(t.containers[0].last_status, TaskStatus::Running);

        apply_observation(&mut t, Some(&obs.clone().with_started_at(now())), now());
        assert_eq!(t.started_at, Some(started));
    }

    #[test]
    fn pending_pod_moves_provisioning_forward() {
        let mut t = task();
        apply_observation(&mut t, Some(&PodObservation::new(PodPhase::Pending)), now());
        assert_eq!(t.last_status, TaskStatus::Pending);
        assert!(t.started_at.is_none());
    }

    #[test]
    fn essential_exit_code_drives_reason() {
        let mut t = task();
        apply_observation(&mut t, Some(&terminated(1)), now());

        assert_eq!(t.last_status, TaskStatus::Stopped);
        assert_eq!(t.desired_status, TaskStatus::Stopped);
        assert_eq!(t.stop_code, Some(StopCode::EssentialContainerExited));
        assert_eq!(t.containers[0].exit_code, Some(1));
        assert_eq!(t.stopped_reason.as_deref(), Some("Essential container exited with code 1"));
        assert_eq!(t.stopped_at, Some(now()));
    }

    #[test]
    fn missing_pod_stops_task() {
        let mut t = task();
        apply_observation(&mut t, None, now());
        assert_eq!(t.last_status, TaskStatus::Stopped);
        assert_eq!(t.stopped_reason.as_deref(), Some("Pod not found"));
        assert_eq!(t.stop_code, Some(StopCode::TaskFailedToStart));
    }

    #[test]
    fn status_never_regresses() {
        let mut t = task();
        t.last_status = TaskStatus::Stopping;
        t.desired_status = TaskStatus::Stopped;

        let before = t.clone();
        apply_observation(&mut t, Some(&PodObservation::new(PodPhase::Running)), now());
        assert_eq!(t, before);
    }

    #[test]
    fn stopped_reason_is_not_overwritten() {
        let mut t = task();
        t.last_status = TaskStatus::Stopping;
        t.stopped_reason = Some("Task stopped by user".into());

        apply_observation(&mut t, None, now());
        assert_eq!(t.last_status, TaskStatus::Stopped);
        assert_eq!(t.stopped_reason.as_deref(), Some("Task stopped by user"));
    }

    #[test]
    fn succeeded_without_exit_codes_uses_default_reason() {
        let mut t = task();
        t.containers.clear();
        apply_observation(&mut t, Some(&PodObservation::new(PodPhase::Succeeded)), now());
        assert_eq!(t.stopped_reason.as_deref(), Some("Task completed successfully"));
    }
}
