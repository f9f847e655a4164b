use std::sync::Arc;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

use kecs_model::{Cluster, Task, TaskStatus};

use super::Periodic;
use crate::{
    clock::Clock,
    config::CleanupConfig,
    runtime::TaskRuntime,
    store::{Storage, StoreError},
};

/// Counts removed by one sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub tasks: usize,
    pub services: usize,
    pub container_instances: usize,
    pub task_sets: usize,
    pub logs: usize,
    /// Clusters whose sweep hit a storage error.
    pub failed_clusters: usize,
}

impl CleanupReport {
    pub fn total(&self) -> usize {
        self.tasks + self.services + self.container_instances + self.task_sets + self.logs
    }

    fn absorb(&mut self, other: CleanupReport) {
        self.tasks += other.tasks;
        self.services += other.services;
        self.container_instances += other.container_instances;
        self.task_sets += other.task_sets;
        self.logs += other.logs;
    }
}

/// Periodically deletes terminal resources that outlived their retention window.
pub struct CleanupWorker {
    store: Arc<dyn Storage>,
    clock: Arc<dyn Clock>,
    config: CleanupConfig,
    /// When set, pods left behind by swept tasks are deleted too.
    runtime: Option<Arc<dyn TaskRuntime>>,
    runner: Periodic,
}

impl CleanupWorker {
    pub fn new(store: Arc<dyn Storage>, clock: Arc<dyn Clock>, config: CleanupConfig) -> Self {
        Self {
            store,
            clock,
            config,
            runtime: None,
            runner: Periodic::new("cleanup"),
        }
    }

    pub fn with_runtime(mut self, runtime: Arc<dyn TaskRuntime>) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Starts the sweep loop. Does nothing when cleanup is disabled.
    pub fn start(self: &Arc<Self>) -> bool {
        if !self.config.enabled {
            info!("resource cleanup disabled");
            return false;
        }
        let worker = Arc::clone(self);
        self.runner.spawn(self.config.interval(), move || {
            let worker = Arc::clone(&worker);
            async move {
                worker.sweep().await;
            }
        })
    }

    pub async fn stop(&self) {
        self.runner.stop().await;
    }

    pub fn is_running(&self) -> bool {
        self.runner.is_running()
    }

    /// Runs one sweep over every cluster.
    pub async fn sweep(&self) -> CleanupReport {
        let mut report = CleanupReport::default();

        let clusters = match self.store.clusters().list().await {
            Ok(clusters) => clusters,
            Err(e) => {
                warn!(error = %e, "cleanup: failed to list clusters");
                return report;
            }
        };

        let now = self.clock.now();
        for cluster in &clusters {
            match self.sweep_cluster(cluster, now).await {
                Ok(counts) => report.absorb(counts),
                Err(e) => {
                    warn!(cluster = %cluster.cluster_name, error = %e, "cleanup: cluster sweep failed");
                    report.failed_clusters += 1;
                }
            }
        }

        if report.total() > 0 {
            info!(
                tasks = report.tasks,
                services = report.services,
                container_instances = report.container_instances,
                task_sets = report.task_sets,
                "cleanup sweep removed expired resources"
            );
        } else {
            debug!(clusters = clusters.len(), "cleanup sweep found nothing to remove");
        }
        report
    }

    async fn sweep_cluster(&self, cluster: &Cluster, now: OffsetDateTime) -> Result<CleanupReport, StoreError> {
        let arn = &cluster.cluster_arn;
        let cfg = &self.config;
        let mut counts = CleanupReport::default();

        // DEPROVISIONING is swept too: a lost deletion event must not keep a task forever.
        let task_cutoff = now - cfg.task_retention();
        for status in [TaskStatus::Stopped, TaskStatus::Deprovisioning] {
            let removed = self
                .store
                .tasks()
                .delete_older_than(arn, task_cutoff, status)
                .await?;
            counts.tasks += removed.len();
            self.release_pods(cluster, &removed).await;
        }

        counts.services = self
            .store
            .services()
            .delete_marked_for_deletion(arn, now - cfg.service_retention())
            .await?;
        counts.container_instances = self
            .store
            .container_instances()
            .delete_stale(arn, now - cfg.container_instance_retention())
            .await?;
        counts.task_sets = self.store.task_sets().delete_orphaned(arn).await?;

        // Task logs live with the pods; nothing is retained here yet.
        counts.logs = 0;

        Ok(counts)
    }

    async fn release_pods(&self, cluster: &Cluster, tasks: &[Task]) {
        let Some(runtime) = &self.runtime else {
            return;
        };
        for task in tasks {
            match runtime.delete(cluster, task).await {
                Ok(()) => debug!(task = %task.task_arn, "cleanup: removed leftover pod"),
                Err(e) if e.is_not_found() => {}
                Err(e) => warn!(task = %task.task_arn, error = %e, "cleanup: failed to remove leftover pod"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use kecs_model::{HealthStatus, LaunchType, Task};

    use super::*;
    use crate::{clock::ManualClock, store::MemoryStore};

    const CLUSTER_ARN: &str = "arn:aws:ecs:us-east-1:000000000000:cluster/default";

    fn start() -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap()
    }

    fn stopped_task(id: &str, stopped_at: OffsetDateTime) -> Task {
        Task {
            task_arn: format!("arn:aws:ecs:us-east-1:000000000000:task/default/{id}"),
            cluster_arn: CLUSTER_ARN.into(),
            task_definition_arn: "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1".into(),
            container_instance_arn: None,
            last_status: TaskStatus::Stopped,
            desired_status: TaskStatus::Stopped,
            launch_type: LaunchType::Fargate,
            cpu: None,
            memory: None,
            containers: vec![],
            group: None,
            started_by: None,
            overrides: None,
            tags: vec![],
            stop_code: None,
            stopped_reason: None,
            health_status: HealthStatus::Unknown,
            pod_name: None,
            namespace: None,
            version: 3,
            created_at: stopped_at,
            started_at: None,
            pull_started_at: None,
            pull_stopped_at: None,
            stopping_at: None,
            stopped_at: Some(stopped_at),
            execution_stopped_at: Some(stopped_at),
        }
    }

    async fn seeded() -> (Arc<MemoryStore>, ManualClock) {
        let store = Arc::new(MemoryStore::new());
        store
            .clusters()
            .create(Cluster {
                cluster_name: "default".into(),
                cluster_arn: CLUSTER_ARN.into(),
                status: "ACTIVE".into(),
                region: "us-east-1".into(),
                account_id: "000000000000".into(),
                backing_cluster: None,
                created_at: start(),
            })
            .await
            .unwrap();
        (store, ManualClock::new(start()))
    }

    #[tokio::test]
    async fn sweep_removes_only_expired_tasks() {
        let (store, clock) = seeded().await;
        store.tasks().create(stopped_task("old", start())).await.unwrap();
        store
            .tasks()
            .create(stopped_task("young", start() + time::Duration::minutes(90)))
            .await
            .unwrap();

        clock.advance(Duration::from_secs(2 * 3600));
        let worker = CleanupWorker::new(store.clone(), Arc::new(clock.clone()), CleanupConfig::default());

        let first = worker.sweep().await;
        assert_eq!(first.tasks, 1);
        assert_eq!(first.failed_clusters, 0);

        let second = worker.sweep().await;
        assert_eq!(second.total(), 0);
    }

    #[tokio::test]
    async fn deprovisioning_tasks_are_swept() {
        let (store, clock) = seeded().await;
        let mut stuck = stopped_task("stuck", start());
        stuck.last_status = TaskStatus::Deprovisioning;
        store.tasks().create(stuck).await.unwrap();

        clock.advance(Duration::from_secs(3601));
        let worker = CleanupWorker::new(store.clone(), Arc::new(clock), CleanupConfig::default());
        assert_eq!(worker.sweep().await.tasks, 1);
    }

    #[tokio::test]
    async fn disabled_worker_never_starts() {
        let (store, clock) = seeded().await;
        let worker = Arc::new(CleanupWorker::new(store, Arc::new(clock), CleanupConfig::disabled()));
        assert!(!worker.start());
        assert!(!worker.is_running());
        worker.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let (store, clock) = seeded().await;
        let worker = Arc::new(CleanupWorker::new(store, Arc::new(clock), CleanupConfig::default()));
        assert!(worker.start());
        assert!(!worker.start());

        worker.stop().await;
        worker.stop().await;
        assert!(!worker.is_running());
    }
}
