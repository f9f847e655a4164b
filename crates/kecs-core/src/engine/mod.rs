//! Task engine: the ECS-facing task operations over a store and a runtime.

mod launch;
mod reconcile;
mod registry;
mod stop;

pub use reconcile::apply_observation;

use std::sync::Arc;

use tracing::{debug, instrument};

use kecs_model::{
    Cluster, Failure, TaskFilter, TaskStatus,
    api::{DescribeTasksRequest, DescribeTasksResponse, ListTasksRequest, ListTasksResponse},
    arn,
};

use crate::{
    clock::{Clock, SystemClock},
    config::EngineConfig,
    error::CoreError,
    runtime::TaskRuntime,
    store::Storage,
};

/// Largest page a ListTasks call returns.
const LIST_MAX_RESULTS: usize = 100;

/// Entry point for every task operation.
///
/// Cheap to share behind an `Arc`; all state lives in the store and the runtime.
pub struct TaskEngine {
    store: Arc<dyn Storage>,
    runtime: Arc<dyn TaskRuntime>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl TaskEngine {
    pub fn new(store: Arc<dyn Storage>, runtime: Arc<dyn TaskRuntime>, config: EngineConfig) -> Self {
        Self {
            store,
            runtime,
            clock: Arc::new(SystemClock),
            config,
        }
    }

    /// Replaces the wall clock, typically with a [`crate::ManualClock`].
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn store(&self) -> &Arc<dyn Storage> {
        &self.store
    }

    pub fn runtime(&self) -> &Arc<dyn TaskRuntime> {
        &self.runtime
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Looks up a cluster by name or ARN, falling back to the configured default.
    pub async fn resolve_cluster(&self, name_or_arn: Option<&str>) -> Result<Cluster, CoreError> {
        let raw = name_or_arn
            .filter(|s| !s.is_empty())
            .unwrap_or(self.config.default_cluster.as_str());
        let name = arn::cluster_name(raw);
        Ok(self.store.clusters().get(name).await?)
    }

    /// Expands a bare task id into the task ARN it has in `cluster`.
    pub(crate) fn qualify_task_arn(&self, cluster: &Cluster, id_or_arn: &str) -> String {
        if arn::is_arn(id_or_arn) {
            id_or_arn.to_string()
        } else {
            arn::task_arn(&cluster.region, &cluster.account_id, &cluster.cluster_name, id_or_arn)
        }
    }

    /// Returns the requested tasks, each reconciled once against its pod.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster, count = req.tasks.len()))]
    pub async fn describe_tasks(&self, req: DescribeTasksRequest) -> Result<DescribeTasksResponse, CoreError> {
        if req.tasks.is_empty() {
            return Err(CoreError::validation("tasks must not be empty"));
        }
        let cluster = self.resolve_cluster(req.cluster.as_deref()).await?;

        let mut resp = DescribeTasksResponse::default();
        for id in &req.tasks {
            let task_arn = self.qualify_task_arn(&cluster, id);
            match self.store.tasks().get(&cluster.cluster_arn, &task_arn).await {
                Ok(task) => resp.tasks.push(self.reconcile(&cluster, task).await),
                Err(e) if e.is_not_found() => resp.failures.push(Failure::missing(task_arn)),
                Err(e) => resp.failures.push(Failure::internal(task_arn, e.to_string())),
            }
        }
        debug!(found = resp.tasks.len(), missing = resp.failures.len(), "described tasks");
        Ok(resp)
    }

    /// Lists task ARNs. `desiredStatus` defaults to RUNNING, as in ECS.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster))]
    pub async fn list_tasks(&self, req: ListTasksRequest) -> Result<ListTasksResponse, CoreError> {
        let cluster = self.resolve_cluster(req.cluster.as_deref()).await?;

        let offset = match req.next_token.as_deref() {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| CoreError::validation(format!("invalid nextToken: {token}")))?,
            None => 0,
        };
        let limit = req.max_results.unwrap_or(LIST_MAX_RESULTS).clamp(1, LIST_MAX_RESULTS);

        let mut filter = TaskFilter::new()
            .with_desired_status(req.desired_status.unwrap_or(TaskStatus::Running))
            .with_limit(limit)
            .with_offset(offset);
        if let Some(family) = req.family {
            filter = filter.with_family(family);
        }
        if let Some(started_by) = req.started_by {
            filter = filter.with_started_by(started_by);
        }
        if let Some(launch_type) = req.launch_type {
            filter = filter.with_launch_type(launch_type);
        }
        if let Some(ci) = req.container_instance {
            filter = filter.with_container_instance(ci);
        }

        let page = self.store.tasks().list(&cluster.cluster_arn, &filter).await?;
        let next_token = page.next_offset(offset).map(|n| n.to_string());

        Ok(ListTasksResponse {
            task_arns: page.items.into_iter().map(|t| t.task_arn).collect(),
            next_token,
        })
    }
}
