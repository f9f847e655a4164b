use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use kecs_model::{
    Cluster, ContainerDefinition, ContainerStatus, Failure, HealthStatus, LaunchType, NetworkConfiguration,
    Tag, Task, TaskDefinition, TaskOverride, TaskStatus,
    api::{RunTaskRequest, RunTaskResponse, StartTaskRequest, StartTaskResponse},
    arn,
};

use super::TaskEngine;
use crate::{
    convert::{PodRequest, convert_task_to_pod, parse_definitions},
    error::CoreError,
    secret::collect_secrets,
};

const MAX_COUNT: i32 = 10;
const MAX_CONTAINER_CPU: i64 = 10_000;
const MAX_CONTAINER_MEMORY_MIB: i64 = 65_536;

/// Everything a single replica launch needs, shared across replicas of one request.
struct LaunchPlan<'a> {
    cluster: &'a Cluster,
    task_def: &'a TaskDefinition,
    launch_type: LaunchType,
    container_instance: Option<&'a str>,
    group: Option<&'a str>,
    started_by: Option<&'a str>,
    overrides: Option<&'a TaskOverride>,
    network: Option<&'a NetworkConfiguration>,
    tags: &'a [Tag],
}

impl TaskEngine {
    /// Launches `count` independent tasks. Replica failures are reported, never fatal.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster, task_definition = ?req.task_definition))]
    pub async fn run_task(&self, req: RunTaskRequest) -> Result<RunTaskResponse, CoreError> {
        let td_ref = required_task_definition(req.task_definition.as_deref())?;
        let count = req.count.unwrap_or(1);
        if !(1..=MAX_COUNT).contains(&count) {
            return Err(CoreError::validation(format!(
                "count must be between 1 and {MAX_COUNT}, got {count}"
            )));
        }

        let cluster = self.resolve_cluster(req.cluster.as_deref()).await?;
        let task_def = self.resolve_task_definition(td_ref).await?;
        self.provision_detached(&cluster);

        let plan = LaunchPlan {
            cluster: &cluster,
            task_def: &task_def,
            launch_type: req.launch_type.unwrap_or_default(),
            container_instance: None,
            group: req.group.as_deref(),
            started_by: req.started_by.as_deref(),
            overrides: req.overrides.as_ref(),
            network: req.network_configuration.as_ref(),
            tags: &req.tags,
        };

        let mut resp = RunTaskResponse::default();
        for _ in 0..count {
            match self.launch_replica(&plan).await {
                Ok(task) => resp.tasks.push(task),
                Err(failure) => resp.failures.push(failure),
            }
        }

        info!(
            cluster = %cluster.cluster_name,
            task_definition = %task_def.family_revision(),
            launched = resp.tasks.len(),
            failed = resp.failures.len(),
            "run task finished"
        );
        Ok(resp)
    }

    /// Starts one EC2 task per listed container instance.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster, task_definition = ?req.task_definition))]
    pub async fn start_task(&self, req: StartTaskRequest) -> Result<StartTaskResponse, CoreError> {
        let td_ref = required_task_definition(req.task_definition.as_deref())?;
        if req.container_instances.is_empty() {
            return Err(CoreError::validation("containerInstances must not be empty"));
        }
        if req.container_instances.len() > MAX_COUNT as usize {
            return Err(CoreError::validation(format!(
                "at most {MAX_COUNT} container instances per call"
            )));
        }

        let cluster = self.resolve_cluster(req.cluster.as_deref()).await?;
        let task_def = self.resolve_task_definition(td_ref).await?;
        self.provision_detached(&cluster);

        let mut resp = StartTaskResponse::default();
        for instance in &req.container_instances {
            let plan = LaunchPlan {
                cluster: &cluster,
                task_def: &task_def,
                launch_type: LaunchType::Ec2,
                container_instance: Some(instance),
                group: req.group.as_deref(),
                started_by: req.started_by.as_deref(),
                overrides: req.overrides.as_ref(),
                network: req.network_configuration.as_ref(),
                tags: &req.tags,
            };
            match self.launch_replica(&plan).await {
                Ok(task) => resp.tasks.push(task),
                Err(mut failure) => {
                    failure.arn = instance.clone();
                    resp.failures.push(failure);
                }
            }
        }
        Ok(resp)
    }

    /// Converts, launches and persists one task instance.
    ///
    /// The pod is created before the record is stored; if storing fails the pod is
    /// removed again so nothing runs untracked.
    async fn launch_replica(&self, plan: &LaunchPlan<'_>) -> Result<Task, Failure> {
        let cluster = plan.cluster;
        let task_id = Uuid::new_v4().to_string();
        let task_arn = arn::task_arn(&cluster.region, &cluster.account_id, &cluster.cluster_name, &task_id);

        let defs = parse_definitions(plan.task_def)
            .map_err(|e| Failure::internal(&task_arn, format!("Failed to convert task: {e}")))?;

        if self.config.resource_guard {
            check_resources(&task_arn, &defs, plan.overrides)?;
        }

        let request = PodRequest {
            launch_type: plan.launch_type,
            overrides: plan.overrides,
            tags: plan.tags,
            network: plan.network,
        };
        let pod = convert_task_to_pod(plan.task_def, &request, cluster, &task_id)
            .map_err(|e| Failure::internal(&task_arn, format!("Failed to convert task: {e}")))?;

        let secrets = collect_secrets(&defs);
        self.runtime
            .launch(cluster, &pod, &secrets)
            .await
            .map_err(|e| Failure::internal(&task_arn, format!("Failed to create pod: {e}")))?;

        let task = self.new_task(plan, &task_id, task_arn, &defs);

        if let Err(e) = self.store.tasks().create(task.clone()).await {
            warn!(task = %task.task_arn, error = %e, "failed to store task; deleting pod");
            if let Err(del) = self.runtime.delete(cluster, &task).await
                && !del.is_not_found()
            {
                warn!(task = %task.task_arn, error = %del, "failed to delete orphaned pod");
            }
            return Err(Failure::internal(&task.task_arn, format!("Failed to store task: {e}")));
        }

        debug!(task = %task.task_arn, runtime = self.runtime.name(), "task launched");
        Ok(task)
    }

    fn new_task(&self, plan: &LaunchPlan<'_>, task_id: &str, task_arn: String, defs: &[ContainerDefinition]) -> Task {
        let containers = defs
            .iter()
            .map(|def| {
                let name = def.name.clone().unwrap_or_default();
                ContainerStatus {
                    container_arn: arn::container_arn(&task_arn, &name),
                    name,
                    image: def.image.clone(),
                    task_arn: task_arn.clone(),
                    last_status: TaskStatus::Pending,
                    exit_code: None,
                    reason: None,
                    essential: Some(def.is_essential()),
                    cpu: def.cpu.map(|c| c.to_string()),
                    memory: def.memory.map(|m| m.to_string()),
                    health_status: None,
                }
            })
            .collect();

        let overrides = plan.overrides;
        Task {
            task_arn,
            cluster_arn: plan.cluster.cluster_arn.clone(),
            task_definition_arn: plan.task_def.task_definition_arn.clone(),
            container_instance_arn: plan.container_instance.map(str::to_string),
            last_status: TaskStatus::Provisioning,
            desired_status: TaskStatus::Running,
            launch_type: plan.launch_type,
            cpu: overrides
                .and_then(|o| o.cpu.clone())
                .or_else(|| plan.task_def.cpu.clone()),
            memory: overrides
                .and_then(|o| o.memory.clone())
                .or_else(|| plan.task_def.memory.clone()),
            containers,
            group: plan.group.map(str::to_string),
            started_by: plan.started_by.map(str::to_string),
            overrides: overrides.cloned(),
            tags: plan.tags.to_vec(),
            stop_code: None,
            stopped_reason: None,
            health_status: HealthStatus::Unknown,
            pod_name: Some(task_id.to_string()),
            namespace: Some(plan.cluster.namespace()),
            version: 1,
            created_at: self.clock.now(),
            started_at: None,
            pull_started_at: None,
            pull_stopped_at: None,
            stopping_at: None,
            stopped_at: None,
            execution_stopped_at: None,
        }
    }
}

fn required_task_definition(raw: Option<&str>) -> Result<&str, CoreError> {
    raw.filter(|s| !s.is_empty())
        .ok_or_else(|| CoreError::validation("taskDefinition is required"))
}

/// Refuses containers whose effective CPU or memory exceed the fixed ceilings.
fn check_resources(
    task_arn: &str,
    defs: &[ContainerDefinition],
    overrides: Option<&TaskOverride>,
) -> Result<(), Failure> {
    for def in defs {
        let co = overrides.and_then(|o| {
            o.container_overrides
                .iter()
                .find(|co| co.name.is_some() && co.name == def.name)
        });

        let cpu = co.and_then(|c| c.cpu).or(def.cpu).unwrap_or(0);
        if cpu > MAX_CONTAINER_CPU {
            return Err(Failure::new(
                task_arn,
                Failure::RESOURCE_CPU,
                format!("CPU request too high: {cpu}"),
            ));
        }

        let memory = co
            .and_then(|c| c.memory.or(c.memory_reservation))
            .or(def.memory)
            .or(def.memory_reservation)
            .unwrap_or(0);
        if memory > MAX_CONTAINER_MEMORY_MIB {
            return Err(Failure::new(
                task_arn,
                Failure::RESOURCE_MEMORY,
                format!("Memory request too high: {memory} MB"),
            ));
        }
    }
    Ok(())
}
