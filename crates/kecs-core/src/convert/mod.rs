//! ECS task definition -> Kubernetes pod conversion.
//!
//! One task instance becomes one pod; every container definition lands in that pod's
//! container list. Conversion is pure: the same inputs, task id included, always yield an
//! equal pod (ordered maps, no clock, no randomness).

mod container;
mod labels;
mod resources;

pub use labels::{sanitize_label_key, sanitize_label_value};
pub use resources::{parse_task_cpu, parse_task_memory};

use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Pod, PodSpec},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use thiserror::Error;

use kecs_model::{
    Cluster, ContainerDefinition, LaunchType, NetworkConfiguration, Tag, TaskDefinition, TaskOverride,
    annotations, arn, labels as label_keys,
};

use container::ContainerDraft;

/// Suffix appended to the pod container name of a non-essential ECS container.
pub const NONESSENTIAL_SUFFIX: &str = "-nonessential";

const DEFAULT_NETWORK_MODE: &str = "awsvpc";

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("invalid container definitions: {0}")]
    InvalidDefinitions(String),

    #[error("task definition has no container definitions")]
    EmptyDefinitions,

    #[error("container definition {index} is missing {field}")]
    MissingField { index: usize, field: &'static str },
}

/// Per-launch inputs that shape the pod beyond the task definition itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct PodRequest<'a> {
    pub launch_type: LaunchType,
    pub overrides: Option<&'a TaskOverride>,
    pub tags: &'a [Tag],
    pub network: Option<&'a NetworkConfiguration>,
}

/// Parses the container definitions JSON blob of a task definition.
pub fn parse_definitions(task_def: &TaskDefinition) -> Result<Vec<ContainerDefinition>, ConvertError> {
    let defs: Vec<ContainerDefinition> = serde_json::from_str(&task_def.container_definitions)
        .map_err(|e| ConvertError::InvalidDefinitions(e.to_string()))?;
    if defs.is_empty() {
        return Err(ConvertError::EmptyDefinitions);
    }
    Ok(defs)
}

/// ECS container name for a pod container name.
pub fn ecs_container_name(pod_container: &str) -> &str {
    pod_container
        .strip_suffix(NONESSENTIAL_SUFFIX)
        .unwrap_or(pod_container)
}

/// Builds the pod for one task instance.
pub fn convert_task_to_pod(
    task_def: &TaskDefinition,
    request: &PodRequest<'_>,
    cluster: &Cluster,
    task_id: &str,
) -> Result<Pod, ConvertError> {
    let defs = parse_definitions(task_def)?;
    let overrides = request.overrides;

    let mut drafts = defs
        .iter()
        .enumerate()
        .map(|(index, def)| ContainerDraft::from_definition(index, def))
        .collect::<Result<Vec<_>, _>>()?;

    if let Some(overrides) = overrides {
        for draft in &mut drafts {
            for co in &overrides.container_overrides {
                if co.name.as_deref() == Some(draft.ecs_name()) {
                    draft.apply_override(co);
                }
            }
        }
    }

    let task_cpu = task_def.cpu.as_deref().and_then(parse_task_cpu);
    let task_memory = task_def.memory.as_deref().and_then(parse_task_memory);
    resources::apply_task_limits(&mut drafts, task_cpu, task_memory);

    if let Some(overrides) = overrides {
        let cpu = overrides.cpu.as_deref().and_then(parse_task_cpu);
        if cpu.is_some() {
            resources::apply_task_limits(&mut drafts, cpu, None);
        }
        let memory = overrides.memory.as_deref().and_then(parse_task_memory);
        if memory.is_some() {
            resources::apply_task_limits(&mut drafts, None, memory);
        }
    }

    let network_mode = task_def
        .network_mode
        .as_deref()
        .filter(|m| !m.is_empty())
        .unwrap_or(DEFAULT_NETWORK_MODE);

    let spec = PodSpec {
        containers: drafts.into_iter().map(ContainerDraft::render).collect(),
        restart_policy: Some("Never".to_string()),
        host_network: (network_mode == "host").then_some(true),
        ..Default::default()
    };

    let metadata = ObjectMeta {
        name: Some(task_id.to_string()),
        namespace: Some(cluster.namespace()),
        labels: Some(pod_labels(task_def, request, cluster, task_id)),
        annotations: Some(pod_annotations(task_def, request, cluster, task_id, network_mode, &defs)),
        ..Default::default()
    };

    Ok(Pod {
        metadata,
        spec: Some(spec),
        status: None,
    })
}

fn pod_labels(
    task_def: &TaskDefinition,
    request: &PodRequest<'_>,
    cluster: &Cluster,
    task_id: &str,
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::from([
        (label_keys::CLUSTER.to_string(), cluster.cluster_name.clone()),
        (label_keys::TASK_ID.to_string(), task_id.to_string()),
        (label_keys::TASK_FAMILY.to_string(), task_def.family.clone()),
        (label_keys::TASK_REVISION.to_string(), task_def.revision.to_string()),
        (label_keys::LAUNCH_TYPE.to_string(), request.launch_type.to_string()),
        (
            label_keys::MANAGED_BY.to_string(),
            label_keys::MANAGED_BY_VALUE.to_string(),
        ),
    ]);

    for tag in request.tags {
        let key = sanitize_label_key(&format!("tag.{}", tag.key));
        if tag.key.is_empty() || key.is_empty() {
            continue;
        }
        out.insert(key, sanitize_label_value(&tag.value));
    }
    out
}

fn pod_annotations(
    task_def: &TaskDefinition,
    request: &PodRequest<'_>,
    cluster: &Cluster,
    task_id: &str,
    network_mode: &str,
    defs: &[ContainerDefinition],
) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    out.insert(
        annotations::TASK_ARN.to_string(),
        arn::task_arn(&cluster.region, &cluster.account_id, &cluster.cluster_name, task_id),
    );
    out.insert(
        annotations::TASK_DEFINITION_ARN.to_string(),
        task_def.task_definition_arn.clone(),
    );
    out.insert(annotations::NETWORK_MODE.to_string(), network_mode.to_string());

    if let Some(vpc) = request.network.and_then(|n| n.awsvpc_configuration.as_ref()) {
        if !vpc.subnets.is_empty() {
            out.insert(annotations::SUBNETS.to_string(), vpc.subnets.join(","));
        }
        if !vpc.security_groups.is_empty() {
            out.insert(annotations::SECURITY_GROUPS.to_string(), vpc.security_groups.join(","));
        }
        if let Some(assign) = &vpc.assign_public_ip {
            out.insert(annotations::ASSIGN_PUBLIC_IP.to_string(), assign.clone());
        }
    }

    if let Some(role) = task_def.execution_role_arn.as_ref().filter(|r| !r.is_empty()) {
        out.insert(annotations::EXECUTION_ROLE_ARN.to_string(), role.clone());
    }
    if let Some(overrides) = request.overrides {
        if let Some(role) = &overrides.task_role_arn {
            out.insert(annotations::TASK_ROLE_ARN.to_string(), role.clone());
        }
        if let Some(role) = &overrides.execution_role_arn {
            out.insert(annotations::EXECUTION_ROLE_ARN.to_string(), role.clone());
        }
    }

    let mut index = 0;
    for def in defs {
        let container = def.name.as_deref().unwrap_or_default();
        for secret in &def.secrets {
            out.insert(
                annotations::secret_arn(index),
                format!("{container}:{}:{}", secret.name, secret.value_from),
            );
            index += 1;
        }
    }
    if index > 0 {
        out.insert(annotations::SECRET_COUNT.to_string(), index.to_string());
    }
    out
}
