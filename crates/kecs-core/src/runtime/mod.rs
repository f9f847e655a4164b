//! Runtime seam between the engine and whatever actually runs pods.
//!
//! The engine never talks to Kubernetes directly. It hands a converted [`Pod`] to a
//! [`TaskRuntime`] and later asks it what the pod looks like. `kecs-exec` ships a live
//! Kubernetes runtime and a deterministic simulator.

use std::collections::BTreeMap;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use thiserror::Error;
use time::OffsetDateTime;

use kecs_model::{Cluster, HealthStatus, SecretInfo, Task};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },

    #[error("cannot access cluster {cluster}: {reason}")]
    ClusterAccess { cluster: String, reason: String },

    #[error("kubernetes api error: {0}")]
    Api(String),

    #[error("pod spec rejected: {0}")]
    Conversion(String),
}

impl RuntimeError {
    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, RuntimeError::PodNotFound { .. })
    }
}

/// Coarse pod phase as Kubernetes reports it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContainerState {
    Waiting,
    Running,
    Terminated { exit_code: i32, reason: Option<String> },
}

/// State of one container inside an observed pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerObservation {
    /// ECS container name (any `-nonessential` suffix already stripped).
    pub name: String,
    pub state: ContainerState,
    pub health: Option<HealthStatus>,
}

/// Snapshot of a task's backing pod.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodObservation {
    pub phase: PodPhase,
    pub started_at: Option<OffsetDateTime>,
    /// Pod-level status reason or message, if any.
    pub reason: Option<String>,
    pub containers: Vec<ContainerObservation>,
}

impl PodObservation {
    pub fn new(phase: PodPhase) -> Self {
        Self {
            phase,
            started_at: None,
            reason: None,
            containers: Vec::new(),
        }
    }

    pub fn with_started_at(mut self, at: OffsetDateTime) -> Self {
        self.started_at = Some(at);
        self
    }

    pub fn with_container(mut self, container: ContainerObservation) -> Self {
        self.containers.push(container);
        self
    }

    pub fn container(&self, name: &str) -> Option<&ContainerObservation> {
        self.containers.iter().find(|c| c.name == name)
    }
}

/// Capability to run, inspect and remove the pods that back ECS tasks.
#[async_trait]
pub trait TaskRuntime: Send + Sync + 'static {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Best-effort per-cluster setup right after the cluster is created.
    async fn provision(&self, _cluster: &Cluster) -> Result<(), RuntimeError> {
        Ok(())
    }

    /// Creates the pod, making sure its namespace and referenced secrets exist first.
    ///
    /// `secrets` is keyed by source ARN.
    async fn launch(
        &self,
        cluster: &Cluster,
        pod: &Pod,
        secrets: &BTreeMap<String, SecretInfo>,
    ) -> Result<(), RuntimeError>;

    /// Reports the current state of the task's pod.
    ///
    /// Fails with [`RuntimeError::PodNotFound`] once the pod is gone.
    async fn observe(&self, cluster: &Cluster, task: &Task) -> Result<PodObservation, RuntimeError>;

    /// Deletes the task's pod. A pod that is already gone yields `PodNotFound`.
    async fn delete(&self, cluster: &Cluster, task: &Task) -> Result<(), RuntimeError>;
}

/// Namespace and pod name backing `task`.
pub fn pod_location(cluster: &Cluster, task: &Task) -> (String, String) {
    let namespace = task.namespace.clone().unwrap_or_else(|| cluster.namespace());
    let name = task
        .pod_name
        .clone()
        .unwrap_or_else(|| task.task_id().to_string());
    (namespace, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_lookup_by_name() {
        let obs = PodObservation::new(PodPhase::Running).with_container(ContainerObservation {
            name: "web".into(),
            state: ContainerState::Running,
            health: Some(HealthStatus::Healthy),
        });

        assert!(obs.container("web").is_some());
        assert!(obs.container("sidecar").is_none());
    }

    #[test]
    fn not_found_is_distinguished() {
        let err = RuntimeError::PodNotFound {
            namespace: "default-us-east-1".into(),
            name: "abc".into(),
        };
        assert!(err.is_not_found());
        assert!(!RuntimeError::Api("boom".into()).is_not_found());
        assert_eq!(err.to_string(), "pod default-us-east-1/abc not found");
    }
}
