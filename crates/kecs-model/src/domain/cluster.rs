use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// ECS cluster and the backing Kubernetes cluster that hosts its pods.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cluster {
    pub cluster_name: String,
    pub cluster_arn: String,
    #[serde(default = "default_status")]
    pub status: String,
    pub region: String,
    pub account_id: String,
    /// Name of the backing Kubernetes cluster, if it differs from the ambient one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_cluster: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

fn default_status() -> String {
    "ACTIVE".to_string()
}

impl Cluster {
    /// Kubernetes namespace that hosts this cluster's pods.
    ///
    /// Derived, never random: one backing cluster can host several ECS regions side by side.
    pub fn namespace(&self) -> String {
        format!("{}-{}", self.cluster_name, self.region)
    }
}

/// Minimal service record needed by the retention sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceRecord {
    pub service_arn: String,
    pub service_name: String,
    pub cluster_arn: String,
    /// `ACTIVE`, `DRAINING`, `DELETE_IN_PROGRESS`, ...
    pub status: String,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl ServiceRecord {
    pub const DELETE_IN_PROGRESS: &'static str = "DELETE_IN_PROGRESS";

    /// Group string ECS stamps on tasks started by this service.
    pub fn task_group(&self) -> String {
        format!("service:{}", self.service_name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInstanceRecord {
    pub container_instance_arn: String,
    pub cluster_arn: String,
    /// `ACTIVE`, `DRAINING`, `INACTIVE`.
    pub status: String,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub deregistered_at: Option<OffsetDateTime>,
}

impl ContainerInstanceRecord {
    pub const INACTIVE: &'static str = "INACTIVE";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSetRecord {
    pub task_set_arn: String,
    pub service_arn: String,
    pub cluster_arn: String,
}
