use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use super::{ContainerStatus, HealthStatus, KeyValuePair, LaunchType, StopCode, TaskStatus};

/// Mutable lifecycle record of one ECS task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub task_arn: String,
    pub cluster_arn: String,
    pub task_definition_arn: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_instance_arn: Option<String>,

    pub last_status: TaskStatus,
    pub desired_status: TaskStatus,
    pub launch_type: LaunchType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default)]
    pub containers: Vec<ContainerStatus>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overrides: Option<TaskOverride>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop_code: Option<StopCode>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stopped_reason: Option<String>,
    #[serde(default)]
    pub health_status: HealthStatus,

    /// Backing pod name; equal to the task id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pod_name: Option<String>,
    /// Backing pod namespace (`<cluster>-<region>`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,

    /// Optimistic concurrency token, bumped on every persisted mutation.
    pub version: i64,

    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub pull_started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub pull_stopped_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub stopping_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub stopped_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option", skip_serializing_if = "Option::is_none")]
    pub execution_stopped_at: Option<OffsetDateTime>,
}

impl Task {
    /// Short task id: the last path segment of the ARN.
    pub fn task_id(&self) -> &str {
        super::arn::resource_id(&self.task_arn)
    }

    /// Reference time used by retention: when the task stopped, else when it was created.
    pub fn age_reference(&self) -> OffsetDateTime {
        self.stopped_at.unwrap_or(self.created_at)
    }

    /// Exit code of the first essential container that reported one.
    pub fn essential_exit_code(&self) -> Option<i32> {
        self.containers
            .iter()
            .filter(|c| c.is_essential())
            .find_map(|c| c.exit_code)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tag {
    pub key: String,
    #[serde(default)]
    pub value: String,
}

impl Tag {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Run-time adjustments applied on top of a task definition.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskOverride {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub container_overrides: Vec<ContainerOverride>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_role_arn: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_role_arn: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub environment: Vec<KeyValuePair>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpu: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_reservation: Option<i64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkConfiguration {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub awsvpc_configuration: Option<AwsVpcConfiguration>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsVpcConfiguration {
    #[serde(default)]
    pub subnets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assign_public_ip: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Task {
        Task {
            task_arn: "arn:aws:ecs:us-east-1:000000000000:task/default/abc".into(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            task_definition_arn: "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1".into(),
            container_instance_arn: None,
            last_status: TaskStatus::Provisioning,
            desired_status: TaskStatus::Running,
            launch_type: LaunchType::Fargate,
            cpu: None,
            memory: None,
            containers: Vec::new(),
            group: None,
            started_by: None,
            overrides: None,
            tags: Vec::new(),
            stop_code: None,
            stopped_reason: None,
            health_status: HealthStatus::Unknown,
            pod_name: Some("abc".into()),
            namespace: Some("default-us-east-1".into()),
            version: 1,
            created_at: OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap(),
            started_at: None,
            pull_started_at: None,
            pull_stopped_at: None,
            stopping_at: None,
            stopped_at: None,
            execution_stopped_at: None,
        }
    }

    #[test]
    fn task_id_is_last_arn_segment() {
        assert_eq!(sample().task_id(), "abc");
    }

    #[test]
    fn serde_roundtrip_keeps_timestamps() {
        let mut task = sample();
        task.stopped_at = Some(task.created_at + time::Duration::seconds(30));

        let json = serde_json::to_string(&task).unwrap();
        assert!(json.contains(r#""lastStatus":"PROVISIONING""#));
        assert!(json.contains("stoppedAt"));
        assert!(!json.contains("startedAt"));

        let back: Task = serde_json::from_str(&json).unwrap();
        assert_eq!(back, task);
    }

    #[test]
    fn age_reference_prefers_stop_time() {
        let mut task = sample();
        assert_eq!(task.age_reference(), task.created_at);

        let stopped = task.created_at + time::Duration::minutes(5);
        task.stopped_at = Some(stopped);
        assert_eq!(task.age_reference(), stopped);
    }
}
