pub mod arn;

mod status;
pub use status::{HealthStatus, LaunchType, StopCode, TaskStatus};

mod container;
pub use container::{
    ContainerDefinition, ContainerStatus, HealthCheck, KeyValuePair, PortMapping, SecretRef,
};

mod task;
pub use task::{AwsVpcConfiguration, ContainerOverride, NetworkConfiguration, Tag, Task, TaskOverride};

mod task_definition;
pub use task_definition::{TaskDefinition, TaskDefinitionStatus};

mod cluster;
pub use cluster::{Cluster, ContainerInstanceRecord, ServiceRecord, TaskSetRecord};

mod secret;
pub use secret::{SecretInfo, SecretSource};

mod failure;
pub use failure::Failure;

mod task_filter;
pub use task_filter::{TaskFilter, TaskPage};

/// Resource names the control plane stamps onto every Kubernetes object it owns.
pub mod labels {
    pub const CLUSTER: &str = "kecs.dev/cluster";
    pub const TASK_ID: &str = "kecs.dev/task-id";
    pub const TASK_FAMILY: &str = "kecs.dev/task-family";
    pub const TASK_REVISION: &str = "kecs.dev/task-revision";
    pub const LAUNCH_TYPE: &str = "kecs.dev/launch-type";
    pub const MANAGED_BY: &str = "kecs.dev/managed-by";
    pub const SOURCE: &str = "kecs.dev/source";

    pub const MANAGED_BY_VALUE: &str = "kecs";
}

/// Annotation keys written by the converter.
pub mod annotations {
    pub const TASK_ARN: &str = "kecs.dev/task-arn";
    pub const TASK_DEFINITION_ARN: &str = "kecs.dev/task-definition-arn";
    pub const EXECUTION_ROLE_ARN: &str = "kecs.dev/execution-role-arn";
    pub const TASK_ROLE_ARN: &str = "kecs.dev/task-role-arn";
    pub const SECRET_COUNT: &str = "kecs.dev/secret-count";
    pub const ARN: &str = "kecs.dev/arn";
    pub const NETWORK_MODE: &str = "ecs.amazonaws.com/network-mode";
    pub const SUBNETS: &str = "ecs.amazonaws.com/subnets";
    pub const SECURITY_GROUPS: &str = "ecs.amazonaws.com/security-groups";
    pub const ASSIGN_PUBLIC_IP: &str = "ecs.amazonaws.com/assign-public-ip";

    /// Per-secret annotation key: `kecs.dev/secret-<index>-arn`.
    pub fn secret_arn(index: usize) -> String {
        format!("kecs.dev/secret-{index}-arn")
    }
}
