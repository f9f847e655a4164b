use super::{LaunchType, Task, TaskStatus};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Filtering and pagination for task listings within one cluster.
#[derive(Debug, Clone)]
pub struct TaskFilter {
    pub family: Option<String>,
    pub started_by: Option<String>,
    pub desired_status: Option<TaskStatus>,
    pub last_status: Option<TaskStatus>,
    pub launch_type: Option<LaunchType>,
    pub container_instance: Option<String>,
    pub limit: usize,
    pub offset: usize,
}

/// Result of a paginated task query.
#[derive(Debug, Clone)]
pub struct TaskPage<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl<T> TaskPage<T> {
    /// Offset of the next page, if there is one.
    pub fn next_offset(&self, offset: usize) -> Option<usize> {
        let next = offset + self.items.len();
        (!self.items.is_empty() && next < self.total).then_some(next)
    }
}

impl Default for TaskFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskFilter {
    pub fn new() -> Self {
        Self {
            family: None,
            started_by: None,
            desired_status: None,
            last_status: None,
            launch_type: None,
            container_instance: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_family(mut self, family: impl Into<String>) -> Self {
        self.family = Some(family.into());
        self
    }

    pub fn with_started_by(mut self, started_by: impl Into<String>) -> Self {
        self.started_by = Some(started_by.into());
        self
    }

    pub fn with_desired_status(mut self, status: TaskStatus) -> Self {
        self.desired_status = Some(status);
        self
    }

    pub fn with_last_status(mut self, status: TaskStatus) -> Self {
        self.last_status = Some(status);
        self
    }

    pub fn with_launch_type(mut self, launch_type: LaunchType) -> Self {
        self.launch_type = Some(launch_type);
        self
    }

    pub fn with_container_instance(mut self, arn: impl Into<String>) -> Self {
        self.container_instance = Some(arn.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Returns `true` if `task` passes every filter that is set.
    ///
    /// Family is matched against the `:task-definition/<family>:<revision>` segment of the ARN.
    pub fn matches(&self, task: &Task) -> bool {
        if let Some(family) = &self.family {
            let td_family = super::arn::task_definition_family(&task.task_definition_arn);
            if td_family != Some(family.as_str()) {
                return false;
            }
        }
        if let Some(started_by) = &self.started_by
            && task.started_by.as_deref() != Some(started_by.as_str())
        {
            return false;
        }
        if let Some(status) = self.desired_status
            && task.desired_status != status
        {
            return false;
        }
        if let Some(status) = self.last_status
            && task.last_status != status
        {
            return false;
        }
        if let Some(launch_type) = self.launch_type
            && task.launch_type != launch_type
        {
            return false;
        }
        if let Some(arn) = &self.container_instance
            && task.container_instance_arn.as_deref() != Some(arn.as_str())
        {
            return false;
        }
        true
    }
}
