use std::fmt;

use serde::{Deserialize, Serialize};

/// ECS lifecycle status of a task (`lastStatus` / `desiredStatus`).
///
/// Variants are declared in lifecycle order; [`TaskStatus::rank`] exposes that order
/// so callers can refuse transitions that would move a task backwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    /// Record created, backing pod requested.
    Provisioning,
    /// Pod accepted by the scheduler but not yet running.
    Pending,
    /// At least one container is running.
    Running,
    /// Stop requested; pod deletion in flight.
    Stopping,
    /// Pod deletion was issued but never confirmed.
    Deprovisioning,
    /// Terminal.
    Stopped,
}

impl TaskStatus {
    /// Position in the lifecycle. Higher is later.
    pub fn rank(&self) -> u8 {
        match self {
            TaskStatus::Provisioning => 0,
            TaskStatus::Pending => 1,
            TaskStatus::Running => 2,
            TaskStatus::Stopping => 3,
            TaskStatus::Deprovisioning => 4,
            TaskStatus::Stopped => 5,
        }
    }

    /// Returns `true` if moving from `self` to `next` goes forward in the lifecycle.
    #[inline]
    pub fn can_advance_to(&self, next: TaskStatus) -> bool {
        next.rank() > self.rank()
    }

    /// Returns `true` if the task won't transition further.
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Stopped)
    }

    /// Returns `true` for statuses the retention sweep is allowed to delete.
    #[inline]
    pub fn is_sweepable(&self) -> bool {
        matches!(self, TaskStatus::Stopped | TaskStatus::Deprovisioning)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Provisioning => "PROVISIONING",
            TaskStatus::Pending => "PENDING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Stopping => "STOPPING",
            TaskStatus::Deprovisioning => "DEPROVISIONING",
            TaskStatus::Stopped => "STOPPED",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LaunchType {
    #[default]
    Fargate,
    Ec2,
    External,
}

impl LaunchType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LaunchType::Fargate => "FARGATE",
            LaunchType::Ec2 => "EC2",
            LaunchType::External => "EXTERNAL",
        }
    }
}

impl fmt::Display for LaunchType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    #[default]
    Unknown,
}

impl HealthStatus {
    /// Folds container health into a task-level value.
    ///
    /// Any unhealthy member makes the whole set unhealthy; the set is healthy only when
    /// every member reports healthy.
    pub fn aggregate<I>(statuses: I) -> HealthStatus
    where
        I: IntoIterator<Item = HealthStatus>,
    {
        let mut seen = false;
        let mut all_healthy = true;
        for status in statuses {
            seen = true;
            match status {
                HealthStatus::Unhealthy => return HealthStatus::Unhealthy,
                HealthStatus::Unknown => all_healthy = false,
                HealthStatus::Healthy => {}
            }
        }
        if seen && all_healthy {
            HealthStatus::Healthy
        } else {
            HealthStatus::Unknown
        }
    }
}

/// Why a task stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopCode {
    TaskFailedToStart,
    EssentialContainerExited,
    UserInitiated,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lifecycle_rank_is_monotonic() {
        let order = [
            TaskStatus::Provisioning,
            TaskStatus::Pending,
            TaskStatus::Running,
            TaskStatus::Stopping,
            TaskStatus::Deprovisioning,
            TaskStatus::Stopped,
        ];
        for pair in order.windows(2) {
            assert!(pair[0].can_advance_to(pair[1]));
            assert!(!pair[1].can_advance_to(pair[0]));
        }
        assert!(!TaskStatus::Running.can_advance_to(TaskStatus::Running));
    }

    #[test]
    fn terminal_and_sweepable() {
        assert!(TaskStatus::Stopped.is_terminal());
        assert!(!TaskStatus::Deprovisioning.is_terminal());

        assert!(TaskStatus::Stopped.is_sweepable());
        assert!(TaskStatus::Deprovisioning.is_sweepable());
        assert!(!TaskStatus::Stopping.is_sweepable());
        assert!(!TaskStatus::Running.is_sweepable());
    }

    #[test]
    fn wire_names() {
        let json = serde_json::to_string(&TaskStatus::Deprovisioning).unwrap();
        assert_eq!(json, r#""DEPROVISIONING""#);

        let json = serde_json::to_string(&LaunchType::Ec2).unwrap();
        assert_eq!(json, r#""EC2""#);

        let back: LaunchType = serde_json::from_str(r#""FARGATE""#).unwrap();
        assert_eq!(back, LaunchType::Fargate);

        let json = serde_json::to_string(&StopCode::UserInitiated).unwrap();
        assert_eq!(json, r#""UserInitiated""#);
    }

    #[test]
    fn health_aggregation() {
        use HealthStatus::*;

        assert_eq!(HealthStatus::aggregate([Healthy, Healthy]), Healthy);
        assert_eq!(HealthStatus::aggregate([Healthy, Unknown]), Unknown);
        assert_eq!(HealthStatus::aggregate([Unknown, Unhealthy]), Unhealthy);
        assert_eq!(HealthStatus::aggregate([]), Unknown);
    }
}
