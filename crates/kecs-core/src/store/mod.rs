//! Persistence seams.
//!
//! The engine only talks to these traits. [`MemoryStore`] is the bundled implementation;
//! durable backends plug in behind the same interfaces.

mod memory;
pub use memory::MemoryStore;

use async_trait::async_trait;
use thiserror::Error;
use time::OffsetDateTime;

use kecs_model::{
    Cluster, ContainerInstanceRecord, ServiceRecord, Task, TaskDefinition, TaskFilter, TaskPage,
    TaskSetRecord, TaskStatus,
};

/// Bounded retries for a compare-and-swap task update.
const MAX_CAS_ATTEMPTS: usize = 5;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    #[error("{kind} already exists: {id}")]
    AlreadyExists { kind: &'static str, id: String },

    #[error("version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: i64, found: i64 },

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl StoreError {
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::NotFound {
            kind,
            id: id.into(),
        }
    }

    pub fn already_exists(kind: &'static str, id: impl Into<String>) -> Self {
        StoreError::AlreadyExists {
            kind,
            id: id.into(),
        }
    }

    #[inline]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[inline]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::VersionConflict { .. })
    }
}

#[async_trait]
pub trait ClusterStore: Send + Sync {
    async fn create(&self, cluster: Cluster) -> Result<(), StoreError>;
    /// Looks a cluster up by name.
    async fn get(&self, name: &str) -> Result<Cluster, StoreError>;
    async fn list(&self) -> Result<Vec<Cluster>, StoreError>;
    async fn update(&self, cluster: Cluster) -> Result<(), StoreError>;
    async fn delete(&self, name: &str) -> Result<(), StoreError>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create(&self, task: Task) -> Result<(), StoreError>;

    async fn get(&self, cluster_arn: &str, task_arn: &str) -> Result<Task, StoreError>;

    /// Lists tasks in one cluster, oldest first.
    async fn list(&self, cluster_arn: &str, filter: &TaskFilter) -> Result<TaskPage<Task>, StoreError>;

    /// Replaces a task only if the stored version equals `expected_version`.
    async fn update(&self, task: Task, expected_version: i64) -> Result<(), StoreError>;

    async fn delete(&self, cluster_arn: &str, task_arn: &str) -> Result<(), StoreError>;

    /// Removes tasks in `status` whose retention reference is older than `before` and
    /// returns the removed records.
    async fn delete_older_than(
        &self,
        cluster_arn: &str,
        before: OffsetDateTime,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError>;
}

#[async_trait]
pub trait TaskDefinitionStore: Send + Sync {
    /// Fails with `AlreadyExists` when the family/revision pair is taken.
    async fn register(&self, definition: TaskDefinition) -> Result<(), StoreError>;
    async fn get_by_arn(&self, arn: &str) -> Result<TaskDefinition, StoreError>;
    async fn get(&self, family: &str, revision: i32) -> Result<TaskDefinition, StoreError>;
    /// Highest revision of `family`, whatever its status.
    async fn get_latest(&self, family: &str) -> Result<TaskDefinition, StoreError>;
}

#[async_trait]
pub trait ServiceStore: Send + Sync {
    async fn create(&self, service: ServiceRecord) -> Result<(), StoreError>;
    async fn list(&self, cluster_arn: &str) -> Result<Vec<ServiceRecord>, StoreError>;
    /// Drops services left in `DELETE_IN_PROGRESS` since before `before`.
    async fn delete_marked_for_deletion(
        &self,
        cluster_arn: &str,
        before: OffsetDateTime,
    ) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait ContainerInstanceStore: Send + Sync {
    async fn create(&self, instance: ContainerInstanceRecord) -> Result<(), StoreError>;
    /// Drops instances deregistered before `before`, unless a live task still points at them.
    async fn delete_stale(&self, cluster_arn: &str, before: OffsetDateTime) -> Result<usize, StoreError>;
}

#[async_trait]
pub trait TaskSetStore: Send + Sync {
    async fn create(&self, task_set: TaskSetRecord) -> Result<(), StoreError>;
    /// Drops task sets whose parent service no longer exists.
    async fn delete_orphaned(&self, cluster_arn: &str) -> Result<usize, StoreError>;
}

/// Aggregate handle over every store the engine needs.
pub trait Storage: Send + Sync + 'static {
    fn clusters(&self) -> &dyn ClusterStore;
    fn tasks(&self) -> &dyn TaskStore;
    fn task_definitions(&self) -> &dyn TaskDefinitionStore;
    fn services(&self) -> &dyn ServiceStore;
    fn container_instances(&self) -> &dyn ContainerInstanceStore;
    fn task_sets(&self) -> &dyn TaskSetStore;
}

/// Applies `f` to a task and persists the result with compare-and-swap.
///
/// On a version conflict the latest copy is re-read and `f` is applied again. When `f`
/// leaves the task unchanged nothing is written and the current copy is returned.
pub async fn mutate_task<F>(tasks: &dyn TaskStore, current: Task, mut f: F) -> Result<Task, StoreError>
where
    F: FnMut(&mut Task) + Send,
{
    let mut current = current;
    let mut attempt = 0;

    loop {
        attempt += 1;

        let mut next = current.clone();
        f(&mut next);
        if next == current {
            return Ok(current);
        }

        next.version = current.version + 1;
        match tasks.update(next.clone(), current.version).await {
            Ok(()) => return Ok(next),
            Err(e) if e.is_conflict() && attempt < MAX_CAS_ATTEMPTS => {
                tracing::debug!(task = %current.task_arn, attempt, "task update conflicted; retrying");
                current = tasks.get(&current.cluster_arn, &current.task_arn).await?;
            }
            Err(e) => return Err(e),
        }
    }
}
