use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use async_trait::async_trait;
use time::OffsetDateTime;

use kecs_model::{
    Cluster, ContainerInstanceRecord, ServiceRecord, Task, TaskDefinition, TaskFilter, TaskPage,
    TaskSetRecord, TaskStatus,
};

use super::{
    ClusterStore, ContainerInstanceStore, ServiceStore, Storage, StoreError, TaskDefinitionStore,
    TaskSetStore, TaskStore,
};

/// In-memory storage for every record the engine keeps.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<RwLock<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    /// Clusters indexed by name.
    clusters: HashMap<String, Cluster>,
    /// Tasks indexed by task ARN.
    tasks: HashMap<String, Task>,
    /// Index: cluster ARN -> task ARNs in creation order.
    tasks_by_cluster: HashMap<String, Vec<String>>,
    /// Task definitions indexed by ARN.
    definitions: HashMap<String, TaskDefinition>,
    /// Index: family -> revision -> ARN.
    definitions_by_family: HashMap<String, BTreeMap<i32, String>>,
    services: HashMap<String, ServiceRecord>,
    container_instances: HashMap<String, ContainerInstanceRecord>,
    task_sets: HashMap<String, TaskSetRecord>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, MemoryInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, MemoryInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl MemoryInner {
    fn cluster_task(&self, cluster_arn: &str, task_arn: &str) -> Option<&Task> {
        self.tasks
            .get(task_arn)
            .filter(|task| task.cluster_arn == cluster_arn)
    }

    fn remove_task(&mut self, task_arn: &str) -> Option<Task> {
        let task = self.tasks.remove(task_arn)?;
        if let Some(ids) = self.tasks_by_cluster.get_mut(&task.cluster_arn) {
            ids.retain(|arn| arn != task_arn);
        }
        Some(task)
    }
}

impl Storage for MemoryStore {
    fn clusters(&self) -> &dyn ClusterStore {
        self
    }

    fn tasks(&self) -> &dyn TaskStore {
        self
    }

    fn task_definitions(&self) -> &dyn TaskDefinitionStore {
        self
    }

    fn services(&self) -> &dyn ServiceStore {
        self
    }

    fn container_instances(&self) -> &dyn ContainerInstanceStore {
        self
    }

    fn task_sets(&self) -> &dyn TaskSetStore {
        self
    }
}

// ==== Clusters ====

#[async_trait]
impl ClusterStore for MemoryStore {
    async fn create(&self, cluster: Cluster) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.clusters.contains_key(&cluster.cluster_name) {
            return Err(StoreError::already_exists("cluster", cluster.cluster_name));
        }
        inner.clusters.insert(cluster.cluster_name.clone(), cluster);
        Ok(())
    }

    async fn get(&self, name: &str) -> Result<Cluster, StoreError> {
        self.read()
            .clusters
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::not_found("cluster", name))
    }

    async fn list(&self) -> Result<Vec<Cluster>, StoreError> {
        let mut clusters: Vec<Cluster> = self.read().clusters.values().cloned().collect();
        clusters.sort_by(|a, b| a.cluster_name.cmp(&b.cluster_name));
        Ok(clusters)
    }

    async fn update(&self, cluster: Cluster) -> Result<(), StoreError> {
        let mut inner = self.write();
        match inner.clusters.get_mut(&cluster.cluster_name) {
            Some(slot) => {
                *slot = cluster;
                Ok(())
            }
            None => Err(StoreError::not_found("cluster", cluster.cluster_name)),
        }
    }

    async fn delete(&self, name: &str) -> Result<(), StoreError> {
        self.write()
            .clusters
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("cluster", name))
    }
}

// ==== Tasks ====

#[async_trait]
impl TaskStore for MemoryStore {
    async fn create(&self, task: Task) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.tasks.contains_key(&task.task_arn) {
            return Err(StoreError::already_exists("task", task.task_arn));
        }
        inner
            .tasks_by_cluster
            .entry(task.cluster_arn.clone())
            .or_default()
            .push(task.task_arn.clone());
        inner.tasks.insert(task.task_arn.clone(), task);
        Ok(())
    }

    async fn get(&self, cluster_arn: &str, task_arn: &str) -> Result<Task, StoreError> {
        self.read()
            .cluster_task(cluster_arn, task_arn)
            .cloned()
            .ok_or_else(|| StoreError::not_found("task", task_arn))
    }

    async fn list(&self, cluster_arn: &str, filter: &TaskFilter) -> Result<TaskPage<Task>, StoreError> {
        let inner = self.read();

        let Some(ids) = inner.tasks_by_cluster.get(cluster_arn) else {
            return Ok(TaskPage {
                items: vec![],
                total: 0,
            });
        };

        let filtered: Vec<&Task> = ids
            .iter()
            .filter_map(|arn| inner.tasks.get(arn))
            .filter(|task| filter.matches(task))
            .collect();
        let total = filtered.len();

        let items = filtered
            .into_iter()
            .skip(filter.offset)
            .take(filter.limit)
            .cloned()
            .collect();

        Ok(TaskPage { items, total })
    }

    async fn update(&self, task: Task, expected_version: i64) -> Result<(), StoreError> {
        let mut inner = self.write();
        let Some(stored) = inner.tasks.get_mut(&task.task_arn) else {
            return Err(StoreError::not_found("task", task.task_arn));
        };
        if stored.version != expected_version {
            return Err(StoreError::VersionConflict {
                id: task.task_arn,
                expected: expected_version,
                found: stored.version,
            });
        }
        *stored = task;
        Ok(())
    }

    async fn delete(&self, cluster_arn: &str, task_arn: &str) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.cluster_task(cluster_arn, task_arn).is_none() {
            return Err(StoreError::not_found("task", task_arn));
        }
        inner.remove_task(task_arn);
        Ok(())
    }

    async fn delete_older_than(
        &self,
        cluster_arn: &str,
        before: OffsetDateTime,
        status: TaskStatus,
    ) -> Result<Vec<Task>, StoreError> {
        let mut inner = self.write();

        let expired: Vec<Task> = inner
            .tasks_by_cluster
            .get(cluster_arn)
            .into_iter()
            .flatten()
            .filter_map(|arn| inner.tasks.get(arn))
            .filter(|task| task.last_status == status && task.age_reference() < before)
            .cloned()
            .collect();

        for task in &expired {
            inner.remove_task(&task.task_arn);
        }
        Ok(expired)
    }
}

// ==== Task definitions ====

#[async_trait]
impl TaskDefinitionStore for MemoryStore {
    async fn register(&self, definition: TaskDefinition) -> Result<(), StoreError> {
        let mut inner = self.write();

        let revisions = inner
            .definitions_by_family
            .entry(definition.family.clone())
            .or_default();
        if revisions.contains_key(&definition.revision) {
            return Err(StoreError::already_exists(
                "task definition",
                definition.family_revision(),
            ));
        }
        revisions.insert(definition.revision, definition.task_definition_arn.clone());
        inner
            .definitions
            .insert(definition.task_definition_arn.clone(), definition);
        Ok(())
    }

    async fn get_by_arn(&self, arn: &str) -> Result<TaskDefinition, StoreError> {
        self.read()
            .definitions
            .get(arn)
            .cloned()
            .ok_or_else(|| StoreError::not_found("task definition", arn))
    }

    async fn get(&self, family: &str, revision: i32) -> Result<TaskDefinition, StoreError> {
        let inner = self.read();
        inner
            .definitions_by_family
            .get(family)
            .and_then(|revs| revs.get(&revision))
            .and_then(|arn| inner.definitions.get(arn))
            .cloned()
            .ok_or_else(|| StoreError::not_found("task definition", format!("{family}:{revision}")))
    }

    async fn get_latest(&self, family: &str) -> Result<TaskDefinition, StoreError> {
        let inner = self.read();
        inner
            .definitions_by_family
            .get(family)
            .and_then(|revs| revs.values().next_back())
            .and_then(|arn| inner.definitions.get(arn))
            .cloned()
            .ok_or_else(|| StoreError::not_found("task definition", family))
    }
}

// ==== Services, container instances, task sets ====

#[async_trait]
impl ServiceStore for MemoryStore {
    async fn create(&self, service: ServiceRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.services.contains_key(&service.service_arn) {
            return Err(StoreError::already_exists("service", service.service_arn));
        }
        inner.services.insert(service.service_arn.clone(), service);
        Ok(())
    }

    async fn list(&self, cluster_arn: &str) -> Result<Vec<ServiceRecord>, StoreError> {
        let mut services: Vec<ServiceRecord> = self
            .read()
            .services
            .values()
            .filter(|s| s.cluster_arn == cluster_arn)
            .cloned()
            .collect();
        services.sort_by(|a, b| a.service_name.cmp(&b.service_name));
        Ok(services)
    }

    async fn delete_marked_for_deletion(
        &self,
        cluster_arn: &str,
        before: OffsetDateTime,
    ) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let before_len = inner.services.len();
        inner.services.retain(|_, s| {
            !(s.cluster_arn == cluster_arn
                && s.status == ServiceRecord::DELETE_IN_PROGRESS
                && s.updated_at < before)
        });
        Ok(before_len - inner.services.len())
    }
}

#[async_trait]
impl ContainerInstanceStore for MemoryStore {
    async fn create(&self, instance: ContainerInstanceRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner
            .container_instances
            .contains_key(&instance.container_instance_arn)
        {
            return Err(StoreError::already_exists(
                "container instance",
                instance.container_instance_arn,
            ));
        }
        inner
            .container_instances
            .insert(instance.container_instance_arn.clone(), instance);
        Ok(())
    }

    async fn delete_stale(&self, cluster_arn: &str, before: OffsetDateTime) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let MemoryInner {
            tasks,
            container_instances,
            ..
        } = &mut *inner;

        let in_use = |arn: &str| {
            tasks.values().any(|t| {
                t.cluster_arn == cluster_arn
                    && t.container_instance_arn.as_deref() == Some(arn)
                    && !t.last_status.is_terminal()
            })
        };

        let before_len = container_instances.len();
        container_instances.retain(|arn, ci| {
            let stale = ci.cluster_arn == cluster_arn
                && ci.status == ContainerInstanceRecord::INACTIVE
                && ci.deregistered_at.is_some_and(|at| at < before);
            !stale || in_use(arn)
        });
        Ok(before_len - container_instances.len())
    }
}

#[async_trait]
impl TaskSetStore for MemoryStore {
    async fn create(&self, task_set: TaskSetRecord) -> Result<(), StoreError> {
        let mut inner = self.write();
        if inner.task_sets.contains_key(&task_set.task_set_arn) {
            return Err(StoreError::already_exists("task set", task_set.task_set_arn));
        }
        inner.task_sets.insert(task_set.task_set_arn.clone(), task_set);
        Ok(())
    }

    async fn delete_orphaned(&self, cluster_arn: &str) -> Result<usize, StoreError> {
        let mut inner = self.write();
        let MemoryInner {
            services, task_sets, ..
        } = &mut *inner;

        let before_len = task_sets.len();
        task_sets.retain(|_, ts| ts.cluster_arn != cluster_arn || services.contains_key(&ts.service_arn));
        Ok(before_len - task_sets.len())
    }
}
