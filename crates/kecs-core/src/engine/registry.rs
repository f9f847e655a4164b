use std::sync::Arc;

use tracing::{info, instrument, warn};

use kecs_model::{
    Cluster, TaskDefinition, TaskDefinitionStatus,
    api::{CreateClusterRequest, RegisterTaskDefinitionRequest},
    arn,
};

use super::TaskEngine;
use crate::{error::CoreError, store::StoreError};

const MAX_NAME_LEN: usize = 255;
const REGISTER_ATTEMPTS: usize = 3;

impl TaskEngine {
    /// Creates a cluster, or returns the existing one with the same name.
    ///
    /// Runtime provisioning for the new cluster runs detached; failures are only logged.
    #[instrument(level = "debug", skip(self, req), fields(cluster = ?req.cluster_name))]
    pub async fn create_cluster(&self, req: CreateClusterRequest) -> Result<Cluster, CoreError> {
        let name = req
            .cluster_name
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| self.config.default_cluster.clone());
        validate_name("clusterName", &name)?;

        if let Ok(existing) = self.store.clusters().get(&name).await {
            return Ok(existing);
        }

        let cluster = Cluster {
            cluster_arn: arn::cluster_arn(&self.config.region, &self.config.account_id, &name),
            cluster_name: name,
            status: "ACTIVE".to_string(),
            region: self.config.region.clone(),
            account_id: self.config.account_id.clone(),
            backing_cluster: None,
            created_at: self.clock.now(),
        };

        match self.store.clusters().create(cluster.clone()).await {
            Ok(()) => {}
            // Lost a creation race; the winner's record is authoritative.
            Err(StoreError::AlreadyExists { .. }) => return Ok(self.store.clusters().get(&cluster.cluster_name).await?),
            Err(e) => return Err(e.into()),
        }
        info!(cluster = %cluster.cluster_name, "cluster created");

        self.provision_detached(&cluster);
        Ok(cluster)
    }

    /// Runs the runtime's per-cluster setup in the background. Failures are only logged.
    pub(super) fn provision_detached(&self, cluster: &Cluster) {
        let runtime = Arc::clone(&self.runtime);
        let target = cluster.clone();
        tokio::spawn(async move {
            if let Err(e) = runtime.provision(&target).await {
                warn!(cluster = %target.cluster_name, error = %e, "cluster provisioning failed");
            }
        });
    }

    /// Registers the next revision of a task definition family.
    #[instrument(level = "debug", skip(self, req), fields(family = %req.family))]
    pub async fn register_task_definition(
        &self,
        req: RegisterTaskDefinitionRequest,
    ) -> Result<TaskDefinition, CoreError> {
        validate_name("family", &req.family)?;
        if req.container_definitions.is_empty() {
            return Err(CoreError::validation("containerDefinitions must not be empty"));
        }
        for (i, def) in req.container_definitions.iter().enumerate() {
            if def.name.as_deref().is_none_or(str::is_empty) {
                return Err(CoreError::validation(format!("containerDefinitions[{i}].name is required")));
            }
            if def.image.as_deref().is_none_or(str::is_empty) {
                return Err(CoreError::validation(format!("containerDefinitions[{i}].image is required")));
            }
        }

        let container_definitions = serde_json::to_string(&req.container_definitions)
            .map_err(|e| CoreError::validation(format!("containerDefinitions: {e}")))?;

        let mut attempt = 0;
        loop {
            attempt += 1;

            let revision = match self.store.task_definitions().get_latest(&req.family).await {
                Ok(latest) => latest.revision + 1,
                Err(e) if e.is_not_found() => 1,
                Err(e) => return Err(e.into()),
            };

            let definition = TaskDefinition {
                task_definition_arn: arn::task_definition_arn(
                    &self.config.region,
                    &self.config.account_id,
                    &req.family,
                    revision,
                ),
                family: req.family.clone(),
                revision,
                status: TaskDefinitionStatus::Active,
                container_definitions: container_definitions.clone(),
                cpu: req.cpu.clone(),
                memory: req.memory.clone(),
                network_mode: req.network_mode.clone(),
                task_role_arn: req.task_role_arn.clone(),
                execution_role_arn: req.execution_role_arn.clone(),
                registered_at: self.clock.now(),
            };

            match self.store.task_definitions().register(definition.clone()).await {
                Ok(()) => {
                    info!(task_definition = %definition.family_revision(), "task definition registered");
                    return Ok(definition);
                }
                Err(StoreError::AlreadyExists { .. }) if attempt < REGISTER_ATTEMPTS => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    /// Resolves an ARN, `family:revision`, or bare `family` (latest ACTIVE revision).
    pub async fn resolve_task_definition(&self, reference: &str) -> Result<TaskDefinition, CoreError> {
        let defs = self.store.task_definitions();

        if arn::is_arn(reference) {
            return Ok(defs.get_by_arn(reference).await?);
        }

        if let Some((family, revision)) = reference.rsplit_once(':') {
            let revision: i32 = revision
                .parse()
                .map_err(|_| CoreError::validation(format!("invalid task definition revision: {reference}")))?;
            return Ok(defs.get(family, revision).await?);
        }

        let latest = defs.get_latest(reference).await?;
        if latest.is_active() {
            return Ok(latest);
        }
        for revision in (1..latest.revision).rev() {
            match defs.get(reference, revision).await {
                Ok(def) if def.is_active() => return Ok(def),
                Ok(_) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Err(CoreError::not_found("task definition", reference))
    }
}

fn validate_name(field: &str, name: &str) -> Result<(), CoreError> {
    let ok = !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(CoreError::validation(format!(
            "{field} must be 1-{MAX_NAME_LEN} letters, digits, hyphens or underscores"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_validated() {
        assert!(validate_name("family", "web-app_2").is_ok());
        assert!(validate_name("family", "").is_err());
        assert!(validate_name("family", "web:1").is_err());
        assert!(validate_name("family", &"a".repeat(256)).is_err());
    }
}
