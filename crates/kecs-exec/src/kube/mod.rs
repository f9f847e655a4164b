//! Runtime backed by a live Kubernetes cluster.
//!
//! Each ECS cluster may name a backing Kubernetes cluster; its client is built from the
//! kubeconfig context `<context_prefix><backing>` on first use and then cached. Clusters
//! without a backing name share the ambient client (in-cluster config or the current
//! kubeconfig context).

mod status;

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use k8s_openapi::{
    api::core::v1::{Namespace, Pod, Secret},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use kube::{
    Api, Client, Config,
    api::{DeleteParams, PostParams},
    config::KubeConfigOptions,
};
use tracing::{debug, info, instrument};

use kecs_core::{
    ClusterTable,
    runtime::{PodObservation, RuntimeError, TaskRuntime, pod_location},
};
use kecs_model::{Cluster, SecretInfo, SecretSource, Task, annotations, labels};

use crate::error::{ExecError, ExecResult};

const AMBIENT: &str = "";

#[derive(Debug, Clone)]
pub struct KubeRuntimeConfig {
    /// Prepended to a backing cluster name to form its kubeconfig context.
    pub context_prefix: String,
}

impl Default for KubeRuntimeConfig {
    fn default() -> Self {
        Self {
            context_prefix: "k3d-".to_string(),
        }
    }
}

pub struct KubeRuntime {
    config: KubeRuntimeConfig,
    clients: ClusterTable<Client>,
    /// Namespaces known to exist, per client key.
    namespaces: ClusterTable<BTreeSet<String>>,
}

impl KubeRuntime {
    pub fn new(config: KubeRuntimeConfig) -> Self {
        Self {
            config,
            clients: ClusterTable::new(),
            namespaces: ClusterTable::new(),
        }
    }

    /// Seeds the ambient client, e.g. one built by the caller at startup.
    pub fn with_client(self, client: Client) -> Self {
        self.clients.insert(AMBIENT, client);
        self
    }

    fn client_key(cluster: &Cluster) -> &str {
        cluster.backing_cluster.as_deref().unwrap_or(AMBIENT)
    }

    async fn client(&self, cluster: &Cluster) -> ExecResult<Client> {
        let key = Self::client_key(cluster);
        if let Some(client) = self.clients.get(key) {
            return Ok(client);
        }

        let client = if key == AMBIENT {
            Client::try_default().await.map_err(|e| ExecError::Client {
                cluster: cluster.cluster_name.clone(),
                reason: e.to_string(),
            })?
        } else {
            let context = format!("{}{}", self.config.context_prefix, key);
            let options = KubeConfigOptions {
                context: Some(context.clone()),
                ..Default::default()
            };
            let config = Config::from_kubeconfig(&options)
                .await
                .map_err(|e| ExecError::Kubeconfig(format!("context {context}: {e}")))?;
            Client::try_from(config).map_err(|e| ExecError::Client {
                cluster: cluster.cluster_name.clone(),
                reason: e.to_string(),
            })?
        };

        debug!(target: "kecs.exec.kube", cluster = %cluster.cluster_name, backing = key, "kubernetes client ready");
        self.clients.insert(key, client.clone());
        Ok(client)
    }

    async fn ensure_namespace(&self, client: &Client, cluster: &Cluster, namespace: &str) -> ExecResult<()> {
        let key = Self::client_key(cluster);
        if self
            .namespaces
            .with_existing(key, |known| known.contains(namespace))
            .unwrap_or(false)
        {
            return Ok(());
        }

        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some(namespace.to_string()),
                labels: Some(BTreeMap::from([
                    (labels::MANAGED_BY.to_string(), labels::MANAGED_BY_VALUE.to_string()),
                    (labels::CLUSTER.to_string(), cluster.cluster_name.clone()),
                ])),
                ..Default::default()
            },
            ..Default::default()
        };
        match Api::<Namespace>::all(client.clone()).create(&PostParams::default(), &ns).await {
            Ok(_) => info!(target: "kecs.exec.kube", namespace, "namespace created"),
            Err(e) if is_conflict(&e) => {}
            Err(e) => return Err(e.into()),
        }

        self.namespaces.with_entry(key, |known| known.insert(namespace.to_string()));
        Ok(())
    }

    /// Creates the secrets a pod references. Existing secrets are left untouched.
    async fn ensure_secrets(
        &self,
        client: &Client,
        namespace: &str,
        secrets: &BTreeMap<String, SecretInfo>,
    ) -> ExecResult<()> {
        let api = Api::<Secret>::namespaced(client.clone(), namespace);
        for (arn, info) in secrets {
            let secret = placeholder_secret(arn, info);
            match api.create(&PostParams::default(), &secret).await {
                Ok(_) => debug!(target: "kecs.exec.kube", namespace, secret = %info.secret_name, "secret created"),
                Err(e) if is_conflict(&e) => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

impl Default for KubeRuntime {
    fn default() -> Self {
        Self::new(KubeRuntimeConfig::default())
    }
}

/// Local stand-in for a secret value. Real values are never fetched.
fn placeholder_value(info: &SecretInfo) -> String {
    match info.source {
        SecretSource::SecretsManager => format!("placeholder-{}-{}-{}", info.source, info.secret_name, info.key),
        SecretSource::Ssm => format!("placeholder-{}-{}", info.source, info.secret_name),
    }
}

fn placeholder_secret(arn: &str, info: &SecretInfo) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(info.secret_name.clone()),
            labels: Some(BTreeMap::from([
                (labels::MANAGED_BY.to_string(), labels::MANAGED_BY_VALUE.to_string()),
                (labels::SOURCE.to_string(), info.source.to_string()),
            ])),
            annotations: Some(BTreeMap::from([(annotations::ARN.to_string(), arn.to_string())])),
            ..Default::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([(info.key.clone(), placeholder_value(info))])),
        ..Default::default()
    }
}

fn is_conflict(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 409)
}

fn is_not_found(e: &kube::Error) -> bool {
    matches!(e, kube::Error::Api(resp) if resp.code == 404)
}

fn pod_error(e: kube::Error, namespace: String, name: String) -> RuntimeError {
    if is_not_found(&e) {
        RuntimeError::PodNotFound { namespace, name }
    } else {
        ExecError::from(e).into()
    }
}

#[async_trait]
impl TaskRuntime for KubeRuntime {
    fn name(&self) -> &'static str {
        "kube"
    }

    async fn provision(&self, cluster: &Cluster) -> Result<(), RuntimeError> {
        let client = self.client(cluster).await?;
        self.ensure_namespace(&client, cluster, &cluster.namespace()).await?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self, cluster, pod, secrets), fields(cluster = %cluster.cluster_name, pod = ?pod.metadata.name))]
    async fn launch(
        &self,
        cluster: &Cluster,
        pod: &Pod,
        secrets: &BTreeMap<String, SecretInfo>,
    ) -> Result<(), RuntimeError> {
        let Some(namespace) = pod.metadata.namespace.as_deref() else {
            return Err(ExecError::InvalidPod("pod has no namespace".into()).into());
        };

        let client = self.client(cluster).await?;
        self.ensure_namespace(&client, cluster, namespace).await?;
        if !secrets.is_empty() {
            self.ensure_secrets(&client, namespace, secrets).await?;
        }

        Api::<Pod>::namespaced(client, namespace)
            .create(&PostParams::default(), pod)
            .await
            .map_err(ExecError::from)?;
        Ok(())
    }

    async fn observe(&self, cluster: &Cluster, task: &Task) -> Result<PodObservation, RuntimeError> {
        let (namespace, name) = pod_location(cluster, task);
        let client = self.client(cluster).await?;
        match Api::<Pod>::namespaced(client, &namespace).get(&name).await {
            Ok(pod) => Ok(status::observe_pod(&pod)),
            Err(e) => Err(pod_error(e, namespace, name)),
        }
    }

    async fn delete(&self, cluster: &Cluster, task: &Task) -> Result<(), RuntimeError> {
        let (namespace, name) = pod_location(cluster, task);
        let client = self.client(cluster).await?;
        match Api::<Pod>::namespaced(client, &namespace)
            .delete(&name, &DeleteParams::foreground())
            .await
        {
            Ok(_) => {
                debug!(target: "kecs.exec.kube", %namespace, pod = %name, "pod deletion requested");
                Ok(())
            }
            Err(e) => Err(pod_error(e, namespace, name)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_placeholder_carries_arn_and_source() {
        let info = SecretInfo {
            secret_name: "kecs-secret-db-pass".into(),
            key: "password".into(),
            source: SecretSource::SecretsManager,
        };
        let arn = "arn:aws:secretsmanager:us-east-1:123456789012:secret:db-pass-XyZ123:password::";
        let secret = placeholder_secret(arn, &info);

        assert_eq!(secret.metadata.name.as_deref(), Some("kecs-secret-db-pass"));
        assert_eq!(secret.type_.as_deref(), Some("Opaque"));
        assert_eq!(
            secret.metadata.annotations.unwrap().get(annotations::ARN).map(String::as_str),
            Some(arn)
        );
        assert_eq!(
            secret.metadata.labels.unwrap().get(labels::SOURCE).map(String::as_str),
            Some("secretsmanager")
        );
        assert_eq!(
            secret.string_data.unwrap().get("password").map(String::as_str),
            Some("placeholder-secretsmanager-kecs-secret-db-pass-password")
        );
    }

    #[test]
    fn ssm_placeholder_ignores_key() {
        let info = SecretInfo {
            secret_name: "kecs-secret-api-key".into(),
            key: "value".into(),
            source: SecretSource::Ssm,
        };
        assert_eq!(placeholder_value(&info), "placeholder-ssm-kecs-secret-api-key");
    }

    #[test]
    fn backing_cluster_selects_client_key() {
        let mut cluster = Cluster {
            cluster_name: "prod".into(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/prod".into(),
            status: "ACTIVE".into(),
            region: "us-east-1".into(),
            account_id: "000000000000".into(),
            backing_cluster: None,
            created_at: time::OffsetDateTime::UNIX_EPOCH,
        };
        assert_eq!(KubeRuntime::client_key(&cluster), AMBIENT);

        cluster.backing_cluster = Some("kecs-prod".into());
        assert_eq!(KubeRuntime::client_key(&cluster), "kecs-prod");
    }
}
