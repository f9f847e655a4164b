//! Deterministic in-process runtime.
//!
//! Pods are records in memory. Each observation moves a pod one step along
//! created → pending → running → terminated; the running → terminated step waits for the
//! hold its [`TimingTable`] scenario prescribes, measured on the injected [`Clock`].

mod timing;
pub use timing::{Scenario, Selector, Timing, TimingTable};

use std::{collections::BTreeMap, sync::Arc};

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use time::OffsetDateTime;
use tracing::debug;

use kecs_core::{
    Clock, ClusterTable, SystemClock,
    convert::{NONESSENTIAL_SUFFIX, ecs_container_name},
    runtime::{ContainerObservation, ContainerState, PodObservation, PodPhase, RuntimeError, TaskRuntime, pod_location},
};
use kecs_model::{Cluster, HealthStatus, SecretInfo, Task, labels};

use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Created,
    Pending,
    Running,
    Terminated,
}

#[derive(Debug, Clone)]
struct SimPod {
    stage: Stage,
    started_at: Option<OffsetDateTime>,
    timing: Timing,
    /// Pod container names, in spec order.
    containers: Vec<String>,
}

impl SimPod {
    fn step(&mut self, now: OffsetDateTime) {
        self.stage = match self.stage {
            Stage::Created => Stage::Pending,
            Stage::Pending => {
                self.started_at = Some(now);
                Stage::Running
            }
            Stage::Running => match (self.timing.hold, self.started_at) {
                (Some(hold), Some(started)) if now - started >= hold => Stage::Terminated,
                _ => Stage::Running,
            },
            Stage::Terminated => Stage::Terminated,
        };
    }

    fn observation(&self) -> PodObservation {
        let phase = match self.stage {
            Stage::Created | Stage::Pending => PodPhase::Pending,
            Stage::Running => PodPhase::Running,
            Stage::Terminated if self.timing.exit_code == 0 => PodPhase::Succeeded,
            Stage::Terminated => PodPhase::Failed,
        };

        let mut obs = PodObservation::new(phase);
        obs.started_at = self.started_at;
        for name in &self.containers {
            let essential = !name.ends_with(NONESSENTIAL_SUFFIX);
            let (state, health) = match self.stage {
                Stage::Created | Stage::Pending => (ContainerState::Waiting, None),
                Stage::Running => (ContainerState::Running, Some(HealthStatus::Healthy)),
                // Only essential containers carry the scenario exit code.
                Stage::Terminated if !essential => continue,
                Stage::Terminated => {
                    let reason = if self.timing.exit_code == 0 { "Completed" } else { "Error" };
                    (
                        ContainerState::Terminated {
                            exit_code: self.timing.exit_code,
                            reason: Some(reason.to_string()),
                        },
                        None,
                    )
                }
            };
            obs = obs.with_container(ContainerObservation {
                name: ecs_container_name(name).to_string(),
                state,
                health,
            });
        }
        obs
    }
}

/// First container's command line: command and args joined by spaces.
fn command_line(pod: &Pod) -> String {
    let Some(first) = pod.spec.as_ref().and_then(|s| s.containers.first()) else {
        return String::new();
    };
    first
        .command
        .iter()
        .flatten()
        .chain(first.args.iter().flatten())
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
}

fn pod_key(namespace: &str, name: &str) -> String {
    format!("{namespace}/{name}")
}

/// Runtime that simulates pods without a cluster.
pub struct SimRuntime {
    clock: Arc<dyn Clock>,
    table: TimingTable,
    pods: ClusterTable<BTreeMap<String, SimPod>>,
}

impl SimRuntime {
    pub fn new(table: TimingTable) -> Self {
        Self {
            clock: Arc::new(SystemClock),
            table,
            pods: ClusterTable::new(),
        }
    }

    /// Measures holds on `clock` instead of wall time.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Removes a pod behind the engine's back, as an out-of-band `kubectl delete` would.
    pub fn evict(&self, cluster: &str, namespace: &str, name: &str) -> bool {
        self.pods
            .with_entry(cluster, |pods| pods.remove(&pod_key(namespace, name)))
            .is_some()
    }

    /// Number of live pods recorded for `cluster`.
    pub fn pod_count(&self, cluster: &str) -> usize {
        self.pods.with_existing(cluster, BTreeMap::len).unwrap_or(0)
    }
}

impl Default for SimRuntime {
    fn default() -> Self {
        Self::new(TimingTable::default())
    }
}

#[async_trait]
impl TaskRuntime for SimRuntime {
    fn name(&self) -> &'static str {
        "sim"
    }

    async fn launch(
        &self,
        cluster: &Cluster,
        pod: &Pod,
        _secrets: &BTreeMap<String, SecretInfo>,
    ) -> Result<(), RuntimeError> {
        let meta = &pod.metadata;
        let (Some(namespace), Some(name)) = (meta.namespace.as_deref(), meta.name.as_deref()) else {
            return Err(ExecError::InvalidPod("pod has no namespace or name".into()).into());
        };

        let family = meta.labels.as_ref().and_then(|l| l.get(labels::TASK_FAMILY)).map(String::as_str);
        let command = command_line(pod);
        let timing = self.table.resolve(&command, family);
        let containers = pod
            .spec
            .iter()
            .flat_map(|s| s.containers.iter())
            .map(|c| c.name.clone())
            .collect();

        let key = pod_key(namespace, name);
        let inserted = self.pods.with_entry(&cluster.cluster_name, |pods| {
            if pods.contains_key(&key) {
                return false;
            }
            pods.insert(
                key.clone(),
                SimPod {
                    stage: Stage::Created,
                    started_at: None,
                    timing,
                    containers,
                },
            );
            true
        });
        if !inserted {
            return Err(RuntimeError::Api(format!("pod {key} already exists")));
        }

        debug!(target: "kecs.exec.sim", pod = %key, %command, hold = ?timing.hold, exit_code = timing.exit_code, "pod created");
        Ok(())
    }

    async fn observe(&self, cluster: &Cluster, task: &Task) -> Result<PodObservation, RuntimeError> {
        let (namespace, name) = pod_location(cluster, task);
        let now = self.clock.now();
        let key = pod_key(&namespace, &name);

        self.pods
            .with_entry(&cluster.cluster_name, |pods| {
                pods.get_mut(&key).map(|pod| {
                    pod.step(now);
                    pod.observation()
                })
            })
            .ok_or_else(|| ExecError::NotFound { namespace, name }.into())
    }

    async fn delete(&self, cluster: &Cluster, task: &Task) -> Result<(), RuntimeError> {
        let (namespace, name) = pod_location(cluster, task);
        let key = pod_key(&namespace, &name);
        match self.pods.with_entry(&cluster.cluster_name, |pods| pods.remove(&key)) {
            Some(_) => {
                debug!(target: "kecs.exec.sim", pod = %key, "pod deleted");
                Ok(())
            }
            None => Err(ExecError::NotFound { namespace, name }.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use k8s_openapi::{
        api::core::v1::{Container, PodSpec},
        apimachinery::pkg::apis::meta::v1::ObjectMeta,
    };
    use kecs_core::ManualClock;

    use super::*;

    fn cluster() -> Cluster {
        Cluster {
            cluster_name: "default".into(),
            cluster_arn: "arn:aws:ecs:us-east-1:000000000000:cluster/default".into(),
            status: "ACTIVE".into(),
            region: "us-east-1".into(),
            account_id: "000000000000".into(),
            backing_cluster: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    fn pod(name: &str, command: &[&str]) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default-us-east-1".into()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![
                    Container {
                        name: "app".into(),
                        command: Some(command.iter().map(|s| s.to_string()).collect()),
                        ..Default::default()
                    },
                    Container {
                        name: format!("log{NONESSENTIAL_SUFFIX}"),
                        ..Default::default()
                    },
                ],
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn task(id: &str) -> Task {
        serde_json::from_value(serde_json::json!({
            "taskArn": format!("arn:aws:ecs:us-east-1:000000000000:task/default/{id}"),
            "clusterArn": "arn:aws:ecs:us-east-1:000000000000:cluster/default",
            "taskDefinitionArn": "arn:aws:ecs:us-east-1:000000000000:task-definition/web:1",
            "lastStatus": "PROVISIONING",
            "desiredStatus": "RUNNING",
            "launchType": "FARGATE",
            "version": 1,
            "createdAt": "2024-01-01T00:00:00Z"
        }))
        .unwrap()
    }

    fn runtime() -> (SimRuntime, ManualClock) {
        let clock = ManualClock::starting_now();
        let rt = SimRuntime::default().with_clock(Arc::new(clock.clone()));
        (rt, clock)
    }

    #[tokio::test]
    async fn pod_steps_through_phases() {
        let (rt, clock) = runtime();
        let c = cluster();
        rt.launch(&c, &pod("t1", &["sh", "-c", "exit 1"]), &BTreeMap::new()).await.unwrap();

        let t = task("t1");
        assert_eq!(rt.observe(&c, &t).await.unwrap().phase, PodPhase::Pending);
        let running = rt.observe(&c, &t).await.unwrap();
        assert_eq!(running.phase, PodPhase::Running);
        assert!(running.started_at.is_some());

        clock.advance(Duration::from_millis(500));
        assert_eq!(rt.observe(&c, &t).await.unwrap().phase, PodPhase::Running);

        clock.advance(Duration::from_millis(500));
        let done = rt.observe(&c, &t).await.unwrap();
        assert_eq!(done.phase, PodPhase::Failed);
        assert_eq!(done.containers.len(), 1);
        assert_eq!(
            done.container("app").unwrap().state,
            ContainerState::Terminated {
                exit_code: 1,
                reason: Some("Error".into())
            }
        );
    }

    #[tokio::test]
    async fn nonessential_suffix_is_stripped() {
        let (rt, _clock) = runtime();
        let c = cluster();
        rt.launch(&c, &pod("t1", &["sleep", "300"]), &BTreeMap::new()).await.unwrap();

        let t = task("t1");
        rt.observe(&c, &t).await.unwrap();
        let obs = rt.observe(&c, &t).await.unwrap();
        assert!(obs.container("log").is_some());
    }

    #[tokio::test]
    async fn long_running_pod_never_terminates() {
        let (rt, clock) = runtime();
        let c = cluster();
        rt.launch(&c, &pod("t1", &["sleep", "300"]), &BTreeMap::new()).await.unwrap();

        let t = task("t1");
        rt.observe(&c, &t).await.unwrap();
        rt.observe(&c, &t).await.unwrap();
        clock.advance(Duration::from_secs(3600));
        assert_eq!(rt.observe(&c, &t).await.unwrap().phase, PodPhase::Running);
    }

    #[tokio::test]
    async fn delete_and_evict_remove_pods() {
        let (rt, _clock) = runtime();
        let c = cluster();
        rt.launch(&c, &pod("t1", &["true"]), &BTreeMap::new()).await.unwrap();
        rt.launch(&c, &pod("t2", &["true"]), &BTreeMap::new()).await.unwrap();
        assert_eq!(rt.pod_count("default"), 2);

        rt.delete(&c, &task("t1")).await.unwrap();
        assert!(rt.delete(&c, &task("t1")).await.unwrap_err().is_not_found());

        assert!(rt.evict("default", "default-us-east-1", "t2"));
        assert!(rt.observe(&c, &task("t2")).await.unwrap_err().is_not_found());
        assert_eq!(rt.pod_count("default"), 0);
    }

    #[tokio::test]
    async fn duplicate_launch_is_rejected() {
        let (rt, _clock) = runtime();
        let c = cluster();
        rt.launch(&c, &pod("t1", &["true"]), &BTreeMap::new()).await.unwrap();
        let err = rt.launch(&c, &pod("t1", &["true"]), &BTreeMap::new()).await.unwrap_err();
        assert!(matches!(err, RuntimeError::Api(_)));
    }
}
