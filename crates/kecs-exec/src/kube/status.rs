use k8s_openapi::api::core::v1::{ContainerStatus, Pod};
use time::OffsetDateTime;

use kecs_core::{
    convert::ecs_container_name,
    runtime::{ContainerObservation, ContainerState, PodObservation, PodPhase},
};
use kecs_model::HealthStatus;

pub(super) fn observe_pod(pod: &Pod) -> PodObservation {
    let Some(status) = pod.status.as_ref() else {
        return PodObservation::new(PodPhase::Pending);
    };

    let phase = match status.phase.as_deref() {
        Some("Pending") => PodPhase::Pending,
        Some("Running") => PodPhase::Running,
        Some("Succeeded") => PodPhase::Succeeded,
        Some("Failed") => PodPhase::Failed,
        _ => PodPhase::Unknown,
    };

    let mut obs = PodObservation::new(phase);
    obs.started_at = status
        .start_time
        .as_ref()
        .and_then(|t| OffsetDateTime::from_unix_timestamp(t.0.timestamp()).ok());
    obs.reason = status
        .message
        .clone()
        .filter(|m| !m.is_empty())
        .or_else(|| status.reason.clone().filter(|r| !r.is_empty()));
    obs.containers = status
        .container_statuses
        .iter()
        .flatten()
        .map(observe_container)
        .collect();
    obs
}

fn observe_container(cs: &ContainerStatus) -> ContainerObservation {
    let state = cs.state.as_ref();
    let terminated = state.and_then(|s| s.terminated.as_ref());

    let container_state = if let Some(t) = terminated {
        ContainerState::Terminated {
            exit_code: t.exit_code,
            reason: t.message.clone().or_else(|| t.reason.clone()),
        }
    } else if state.is_some_and(|s| s.running.is_some()) {
        ContainerState::Running
    } else {
        ContainerState::Waiting
    };

    let health = if cs.ready {
        HealthStatus::Healthy
    } else if cs.restart_count > 0 || terminated.is_some_and(|t| t.exit_code != 0) {
        HealthStatus::Unhealthy
    } else {
        HealthStatus::Unknown
    };

    ContainerObservation {
        name: ecs_container_name(&cs.name).to_string(),
        state: container_state,
        health: Some(health),
    }
}
