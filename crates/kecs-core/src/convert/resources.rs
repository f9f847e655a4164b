use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::ResourceRequirements, apimachinery::pkg::api::resource::Quantity};

use kecs_model::{ContainerDefinition, ContainerOverride};

use super::container::ContainerDraft;

const SHARES_PER_VCPU: i64 = 1024;
const MILLIS_PER_VCPU: i64 = 1000;

/// Container resources in Kubernetes units: CPU in millicores, memory in MiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(super) struct Resources {
    /// Applied as both request and limit.
    pub cpu_millis: Option<i64>,
    pub memory_request_mib: Option<i64>,
    pub memory_limit_mib: Option<i64>,
}

impl Resources {
    pub(super) fn from_definition(def: &ContainerDefinition) -> Self {
        let mut out = Resources {
            cpu_millis: def.cpu.map(shares_to_millis),
            ..Default::default()
        };
        if let Some(memory) = def.memory {
            out.set_memory(memory);
        } else if let Some(reservation) = def.memory_reservation {
            out.memory_request_mib = Some(reservation);
        }
        out
    }

    pub(super) fn apply_override(&mut self, co: &ContainerOverride) {
        if let Some(cpu) = co.cpu {
            self.cpu_millis = Some(shares_to_millis(cpu));
        }
        if let Some(memory) = co.memory {
            self.set_memory(memory);
        }
        if let Some(reservation) = co.memory_reservation {
            self.memory_request_mib = Some(reservation);
        }
    }

    fn set_memory(&mut self, mib: i64) {
        self.memory_request_mib = Some(mib);
        self.memory_limit_mib = Some(mib);
    }

    fn has_requests(&self) -> bool {
        self.cpu_millis.is_some() || self.memory_request_mib.is_some()
    }

    pub(super) fn render(&self) -> Option<ResourceRequirements> {
        let mut requests = BTreeMap::new();
        let mut limits = BTreeMap::new();

        if let Some(cpu) = self.cpu_millis {
            requests.insert("cpu".to_string(), Quantity(format!("{cpu}m")));
            limits.insert("cpu".to_string(), Quantity(format!("{cpu}m")));
        }
        if let Some(mem) = self.memory_request_mib {
            requests.insert("memory".to_string(), Quantity(format!("{mem}Mi")));
        }
        if let Some(mem) = self.memory_limit_mib {
            limits.insert("memory".to_string(), Quantity(format!("{mem}Mi")));
        }

        if requests.is_empty() && limits.is_empty() {
            return None;
        }
        Some(ResourceRequirements {
            requests: (!requests.is_empty()).then_some(requests),
            limits: (!limits.is_empty()).then_some(limits),
            ..Default::default()
        })
    }
}

#[inline]
fn shares_to_millis(shares: i64) -> i64 {
    shares.saturating_mul(MILLIS_PER_VCPU) / SHARES_PER_VCPU
}

/// Task-level CPU in millicores. Accepts ECS shares (`"256"`) or `"0.25 vCPU"`.
pub fn parse_task_cpu(raw: &str) -> Option<i64> {
    let raw = raw.trim();
    let millis = if let Some(vcpu) = raw.strip_suffix("vCPU") {
        let vcpu: f64 = vcpu.trim().parse().ok()?;
        (vcpu * MILLIS_PER_VCPU as f64) as i64
    } else {
        shares_to_millis(raw.parse().ok()?)
    };
    (millis > 0).then_some(millis)
}

/// Task-level memory in MiB.
pub fn parse_task_memory(raw: &str) -> Option<i64> {
    raw.trim().parse().ok().filter(|m: &i64| *m > 0)
}

/// Fits container resources under a task-level budget.
///
/// Containers without requests split whatever the sized ones leave over. When every
/// container is sized, requests are scaled proportionally to the budget.
pub(super) fn apply_task_limits(drafts: &mut [ContainerDraft<'_>], cpu: Option<i64>, memory: Option<i64>) {
    let cpu = cpu.unwrap_or(0);
    let memory = memory.unwrap_or(0);
    if cpu <= 0 && memory <= 0 {
        return;
    }

    let requested_cpu: i64 = drafts.iter().filter_map(|d| d.resources.cpu_millis).sum();
    let requested_memory: i64 = drafts.iter().filter_map(|d| d.resources.memory_request_mib).sum();
    let unsized_count = drafts.iter().filter(|d| !d.resources.has_requests()).count() as i64;

    if unsized_count > 0 {
        let cpu_each = (cpu - requested_cpu) / unsized_count;
        let memory_each = (memory - requested_memory) / unsized_count;

        for draft in drafts.iter_mut() {
            let res = &mut draft.resources;
            if res.cpu_millis.is_none() && cpu_each > 0 {
                res.cpu_millis = Some(cpu_each);
            }
            if res.memory_request_mib.is_none() && memory_each > 0 {
                res.set_memory(memory_each);
            }
        }
        return;
    }

    if cpu > 0 && requested_cpu > 0 {
        let scale = cpu as f64 / requested_cpu as f64;
        for draft in drafts.iter_mut() {
            if let Some(c) = draft.resources.cpu_millis.as_mut() {
                *c = (*c as f64 * scale) as i64;
            }
        }
    }
    if memory > 0 && requested_memory > 0 {
        let scale = memory as f64 / requested_memory as f64;
        for draft in drafts.iter_mut() {
            if let Some(m) = draft.resources.memory_request_mib {
                draft.resources.set_memory((m as f64 * scale) as i64);
            }
        }
    }
}
