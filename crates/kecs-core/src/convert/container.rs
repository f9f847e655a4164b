use k8s_openapi::{
    api::core::v1::{
        Container, ContainerPort, EnvVar, EnvVarSource, ExecAction, HTTPGetAction, Probe, SecretKeySelector,
        SecurityContext,
    },
    apimachinery::pkg::util::intstr::IntOrString,
};

use kecs_model::{ContainerDefinition, ContainerOverride, HealthCheck, PortMapping};

use super::{ConvertError, NONESSENTIAL_SUFFIX, resources::Resources};
use crate::secret::parse_secret_arn;

const DEFAULT_INTERVAL: i32 = 30;
const DEFAULT_TIMEOUT: i32 = 5;
const DEFAULT_RETRIES: i32 = 3;
const DEFAULT_START_PERIOD: i32 = 30;
const READINESS_MAX_DELAY: i32 = 10;
const DEFAULT_HTTP_PORT: i32 = 80;

/// A container on its way from an ECS definition to a pod container.
///
/// Overrides and task-level limits are applied to the draft; [`ContainerDraft::render`]
/// produces the final Kubernetes object.
pub(super) struct ContainerDraft<'a> {
    def: &'a ContainerDefinition,
    name: String,
    image: String,
    command: Option<Vec<String>>,
    args: Option<Vec<String>>,
    env: Vec<EnvVar>,
    pub(super) resources: Resources,
}

impl<'a> ContainerDraft<'a> {
    pub(super) fn from_definition(index: usize, def: &'a ContainerDefinition) -> Result<Self, ConvertError> {
        let name = def
            .name
            .clone()
            .filter(|n| !n.is_empty())
            .ok_or(ConvertError::MissingField { index, field: "name" })?;
        let image = def
            .image
            .clone()
            .filter(|i| !i.is_empty())
            .ok_or(ConvertError::MissingField { index, field: "image" })?;

        let (command, args) = if def.entry_point.is_empty() {
            (non_empty(&def.command), None)
        } else {
            (Some(def.entry_point.clone()), non_empty(&def.command))
        };

        Ok(Self {
            def,
            name,
            image,
            command,
            args,
            env: environment(def),
            resources: Resources::from_definition(def),
        })
    }

    pub(super) fn ecs_name(&self) -> &str {
        &self.name
    }

    pub(super) fn apply_override(&mut self, co: &ContainerOverride) {
        if let Some(command) = &co.command {
            // The override command plays the role ECS `command` plays: args after an entrypoint.
            if self.def.entry_point.is_empty() {
                self.command = Some(command.clone());
            } else {
                self.args = Some(command.clone());
            }
        }

        for kv in &co.environment {
            let (Some(name), Some(value)) = (&kv.name, &kv.value) else {
                continue;
            };
            match self.env.iter_mut().find(|e| &e.name == name) {
                Some(existing) => {
                    existing.value = Some(value.clone());
                    existing.value_from = None;
                }
                None => self.env.push(plain_env(name, value)),
            }
        }

        self.resources.apply_override(co);
    }

    pub(super) fn render(self) -> Container {
        let def = self.def;

        let name = if def.is_essential() {
            self.name
        } else {
            format!("{}{NONESSENTIAL_SUFFIX}", self.name)
        };

        let ports: Vec<ContainerPort> = def.port_mappings.iter().filter_map(port).collect();

        let (liveness, readiness) = match &def.health_check {
            Some(hc) => {
                let liveness = probe(hc);
                let mut readiness = liveness.clone();
                readiness.initial_delay_seconds = readiness
                    .initial_delay_seconds
                    .map(|d| d.min(READINESS_MAX_DELAY));
                (Some(liveness), Some(readiness))
            }
            None => (None, None),
        };

        Container {
            name,
            image: Some(self.image),
            image_pull_policy: Some("IfNotPresent".to_string()),
            command: self.command,
            args: self.args,
            env: (!self.env.is_empty()).then_some(self.env),
            ports: (!ports.is_empty()).then_some(ports),
            resources: self.resources.render(),
            working_dir: def.working_directory.clone(),
            liveness_probe: liveness,
            readiness_probe: readiness,
            security_context: security_context(def),
            ..Default::default()
        }
    }
}

fn non_empty(v: &[String]) -> Option<Vec<String>> {
    (!v.is_empty()).then(|| v.to_vec())
}

fn plain_env(name: &str, value: &str) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        value_from: None,
    }
}

/// Plain variables first, then secret-backed ones. Unresolvable secrets are dropped.
fn environment(def: &ContainerDefinition) -> Vec<EnvVar> {
    let plain = def.environment.iter().filter_map(|kv| match (&kv.name, &kv.value) {
        (Some(name), Some(value)) => Some(plain_env(name, value)),
        _ => None,
    });

    let secrets = def.secrets.iter().filter_map(|s| {
        let info = parse_secret_arn(&s.value_from)?;
        Some(EnvVar {
            name: s.name.clone(),
            value: None,
            value_from: Some(EnvVarSource {
                secret_key_ref: Some(SecretKeySelector {
                    name: info.secret_name,
                    key: info.key,
                    optional: None,
                }),
                ..Default::default()
            }),
        })
    });

    plain.chain(secrets).collect()
}

fn port(mapping: &PortMapping) -> Option<ContainerPort> {
    let container_port = mapping.container_port?;
    let protocol = match mapping.protocol.as_deref().map(str::to_ascii_lowercase).as_deref() {
        Some("udp") => "UDP",
        Some("sctp") => "SCTP",
        _ => "TCP",
    };
    Some(ContainerPort {
        container_port,
        host_port: mapping.host_port,
        name: mapping.name.clone(),
        protocol: Some(protocol.to_string()),
        ..Default::default()
    })
}

fn probe(hc: &HealthCheck) -> Probe {
    let mut probe = Probe {
        period_seconds: Some(hc.interval.unwrap_or(DEFAULT_INTERVAL)),
        timeout_seconds: Some(hc.timeout.unwrap_or(DEFAULT_TIMEOUT)),
        failure_threshold: Some(hc.retries.unwrap_or(DEFAULT_RETRIES)),
        initial_delay_seconds: Some(hc.start_period.unwrap_or(DEFAULT_START_PERIOD)),
        success_threshold: Some(1),
        ..Default::default()
    };

    let exec = |command: Vec<String>| {
        Some(ExecAction {
            command: Some(command),
        })
    };

    match hc.command.as_slice() {
        [kind, cmd, ..] if kind == "CMD-SHELL" => {
            probe.exec = exec(vec!["sh".into(), "-c".into(), cmd.clone()]);
        }
        [kind, rest @ ..] if kind == "CMD" && !rest.is_empty() => {
            probe.exec = exec(rest.to_vec());
        }
        [kind, path, rest @ ..] if kind == "HTTP" => {
            let port = rest
                .first()
                .and_then(|p| p.parse::<i32>().ok())
                .unwrap_or(DEFAULT_HTTP_PORT);
            probe.http_get = Some(HTTPGetAction {
                path: Some(path.clone()),
                port: IntOrString::Int(port),
                ..Default::default()
            });
        }
        [kind, ..] if kind == "CMD-SHELL" || kind == "CMD" || kind == "HTTP" => {}
        [] => {}
        other => probe.exec = exec(other.to_vec()),
    }
    probe
}

fn security_context(def: &ContainerDefinition) -> Option<SecurityContext> {
    let mut ctx = SecurityContext::default();
    let mut set = false;

    if let Some(user) = &def.user {
        let mut parts = user.split(':');
        ctx.run_as_user = parts.next().and_then(|u| u.parse().ok());
        ctx.run_as_group = parts.next().and_then(|g| g.parse().ok());
        set = true;
    }
    if def.privileged == Some(true) {
        ctx.privileged = Some(true);
        set = true;
    }
    if def.readonly_root_filesystem == Some(true) {
        ctx.read_only_root_filesystem = Some(true);
        set = true;
    }
    set.then_some(ctx)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hc(command: &[&str]) -> HealthCheck {
        HealthCheck {
            command: command.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn shell_health_check_uses_sh() {
        let p = probe(&hc(&["CMD-SHELL", "curl -f localhost || exit 1"]));
        assert_eq!(
            p.exec.unwrap().command.unwrap(),
            vec!["sh", "-c", "curl -f localhost || exit 1"]
        );
        assert_eq!(p.period_seconds, Some(30));
        assert_eq!(p.timeout_seconds, Some(5));
        assert_eq!(p.failure_threshold, Some(3));
        assert_eq!(p.initial_delay_seconds, Some(30));
    }

    #[test]
    fn http_health_check_defaults_port() {
        let p = probe(&hc(&["HTTP", "/healthz"]));
        let get = p.http_get.unwrap();
        assert_eq!(get.path.as_deref(), Some("/healthz"));
        assert_eq!(get.port, IntOrString::Int(80));

        let p = probe(&hc(&["HTTP", "/healthz", "8080"]));
        assert_eq!(p.http_get.unwrap().port, IntOrString::Int(8080));
    }

    #[test]
    fn unknown_health_check_is_exec_verbatim() {
        let p = probe(&hc(&["/bin/check", "--quick"]));
        assert_eq!(p.exec.unwrap().command.unwrap(), vec!["/bin/check", "--quick"]);
    }

    #[test]
    fn readiness_delay_is_capped() {
        let def = ContainerDefinition {
            name: Some("app".into()),
            image: Some("x".into()),
            health_check: Some(HealthCheck {
                command: vec!["CMD".into(), "true".into()],
                start_period: Some(60),
                ..Default::default()
            }),
            ..Default::default()
        };
        let c = ContainerDraft::from_definition(0, &def).unwrap().render();
        assert_eq!(c.liveness_probe.unwrap().initial_delay_seconds, Some(60));
        assert_eq!(c.readiness_probe.unwrap().initial_delay_seconds, Some(10));
    }

    #[test]
    fn user_and_flags_map_to_security_context() {
        let def = ContainerDefinition {
            user: Some("1000:2000".into()),
            privileged: Some(true),
            ..Default::default()
        };
        let ctx = security_context(&def).unwrap();
        assert_eq!(ctx.run_as_user, Some(1000));
        assert_eq!(ctx.run_as_group, Some(2000));
        assert_eq!(ctx.privileged, Some(true));
        assert!(ctx.read_only_root_filesystem.is_none());

        assert!(security_context(&ContainerDefinition::default()).is_none());
    }

    #[test]
    fn command_without_entrypoint_is_k8s_command() {
        let def = ContainerDefinition {
            name: Some("app".into()),
            image: Some("x".into()),
            command: vec!["sleep".into(), "5".into()],
            working_directory: Some("/srv".into()),
            ..Default::default()
        };
        let c = ContainerDraft::from_definition(0, &def).unwrap().render();
        assert_eq!(c.command.unwrap(), vec!["sleep", "5"]);
        assert!(c.args.is_none());
        assert_eq!(c.working_dir.as_deref(), Some("/srv"));
    }
}
