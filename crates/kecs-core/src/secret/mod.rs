//! Secret reference resolution.
//!
//! Maps Secrets Manager and SSM Parameter Store ARNs onto local Kubernetes secrets named
//! `kecs-secret-<sanitized name>`. Names are derived, never hashed, so they stay readable
//! in `kubectl get secrets`.

use std::collections::BTreeMap;

use kecs_model::{ContainerDefinition, SecretInfo, SecretSource};

const NAME_PREFIX: &str = "kecs-secret-";
const DEFAULT_KEY: &str = "value";
const SUFFIX_LEN: usize = 6;

/// Resolves a secret ARN into the local secret it maps to.
///
/// Returns `None` for malformed ARNs; callers drop the variable instead of failing the task.
pub fn parse_secret_arn(arn: &str) -> Option<SecretInfo> {
    let parts: Vec<&str> = arn.split(':').collect();
    if parts.len() < 6 {
        return None;
    }

    let (raw_name, key, source) = match parts[2] {
        "secretsmanager" => {
            // arn:aws:secretsmanager:<region>:<account>:secret:<name>-<suffix>[:<key>[:<stage>[:<version>]]]
            let name = parts.get(6).copied().unwrap_or_default();
            let key = match parts.get(7).copied() {
                Some(k) if !k.is_empty() && k != "*" => k,
                _ => DEFAULT_KEY,
            };
            (strip_random_suffix(name), key, SecretSource::SecretsManager)
        }
        "ssm" => {
            // arn:aws:ssm:<region>:<account>:parameter/<path>
            let name = parts[5].strip_prefix("parameter/").unwrap_or(parts[5]);
            (name, DEFAULT_KEY, SecretSource::Ssm)
        }
        _ => return None,
    };

    let sanitized = sanitize(raw_name);
    if sanitized.is_empty() {
        return None;
    }

    Some(SecretInfo {
        secret_name: format!("{NAME_PREFIX}{sanitized}"),
        key: key.to_string(),
        source,
    })
}

/// Collects every secret referenced by a task definition, keyed and deduplicated by ARN.
pub fn collect_secrets(definitions: &[ContainerDefinition]) -> BTreeMap<String, SecretInfo> {
    let mut out = BTreeMap::new();
    for secret in definitions.iter().flat_map(|d| d.secrets.iter()) {
        if out.contains_key(&secret.value_from) {
            continue;
        }
        match parse_secret_arn(&secret.value_from) {
            Some(info) => {
                out.insert(secret.value_from.clone(), info);
            }
            None => {
                tracing::warn!(arn = %secret.value_from, env = %secret.name, "unresolvable secret reference skipped");
            }
        }
    }
    out
}

/// Lower-cases, collapses runs of non-alphanumerics into one `-`, and trims the ends.
pub fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_dash = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Drops the `-XXXXXX` suffix Secrets Manager appends to secret names.
fn strip_random_suffix(name: &str) -> &str {
    let Some((head, tail)) = name.rsplit_once('-') else {
        return name;
    };
    if !head.is_empty() && tail.len() == SUFFIX_LEN && tail.chars().all(|c| c.is_ascii_alphanumeric()) {
        head
    } else {
        name
    }
}

#[cfg(test)]
mod tests {
    use kecs_model::SecretRef;

    use super::*;

    #[test]
    fn secrets_manager_with_json_key() {
        let info =
            parse_secret_arn("arn:aws:secretsmanager:us-east-1:123456789012:secret:db-pass-XyZ123:password::")
                .unwrap();
        assert_eq!(info.secret_name, "kecs-secret-db-pass");
        assert_eq!(info.key, "password");
        assert_eq!(info.source, SecretSource::SecretsManager);
    }

    #[test]
    fn secrets_manager_without_key_or_wildcard() {
        let plain = parse_secret_arn("arn:aws:secretsmanager:us-east-1:1:secret:App_Token-abcdef").unwrap();
        assert_eq!(plain.secret_name, "kecs-secret-app-token");
        assert_eq!(plain.key, "value");

        let wildcard = parse_secret_arn("arn:aws:secretsmanager:us-east-1:1:secret:app-abcdef:*").unwrap();
        assert_eq!(wildcard.key, "value");
    }

    #[test]
    fn short_suffix_is_kept() {
        let info = parse_secret_arn("arn:aws:secretsmanager:us-east-1:1:secret:my-db").unwrap();
        assert_eq!(info.secret_name, "kecs-secret-my-db");
    }

    #[test]
    fn ssm_parameter_path() {
        let info = parse_secret_arn("arn:aws:ssm:us-east-1:123456789012:parameter/api/key").unwrap();
        assert_eq!(info.secret_name, "kecs-secret-api-key");
        assert_eq!(info.key, "value");
        assert_eq!(info.source, SecretSource::Ssm);
    }

    #[test]
    fn malformed_arns_do_not_resolve() {
        assert!(parse_secret_arn("not-an-arn").is_none());
        assert!(parse_secret_arn("arn:aws:s3:us-east-1:1:bucket").is_none());
        assert!(parse_secret_arn("arn:aws:secretsmanager:us-east-1:1:secret").is_none());
        assert!(parse_secret_arn("arn:aws:ssm:us-east-1:1:parameter/").is_none());
    }

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize("--Foo__Bar..baz--"), "foo-bar-baz");
        assert_eq!(sanitize("///"), "");
    }

    #[test]
    fn identical_arns_collect_once() {
        let arn = "arn:aws:ssm:us-east-1:1:parameter/shared";
        let def = |name: &str, env: &str| ContainerDefinition {
            name: Some(name.into()),
            image: Some("busybox".into()),
            secrets: vec![SecretRef {
                name: env.into(),
                value_from: arn.into(),
            }],
            ..Default::default()
        };

        let secrets = collect_secrets(&[def("a", "TOKEN"), def("b", "API_TOKEN")]);
        assert_eq!(secrets.len(), 1);
        assert_eq!(secrets[arn].secret_name, "kecs-secret-shared");
    }
}
