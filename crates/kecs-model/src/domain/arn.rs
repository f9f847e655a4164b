//! ARN builders and parsers for the ECS resources the engine owns.

pub fn cluster_arn(region: &str, account: &str, cluster: &str) -> String {
    format!("arn:aws:ecs:{region}:{account}:cluster/{cluster}")
}

pub fn task_arn(region: &str, account: &str, cluster: &str, task_id: &str) -> String {
    format!("arn:aws:ecs:{region}:{account}:task/{cluster}/{task_id}")
}

pub fn task_definition_arn(region: &str, account: &str, family: &str, revision: i32) -> String {
    format!("arn:aws:ecs:{region}:{account}:task-definition/{family}:{revision}")
}

pub fn container_arn(task_arn: &str, container: &str) -> String {
    format!("{task_arn}/container/{container}")
}

#[inline]
pub fn is_arn(s: &str) -> bool {
    s.starts_with("arn:")
}

/// Last `/`-separated segment, or the input itself.
pub fn resource_id(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}

/// Cluster name from a cluster ARN or a plain name.
pub fn cluster_name(name_or_arn: &str) -> &str {
    if is_arn(name_or_arn) {
        name_or_arn
            .split_once(":cluster/")
            .map(|(_, name)| name)
            .unwrap_or(name_or_arn)
    } else {
        name_or_arn
    }
}

/// Family part of a task definition ARN (`...:task-definition/<family>:<revision>`).
pub fn task_definition_family(arn: &str) -> Option<&str> {
    let (_, rest) = arn.split_once(":task-definition/")?;
    Some(rest.rsplit_once(':').map(|(family, _)| family).unwrap_or(rest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_task_arn() {
        assert_eq!(
            task_arn("us-east-1", "123456789012", "default", "abc"),
            "arn:aws:ecs:us-east-1:123456789012:task/default/abc"
        );
    }

    #[test]
    fn cluster_name_accepts_both_forms() {
        assert_eq!(cluster_name("default"), "default");
        assert_eq!(
            cluster_name("arn:aws:ecs:us-east-1:123456789012:cluster/prod"),
            "prod"
        );
    }

    #[test]
    fn parses_task_definition_family() {
        let arn = task_definition_arn("us-east-1", "1", "web-app", 7);
        assert_eq!(task_definition_family(&arn), Some("web-app"));
        assert_eq!(task_definition_family("web-app:7"), None);
    }

    #[test]
    fn resource_id_of_plain_id() {
        assert_eq!(resource_id("abc"), "abc");
        assert_eq!(resource_id("arn:aws:ecs:r:a:task/c/xyz"), "xyz");
    }
}
