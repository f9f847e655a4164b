use std::io::IsTerminal;

use serde::Deserialize;

use super::format::LoggerFormat;

/// Crates whose info-level chatter drowns the control plane's own logs.
const QUIET_CRATES: &[&str] = &["kube_client", "hyper", "hyper_util", "h2", "tower", "rustls"];

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// A bare level (`debug`) or a full `EnvFilter` directive string.
    pub level: String,
    pub with_targets: bool,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
        }
    }
}

impl LoggerConfig {
    /// Filter directives handed to `EnvFilter`.
    ///
    /// A bare level is widened with `warn` caps for the HTTP and Kubernetes client stacks;
    /// anything containing `=` or `,` is taken verbatim.
    pub fn directives(&self) -> String {
        let level = self.level.trim();
        if level.contains('=') || level.contains(',') {
            return level.to_string();
        }
        let mut out = level.to_string();
        for name in QUIET_CRATES {
            out.push_str(&format!(",{name}=warn"));
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_level_quiets_client_stacks() {
        let cfg = LoggerConfig {
            level: "debug".into(),
            ..Default::default()
        };
        let d = cfg.directives();
        assert!(d.starts_with("debug,"));
        assert!(d.contains("kube_client=warn"));
        assert!(d.contains("hyper=warn"));
    }

    #[test]
    fn explicit_directives_are_untouched() {
        let cfg = LoggerConfig {
            level: "info,kecs.worker=trace".into(),
            ..Default::default()
        };
        assert_eq!(cfg.directives(), "info,kecs.worker=trace");
    }

    #[test]
    fn deserializes_camel_case_with_defaults() {
        let cfg: LoggerConfig = serde_json::from_str(r#"{"format":"json","withTargets":false}"#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert!(!cfg.with_targets);
        assert_eq!(cfg.level, "info");
    }
}
