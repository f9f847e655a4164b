use std::{fs, net::SocketAddr, path::PathBuf};

use anyhow::Context;
use clap::Parser;

use kecs_core::EngineConfig;
use kecs_exec::KubeRuntimeConfig;
use kecs_observe::{LoggerConfig, LoggerFormat};

/// Local ECS control plane that runs tasks as Kubernetes pods.
#[derive(Parser, Debug)]
#[command(name = "kecs", version, about, long_about = None)]
pub struct Cli {
    /// Address the ECS API listens on
    #[arg(long, env = "KECS_LISTEN", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// JSON file with engine settings; flags below override it
    #[arg(long, env = "KECS_CONFIG")]
    pub config: Option<PathBuf>,

    #[arg(long, env = "KECS_REGION")]
    pub region: Option<String>,

    #[arg(long, env = "KECS_ACCOUNT_ID")]
    pub account_id: Option<String>,

    /// Cluster used when a request names none; created at startup
    #[arg(long, env = "KECS_DEFAULT_CLUSTER")]
    pub default_cluster: Option<String>,

    /// Run tasks on the simulated runtime instead of Kubernetes
    #[arg(long, env = "KECS_TEST_MODE")]
    pub test_mode: bool,

    /// Kubeconfig context prefix for backing clusters
    #[arg(long, env = "KECS_CONTEXT_PREFIX", default_value = "k3d-")]
    pub context_prefix: String,

    /// Log format: text, json or journald
    #[arg(long, env = "KECS_LOG_FORMAT", default_value = "text")]
    pub log_format: LoggerFormat,

    /// Level or EnvFilter directives
    #[arg(long, env = "KECS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Disable the retention sweep
    #[arg(long, env = "KECS_CLEANUP_DISABLED")]
    pub no_cleanup: bool,

    #[arg(long, env = "KECS_CLEANUP_INTERVAL_SECS")]
    pub cleanup_interval_secs: Option<u64>,

    #[arg(long, env = "KECS_TASK_RETENTION_SECS")]
    pub task_retention_secs: Option<u64>,

    /// Disable background status sync
    #[arg(long, env = "KECS_SYNC_DISABLED")]
    pub no_sync: bool,

    #[arg(long, env = "KECS_SYNC_INTERVAL_MS")]
    pub sync_interval_ms: Option<u64>,
}

impl Cli {
    /// Engine settings: test-mode preset or defaults, then the config file, then flags.
    pub fn engine_config(&self) -> anyhow::Result<EngineConfig> {
        let mut cfg = match &self.config {
            Some(path) => {
                let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
                serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))?
            }
            None if self.test_mode => EngineConfig::test_mode(),
            None => EngineConfig::default(),
        };

        if self.test_mode {
            cfg.test_mode = true;
            cfg.resource_guard = true;
        }
        if let Some(region) = &self.region {
            cfg.region = region.clone();
        }
        if let Some(account) = &self.account_id {
            cfg.account_id = account.clone();
        }
        if let Some(cluster) = &self.default_cluster {
            cfg.default_cluster = cluster.clone();
        }
        if self.no_cleanup {
            cfg.cleanup.enabled = false;
        }
        if let Some(secs) = self.cleanup_interval_secs {
            cfg.cleanup.interval_secs = secs;
        }
        if let Some(secs) = self.task_retention_secs {
            cfg.cleanup.task_retention_secs = secs;
        }
        if self.no_sync {
            cfg.sync.enabled = false;
        }
        if let Some(ms) = self.sync_interval_ms {
            cfg.sync.interval_ms = ms;
        }

        cfg.validate()?;
        Ok(cfg)
    }

    pub fn logger_config(&self) -> LoggerConfig {
        LoggerConfig {
            format: self.log_format,
            level: self.log_level.clone(),
            ..Default::default()
        }
    }

    pub fn kube_config(&self) -> KubeRuntimeConfig {
        KubeRuntimeConfig {
            context_prefix: self.context_prefix.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("kecs").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_mode_turns_on_guard_and_fast_sync() {
        let cfg = parse(&["--test-mode"]).engine_config().unwrap();
        assert!(cfg.test_mode);
        assert!(cfg.resource_guard);
        assert_eq!(cfg.sync.interval_ms, 1_000);
    }

    #[test]
    fn flags_override_defaults() {
        let cli = parse(&[
            "--region",
            "eu-west-1",
            "--no-cleanup",
            "--sync-interval-ms",
            "250",
            "--log-format",
            "json",
        ]);
        let cfg = cli.engine_config().unwrap();
        assert_eq!(cfg.region, "eu-west-1");
        assert!(!cfg.cleanup.enabled);
        assert_eq!(cfg.sync.interval_ms, 250);
        assert_eq!(cli.logger_config().format, LoggerFormat::Json);
    }

    #[test]
    fn zero_sync_interval_is_rejected() {
        assert!(parse(&["--sync-interval-ms", "0"]).engine_config().is_err());
    }

    #[test]
    fn unknown_log_format_fails_to_parse() {
        assert!(Cli::try_parse_from(["kecs", "--log-format", "xml"]).is_err());
    }
}
