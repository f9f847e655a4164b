use std::time::Duration;

use serde::Deserialize;

const HOUR: u64 = 60 * 60;

/// Engine-wide settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    pub region: String,
    pub account_id: String,
    /// Cluster used when a request names none.
    pub default_cluster: String,
    /// Simulated runtime instead of a live Kubernetes cluster.
    pub test_mode: bool,
    /// Reject containers whose CPU or memory exceed the fixed ceilings.
    pub resource_guard: bool,
    pub cleanup: CleanupConfig,
    pub sync: SyncConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            region: "us-east-1".to_string(),
            account_id: "000000000000".to_string(),
            default_cluster: "default".to_string(),
            test_mode: false,
            resource_guard: false,
            cleanup: CleanupConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Test-mode preset: resource guard on and a fast status sync.
    pub fn test_mode() -> Self {
        Self {
            test_mode: true,
            resource_guard: true,
            sync: SyncConfig {
                enabled: true,
                interval_ms: 1_000,
            },
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), crate::CoreError> {
        if self.region.is_empty() {
            return Err(crate::CoreError::Config("region is empty".into()));
        }
        if self.account_id.is_empty() {
            return Err(crate::CoreError::Config("account id is empty".into()));
        }
        if self.cleanup.enabled && self.cleanup.interval_secs == 0 {
            return Err(crate::CoreError::Config("cleanup interval must be positive".into()));
        }
        if self.sync.enabled && self.sync.interval_ms == 0 {
            return Err(crate::CoreError::Config("sync interval must be positive".into()));
        }
        Ok(())
    }
}

/// Retention sweep settings. Each resource class has its own window.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CleanupConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub task_retention_secs: u64,
    pub service_retention_secs: u64,
    pub container_instance_retention_secs: u64,
    pub task_set_retention_secs: u64,
    pub log_retention_secs: u64,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 5 * 60,
            task_retention_secs: HOUR,
            service_retention_secs: 24 * HOUR,
            container_instance_retention_secs: HOUR,
            task_set_retention_secs: 24 * HOUR,
            log_retention_secs: 7 * 24 * HOUR,
        }
    }
}

impl CleanupConfig {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Self::default()
        }
    }

    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }

    #[inline]
    pub fn task_retention(&self) -> Duration {
        Duration::from_secs(self.task_retention_secs)
    }

    #[inline]
    pub fn service_retention(&self) -> Duration {
        Duration::from_secs(self.service_retention_secs)
    }

    #[inline]
    pub fn container_instance_retention(&self) -> Duration {
        Duration::from_secs(self.container_instance_retention_secs)
    }

    #[inline]
    pub fn task_set_retention(&self) -> Duration {
        Duration::from_secs(self.task_set_retention_secs)
    }

    #[inline]
    pub fn log_retention(&self) -> Duration {
        Duration::from_secs(self.log_retention_secs)
    }
}

/// Background status reconciliation.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SyncConfig {
    pub enabled: bool,
    pub interval_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_ms: 10_000,
        }
    }
}

impl SyncConfig {
    #[inline]
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cleanup_defaults_match_retention_table() {
        let cfg = CleanupConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.interval(), Duration::from_secs(300));
        assert_eq!(cfg.task_retention(), Duration::from_secs(3600));
        assert_eq!(cfg.service_retention(), Duration::from_secs(86_400));
        assert_eq!(cfg.container_instance_retention(), Duration::from_secs(3600));
        assert_eq!(cfg.task_set_retention(), Duration::from_secs(86_400));
        assert_eq!(cfg.log_retention(), Duration::from_secs(604_800));
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let cfg: EngineConfig = serde_json::from_str(
            r#"{"region":"eu-west-1","cleanup":{"enabled":false,"taskRetentionSecs":60}}"#,
        )
        .unwrap();

        assert_eq!(cfg.region, "eu-west-1");
        assert_eq!(cfg.account_id, "000000000000");
        assert!(!cfg.cleanup.enabled);
        assert_eq!(cfg.cleanup.task_retention_secs, 60);
        assert_eq!(cfg.cleanup.interval_secs, 300);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn zero_interval_is_rejected_when_enabled() {
        let mut cfg = EngineConfig::default();
        cfg.cleanup.interval_secs = 0;
        assert!(cfg.validate().is_err());

        cfg.cleanup.enabled = false;
        assert!(cfg.validate().is_ok());
    }
}
