use serde::{Deserialize, Serialize};

/// Per-item failure returned alongside partial successes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Failure {
    pub arn: String,
    /// Short machine code: `MISSING`, `InternalError`, `RESOURCE:CPU`, ...
    pub reason: String,
    pub detail: String,
}

impl Failure {
    pub const MISSING: &'static str = "MISSING";
    pub const INTERNAL_ERROR: &'static str = "InternalError";
    pub const RESOURCE_CPU: &'static str = "RESOURCE:CPU";
    pub const RESOURCE_MEMORY: &'static str = "RESOURCE:MEMORY";

    pub fn new(arn: impl Into<String>, reason: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            arn: arn.into(),
            reason: reason.into(),
            detail: detail.into(),
        }
    }

    pub fn missing(arn: impl Into<String>) -> Self {
        Self::new(arn, Self::MISSING, "Task not found")
    }

    pub fn internal(arn: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::new(arn, Self::INTERNAL_ERROR, detail)
    }

    /// Returns `true` for resource-guard rejections.
    pub fn is_resource(&self) -> bool {
        self.reason.starts_with("RESOURCE:")
    }
}
