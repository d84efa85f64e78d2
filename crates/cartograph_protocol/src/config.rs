//! System configuration shared by the control plane and the agent pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::defaults;

/// Worker-pool and pipeline budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Worker pool size; also the notification channel capacity.
    pub max_concurrent_workers: usize,
    /// Per-job wall-clock budget, in milliseconds.
    pub time_limit_ms: u64,
    /// Explorer inner-loop cap.
    pub max_iterations: u32,
}

impl AgentConfig {
    pub fn time_limit(&self) -> Duration {
        Duration::from_millis(self.time_limit_ms)
    }
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_concurrent_workers: defaults::DEFAULT_MAX_CONCURRENT_WORKERS,
            time_limit_ms: defaults::DEFAULT_TIME_LIMIT.as_millis() as u64,
            max_iterations: defaults::DEFAULT_MAX_ITERATIONS,
        }
    }
}

/// Length and count ceilings applied before script generation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationLimits {
    pub max_name_length: usize,
    pub max_description_length: usize,
    pub max_steps_json_length: usize,
    pub max_steps_count: usize,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_name_length: defaults::DEFAULT_MAX_NAME_LENGTH,
            max_description_length: defaults::DEFAULT_MAX_DESCRIPTION_LENGTH,
            max_steps_json_length: defaults::DEFAULT_MAX_STEPS_JSON_LENGTH,
            max_steps_count: defaults::DEFAULT_MAX_STEPS_COUNT,
        }
    }
}

/// Blob storage backend selection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Filesystem-backed storage rooted at `root`.
    Local { root: PathBuf },
    /// Object storage; requires a build with the s3 backend compiled in.
    S3 {
        bucket: String,
        region: String,
        #[serde(default)]
        prefix: String,
    },
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig::Local {
            root: crate::paths::default_blob_root(),
        }
    }
}

/// Top-level configuration for the Cartograph binaries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Database URL (sqlite:... | postgres://...).
    pub database_url: String,
    pub storage: StorageConfig,
    pub agent: AgentConfig,
    pub limits: ValidationLimits,
    /// Tracing filter directive, e.g. "cartograph=info".
    pub log_filter: Option<String>,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            database_url: defaults::DEFAULT_DB_URL.to_string(),
            storage: StorageConfig::default(),
            agent: AgentConfig::default(),
            limits: ValidationLimits::default(),
            log_filter: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = SystemConfig::default();
        assert_eq!(cfg.agent.max_concurrent_workers, 1);
        assert_eq!(cfg.agent.time_limit(), Duration::from_secs(600));
        assert_eq!(cfg.agent.max_iterations, 50);
        assert_eq!(cfg.limits.max_name_length, 255);
        assert_eq!(cfg.limits.max_steps_count, 200);
    }

    #[test]
    fn storage_config_deserializes_tagged() {
        let toml = r#"
            backend = "s3"
            bucket = "qa-artifacts"
            region = "us-east-1"
        "#;
        let cfg: StorageConfig = toml::from_str(toml).unwrap();
        assert!(matches!(cfg, StorageConfig::S3 { .. }));
    }
}
