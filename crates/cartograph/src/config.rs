//! Configuration loading for the Cartograph binary.

use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

use cartograph_protocol::{paths, SystemConfig};

/// Load configuration: an explicit path must exist; otherwise
/// `~/.cartograph/config.toml` is used when present, defaults when not.
pub fn load(path: Option<&Path>) -> Result<SystemConfig> {
    let candidate = match path {
        Some(explicit) => explicit.to_path_buf(),
        None => {
            let default = paths::cartograph_home().join("config.toml");
            if !default.exists() {
                return Ok(SystemConfig::default());
            }
            default
        }
    };

    let raw = fs::read_to_string(&candidate)
        .with_context(|| format!("Failed to read config {}", candidate.display()))?;
    toml::from_str(&raw).with_context(|| format!("Invalid config {}", candidate.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_config_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
            database_url = "sqlite:/tmp/qa.sqlite?mode=rwc"

            [agent]
            max_concurrent_workers = 4
            max_iterations = 10
            "#,
        )
        .unwrap();

        let config = load(Some(&path)).unwrap();
        assert_eq!(config.agent.max_concurrent_workers, 4);
        assert_eq!(config.agent.max_iterations, 10);
        // untouched sections keep their defaults
        assert_eq!(config.limits.max_name_length, 255);
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        assert!(load(Some(Path::new("/nonexistent/config.toml"))).is_err());
    }
}
