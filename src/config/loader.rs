//! # Configuration Loader
//!
//! Environment-aware YAML loading: a base file merged with a per-environment
//! overlay, then a handful of env var overrides for the values that differ
//! per deployment. Mirrors the directory convention
//! `config/herald/base.yaml` + `config/herald/environments/<env>.yaml`.

use serde_yaml::Value as YamlValue;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

use super::{ConfigResult, ConfigurationError, HeraldConfig};
use crate::logging::detect_environment;

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024; // 1MB is plenty for YAML

/// Loaded configuration plus the environment it was resolved for
pub struct ConfigManager {
    config: HeraldConfig,
    environment: String,
    config_directory: PathBuf,
}

impl ConfigManager {
    /// Load configuration with environment auto-detection
    pub fn load() -> ConfigResult<Arc<ConfigManager>> {
        Self::load_from_directory(None)
    }

    /// Load configuration from a specific directory
    pub fn load_from_directory(config_dir: Option<PathBuf>) -> ConfigResult<Arc<ConfigManager>> {
        let environment = detect_environment();
        Self::load_from_directory_with_env(config_dir, &environment)
    }

    /// Load with an explicit environment; useful for tests that must not
    /// mutate process-wide environment variables
    pub fn load_from_directory_with_env(
        config_dir: Option<PathBuf>,
        environment: &str,
    ) -> ConfigResult<Arc<ConfigManager>> {
        let config_directory =
            config_dir.unwrap_or_else(|| PathBuf::from("config").join("herald"));

        debug!(
            environment = %environment,
            directory = %config_directory.display(),
            "Loading configuration"
        );

        let mut config = Self::load_and_merge(&config_directory, environment)?;
        Self::apply_env_overrides(&mut config);
        config.validate()?;

        debug!(
            shard_id = %config.shard.shard_id,
            bridge_channel = %config.bridge.channel,
            "Configuration loaded successfully"
        );

        Ok(Arc::new(ConfigManager {
            config,
            environment: environment.to_string(),
            config_directory,
        }))
    }

    /// Get the loaded configuration
    pub fn config(&self) -> &HeraldConfig {
        &self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn config_directory(&self) -> &Path {
        &self.config_directory
    }

    fn load_and_merge(directory: &Path, environment: &str) -> ConfigResult<HeraldConfig> {
        let base_path = directory.join("base.yaml");
        let mut merged = if base_path.exists() {
            Self::read_yaml(&base_path)?
        } else {
            warn!(
                path = %base_path.display(),
                "No base configuration file, starting from defaults"
            );
            YamlValue::Mapping(Default::default())
        };

        let overlay_path = directory
            .join("environments")
            .join(format!("{environment}.yaml"));
        if overlay_path.exists() {
            let overlay = Self::read_yaml(&overlay_path)?;
            Self::merge_yaml(&mut merged, overlay);
        }

        serde_yaml::from_value(merged)
            .map_err(|e| ConfigurationError::parse(base_path.display().to_string(), e.to_string()))
    }

    fn read_yaml(path: &Path) -> ConfigResult<YamlValue> {
        let metadata = std::fs::metadata(path)
            .map_err(|e| ConfigurationError::file_read(path.display().to_string(), e.to_string()))?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                "file_size",
                format!("{} exceeds the {}B limit", path.display(), MAX_CONFIG_FILE_SIZE),
            ));
        }

        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read(path.display().to_string(), e.to_string()))?;

        serde_yaml::from_str(&raw)
            .map_err(|e| ConfigurationError::parse(path.display().to_string(), e.to_string()))
    }

    /// Deep-merge `overlay` into `base`: mappings merge recursively, every
    /// other value type is replaced wholesale
    fn merge_yaml(base: &mut YamlValue, overlay: YamlValue) {
        match (base, overlay) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(overlay_map)) => {
                for (key, overlay_value) in overlay_map {
                    if base_map.contains_key(&key) {
                        if let Some(base_value) = base_map.get_mut(&key) {
                            Self::merge_yaml(base_value, overlay_value);
                        }
                    } else {
                        base_map.insert(key, overlay_value);
                    }
                }
            }
            (base_slot, overlay_value) => *base_slot = overlay_value,
        }
    }

    /// Deployment-specific values that always win over files
    fn apply_env_overrides(config: &mut HeraldConfig) {
        if let Ok(url) = std::env::var("HERALD_REDIS_URL") {
            config.redis.url = url;
        }
        if let Ok(shard_id) = std::env::var("HERALD_SHARD_ID") {
            config.shard.shard_id = shard_id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_config(dir: &Path, relative: &str, contents: &str) {
        let path = dir.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_missing_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();
        assert_eq!(manager.config().shard.shard_id, "shard-0");
        assert_eq!(manager.environment(), "test");
    }

    #[test]
    fn test_environment_overlay_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_config(
            dir.path(),
            "base.yaml",
            "shard:\n  shard_id: shard-base\nbridge:\n  default_timeout_ms: 2000\n",
        );
        write_config(
            dir.path(),
            "environments/test.yaml",
            "shard:\n  shard_id: shard-test\n",
        );

        let manager =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test")
                .unwrap();

        // Overlay replaces the shard id but the base timeout survives
        assert_eq!(manager.config().shard.shard_id, "shard-test");
        assert_eq!(manager.config().bridge.default_timeout_ms, 2000);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "base.yaml", "shard:\n  shard_id: \"\"\n");

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(result.is_err());
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "base.yaml", "shard: [unclosed");

        let result =
            ConfigManager::load_from_directory_with_env(Some(dir.path().to_path_buf()), "test");
        assert!(matches!(result, Err(ConfigurationError::Parse { .. })));
    }
}
