//! Configuration Loader
//!
//! Environment-aware configuration loading. Reads a YAML document, merges the
//! section named after the current environment over the base values, and
//! validates the result.

use std::env;
use std::path::{Path, PathBuf};

use serde_yaml::Value as YamlValue;
use tracing::debug;

use super::error::{ConfigResult, ConfigurationError};
use super::MediatorConfig;

const ENVIRONMENT_SECTIONS: [&str; 3] = ["development", "test", "production"];

const MAX_CONFIG_FILE_SIZE: u64 = 1024 * 1024;

/// Current environment from `MEDIATOR_ENV`, then `APP_ENV`, defaulting to `development`.
pub fn detect_environment() -> String {
    env::var("MEDIATOR_ENV")
        .or_else(|_| env::var("APP_ENV"))
        .unwrap_or_else(|_| "development".to_string())
}

/// Loaded configuration plus where it came from.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: MediatorConfig,
    environment: String,
    source: Option<PathBuf>,
}

impl ConfigManager {
    /// Defaults for the detected environment, without reading any file.
    pub fn defaults() -> Self {
        Self {
            config: MediatorConfig::default(),
            environment: detect_environment(),
            source: None,
        }
    }

    /// Load from a YAML file for the detected environment.
    pub fn load_from_file(path: impl AsRef<Path>) -> ConfigResult<Self> {
        Self::load_from_file_with_env(path, &detect_environment())
    }

    /// Load from a YAML file with an explicit environment.
    /// This is useful for testing without modifying global environment variables
    pub fn load_from_file_with_env(
        path: impl AsRef<Path>,
        environment: &str,
    ) -> ConfigResult<Self> {
        let path = path.as_ref();
        debug!(
            "Loading configuration for environment '{}' from {}",
            environment,
            path.display()
        );

        let yaml = Self::read_config_file_safely(path)?;
        let config = Self::parse_and_merge(&yaml, environment, &path.display().to_string())?;

        Ok(Self {
            config,
            environment: environment.to_string(),
            source: Some(path.to_path_buf()),
        })
    }

    /// Parse an in-memory YAML document.
    pub fn from_yaml_str(yaml: &str, environment: &str) -> ConfigResult<Self> {
        let config = Self::parse_and_merge(yaml, environment, "<inline>")?;
        Ok(Self {
            config,
            environment: environment.to_string(),
            source: None,
        })
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    pub fn into_config(self) -> MediatorConfig {
        self.config
    }

    pub fn environment(&self) -> &str {
        &self.environment
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Configuration as JSON for diagnostics.
    pub fn debug_config(&self) -> serde_json::Value {
        serde_json::json!({
            "environment": self.environment,
            "source": self.source.as_ref().map(|p| p.display().to_string()),
            "config": serde_json::to_value(&self.config).unwrap_or(serde_json::Value::Null),
        })
    }

    fn read_config_file_safely(path: &Path) -> ConfigResult<String> {
        let metadata = std::fs::metadata(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => ConfigurationError::ConfigFileNotFound {
                path: path.display().to_string(),
            },
            _ => ConfigurationError::file_read_error(path.display().to_string(), e),
        })?;

        if metadata.len() > MAX_CONFIG_FILE_SIZE {
            return Err(ConfigurationError::invalid_value(
                path.display().to_string(),
                format!(
                    "file is {} bytes, limit is {MAX_CONFIG_FILE_SIZE}",
                    metadata.len()
                ),
            ));
        }

        std::fs::read_to_string(path)
            .map_err(|e| ConfigurationError::file_read_error(path.display().to_string(), e))
    }

    fn parse_and_merge(
        yaml: &str,
        environment: &str,
        source_name: &str,
    ) -> ConfigResult<MediatorConfig> {
        let mut yaml_data: YamlValue = serde_yaml::from_str(yaml)
            .map_err(|e| ConfigurationError::invalid_yaml(source_name, e))?;

        // An empty document parses as null
        if yaml_data.is_null() {
            yaml_data = YamlValue::Mapping(Default::default());
        }

        if let Some(env_overrides) = yaml_data
            .get(YamlValue::String(environment.to_string()))
            .cloned()
        {
            debug!(
                "Applying environment-specific overrides for: {}",
                environment
            );
            Self::merge_yaml_values(&mut yaml_data, env_overrides);
        }

        if let YamlValue::Mapping(ref mut map) = yaml_data {
            for section in ENVIRONMENT_SECTIONS {
                map.remove(YamlValue::String(section.to_string()));
            }
            map.remove(YamlValue::String(environment.to_string()));
        }

        let config: MediatorConfig = serde_yaml::from_value(yaml_data).map_err(|e| {
            ConfigurationError::invalid_yaml(
                source_name,
                format!("Failed to deserialize configuration: {e}"),
            )
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Recursively merge YAML values (environment overrides into base config)
    fn merge_yaml_values(base: &mut YamlValue, override_value: YamlValue) {
        match (&mut *base, override_value) {
            (YamlValue::Mapping(base_map), YamlValue::Mapping(override_map)) => {
                for (key, value) in override_map {
                    if let Some(existing_value) = base_map.get_mut(&key) {
                        Self::merge_yaml_values(existing_value, value);
                    } else {
                        base_map.insert(key, value);
                    }
                }
            }
            (base_ref, override_val) => {
                *base_ref = override_val;
            }
        }
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::defaults()
    }
}
