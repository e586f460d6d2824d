//! Configuration errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Configuration file not found: {path}")]
    ConfigFileNotFound { path: String },

    #[error("Failed to read configuration file {path}: {source}")]
    FileReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {source_name}: {reason}")]
    InvalidYaml { source_name: String, reason: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigurationError {
    pub fn file_read_error(path: impl Into<String>, source: std::io::Error) -> Self {
        Self::FileReadError {
            path: path.into(),
            source,
        }
    }

    pub fn invalid_yaml(source_name: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidYaml {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigurationError>;
