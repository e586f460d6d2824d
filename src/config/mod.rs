//! # Mediator Configuration
//!
//! YAML-backed settings for dispatch policy and logging, with per-environment
//! overrides.
//!
//! ## Architecture
//!
//! - **Defaults everywhere**: an empty document is a valid configuration
//! - **Environment Awareness**: a top-level `development`/`test`/`production`
//!   section is merged over the base values for that environment
//! - **Explicit Validation**: out-of-range values are rejected, not clamped
//!
//! ## Usage
//!
//! ```rust
//! use mediator_core::config::{ConfigManager, PublishStrategy};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let yaml = r#"
//! dispatcher:
//!   publish_strategy: sequential
//! production:
//!   dispatcher:
//!     publish_strategy: concurrent
//! "#;
//!
//! let manager = ConfigManager::from_yaml_str(yaml, "production")?;
//! assert_eq!(
//!     manager.config().dispatcher.publish_strategy,
//!     PublishStrategy::Concurrent
//! );
//! # Ok(())
//! # }
//! ```

pub mod error;
pub mod loader;

use std::time::Duration;

use serde::{Deserialize, Serialize};

pub use error::{ConfigResult, ConfigurationError};
pub use loader::{detect_environment, ConfigManager};

/// Root configuration structure mirroring mediator.yaml
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct MediatorConfig {
    /// Dispatch policies
    pub dispatcher: DispatcherConfig,

    /// Structured logging settings
    pub logging: LoggingConfig,
}

impl MediatorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        self.dispatcher.validate()
    }
}

/// How notification handlers are scheduled during a publish.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PublishStrategy {
    /// One handler at a time, in registration order.
    #[default]
    Sequential,
    /// All handlers at once; results are still collected in registration order.
    Concurrent,
}

/// What a publish does when a notification handler fails.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationErrorPolicy {
    /// Run every handler and report all failures together.
    #[default]
    BestEffort,
    /// Stop at the first failure and report only that one.
    FailFast,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatcherConfig {
    pub publish_strategy: PublishStrategy,

    pub notification_error_policy: NotificationErrorPolicy,

    /// Per-invocation budget. Installs a timeout behavior when set.
    pub handler_timeout_ms: Option<u64>,

    /// Install the logging behavior as the outermost pipeline step.
    pub log_invocations: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            publish_strategy: PublishStrategy::Sequential,
            notification_error_policy: NotificationErrorPolicy::BestEffort,
            handler_timeout_ms: None,
            log_invocations: false,
        }
    }
}

impl DispatcherConfig {
    pub fn handler_timeout(&self) -> Option<Duration> {
        self.handler_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.handler_timeout_ms == Some(0) {
            return Err(ConfigurationError::invalid_value(
                "dispatcher.handler_timeout_ms",
                "timeout cannot be zero",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Explicit filter directive; derived from the environment when absent.
    pub level: Option<String>,

    /// Emit JSON lines instead of human-readable output.
    pub json: bool,

    pub with_target: bool,

    pub with_thread_ids: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: None,
            json: false,
            with_target: true,
            with_thread_ids: false,
        }
    }
}
