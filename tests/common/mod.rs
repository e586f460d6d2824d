//! Shared messages and handlers for integration tests.

#![allow(dead_code)]

pub mod fixtures;

pub use fixtures::*;

use mediator_core::logging::init_structured_logging;
use mediator_core::LoggingConfig;

/// Install the structured logger once per test binary.
pub fn init_test_logging() {
    init_structured_logging(&LoggingConfig {
        level: Some("debug".to_string()),
        ..LoggingConfig::default()
    });
}
