//! # Error Types
//!
//! Error taxonomy for registration, resolution and dispatch.

use std::fmt;

use thiserror::Error;

/// Failure returned by a handler or pipeline behavior.
pub type HandlerError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors raised while building a [`crate::registry::HandlerRegistry`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistrationError {
    #[error("Duplicate handler for request type {message_type}: {existing} already registered, rejected {rejected}")]
    DuplicateHandler {
        message_type: &'static str,
        existing: &'static str,
        rejected: &'static str,
    },

    #[error("Message type {message_type} is already registered as a {registered_as}")]
    MessageKindConflict {
        message_type: &'static str,
        registered_as: &'static str,
    },
}

/// Errors raised by a [`crate::resolver::HandlerResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("No binding registered for {type_name}")]
    NotRegistered { type_name: &'static str },

    #[error("Failed to construct {type_name}: {reason}")]
    ConstructionFailed {
        type_name: &'static str,
        reason: String,
    },

    #[error("Resolved instance is not a {expected}")]
    TypeMismatch { expected: &'static str },
}

impl ResolutionError {
    /// Wrap a dependency failure as a construction failure of `type_name`.
    pub fn construction(type_name: &'static str, reason: impl fmt::Display) -> Self {
        Self::ConstructionFailed {
            type_name,
            reason: reason.to_string(),
        }
    }
}

/// A single notification handler failure, keyed by registration position.
#[derive(Debug)]
pub struct HandlerFailure {
    /// Position of the handler in registration order.
    pub index: usize,
    pub handler: &'static str,
    pub error: DispatchError,
}

/// Every failure collected during a best-effort publish.
#[derive(Debug)]
pub struct NotificationFailures {
    pub message_type: &'static str,
    /// Number of handlers registered for the notification.
    pub handler_count: usize,
    /// Failures in registration order.
    pub failures: Vec<HandlerFailure>,
}

impl NotificationFailures {
    pub fn handlers(&self) -> Vec<&'static str> {
        self.failures.iter().map(|f| f.handler).collect()
    }
}

impl fmt::Display for NotificationFailures {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} handlers failed for {}",
            self.failures.len(),
            self.handler_count,
            self.message_type
        )?;
        for failure in &self.failures {
            write!(
                f,
                "; [{}] {}: {}",
                failure.index, failure.handler, failure.error
            )?;
        }
        Ok(())
    }
}

/// Errors surfaced by [`crate::dispatcher::Dispatcher`].
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("No handler registered for request type {message_type}")]
    NoHandler { message_type: &'static str },

    #[error("{count} handlers registered for request type {message_type}, expected exactly one")]
    AmbiguousHandler {
        message_type: &'static str,
        count: usize,
    },

    #[error("Failed to resolve handler {handler}: {source}")]
    Resolution {
        handler: &'static str,
        #[source]
        source: ResolutionError,
    },

    #[error("Handler {handler} failed: {source}")]
    HandlerExecution {
        handler: &'static str,
        #[source]
        source: HandlerError,
    },

    #[error("Notification dispatch failed: {0}")]
    AggregatedNotification(NotificationFailures),

    #[error("Dispatch of {message_type} cancelled")]
    Cancelled { message_type: &'static str },

    #[error("Pipeline returned a response that is not a {expected}")]
    ResponseTypeMismatch { expected: &'static str },
}

impl DispatchError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, DispatchError::Cancelled { .. })
    }

    /// Individual failures when this is an aggregated notification error.
    pub fn notification_failures(&self) -> Option<&NotificationFailures> {
        match self {
            DispatchError::AggregatedNotification(failures) => Some(failures),
            _ => None,
        }
    }
}

/// Raised inside a handler adapter when a behavior swapped the message for another type.
#[derive(Debug, Error)]
#[error("Envelope does not carry a {expected}")]
pub struct MessageTypeMismatch {
    pub expected: &'static str,
}

pub type Result<T> = std::result::Result<T, DispatchError>;
