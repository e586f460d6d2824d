//! Built-in pipeline behaviors.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::Instrument;

use super::{Envelope, Next, PipelineBehavior};
use crate::error::HandlerError;
use crate::handler::BoxedResponse;
use crate::logging::log_dispatch_operation;

/// Emits a structured log record and a tracing span per handler invocation.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingBehavior;

#[async_trait]
impl PipelineBehavior for LoggingBehavior {
    async fn handle(
        &self,
        envelope: Envelope,
        next: Next<'_>,
    ) -> Result<BoxedResponse, HandlerError> {
        let kind = envelope.kind();
        let message_type = envelope.message_type().short_name();
        let handler_type = envelope.handler_type().short_name();
        let span = tracing::debug_span!(
            "handler_invocation",
            kind = %kind,
            message_type,
            handler_type
        );

        let started = Instant::now();
        let result = next.run(envelope).instrument(span).await;
        let duration_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(_) => log_dispatch_operation(
                kind.as_str(),
                message_type,
                Some(handler_type),
                "completed",
                Some(duration_ms),
                None,
            ),
            Err(e) => log_dispatch_operation(
                kind.as_str(),
                message_type,
                Some(handler_type),
                "failed",
                Some(duration_ms),
                Some(&e.to_string()),
            ),
        }
        result
    }

    fn name(&self) -> &str {
        "logging"
    }
}

/// Raised by [`TimeoutBehavior`] when a handler overruns its budget.
#[derive(Debug, thiserror::Error)]
#[error("Handler {handler} timed out after {timeout_ms}ms")]
pub struct HandlerTimeout {
    pub handler: &'static str,
    pub timeout_ms: u64,
}

/// Fails an invocation that does not finish within `timeout`.
///
/// The inner future is dropped on timeout, so a handler stops at its next await point.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutBehavior {
    timeout: Duration,
}

impl TimeoutBehavior {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn from_millis(timeout_ms: u64) -> Self {
        Self::new(Duration::from_millis(timeout_ms))
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

#[async_trait]
impl PipelineBehavior for TimeoutBehavior {
    async fn handle(
        &self,
        envelope: Envelope,
        next: Next<'_>,
    ) -> Result<BoxedResponse, HandlerError> {
        let handler = envelope.handler_type().name();
        match tokio::time::timeout(self.timeout, next.run(envelope)).await {
            Ok(result) => result,
            Err(_) => Err(Box::new(HandlerTimeout {
                handler,
                timeout_ms: self.timeout.as_millis() as u64,
            }) as HandlerError),
        }
    }

    fn name(&self) -> &str {
        "timeout"
    }
}
