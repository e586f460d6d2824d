//! # Dispatcher
//!
//! Routes requests to their single handler and publishes notifications to every
//! subscriber.
//!
//! ## Flow
//!
//! ```text
//! send/publish ─► HandlerRegistry (type lookup)
//!              ─► HandlerResolver (instance per invocation)
//!              ─► PipelineChain   (behaviors, outermost first)
//!              ─► handler
//! ```
//!
//! ## Publish policies
//!
//! Notification handlers always start in registration order and failures are
//! always reported in registration order, whichever [`PublishStrategy`] runs them.
//!
//! | policy                         | on handler failure                                      |
//! |--------------------------------|---------------------------------------------------------|
//! | `BestEffort` (default)         | keep going, then one `AggregatedNotification` error     |
//! | `FailFast`                     | sequential: stop and return that error; concurrent: return the earliest-registered error |
//!
//! ## Cancellation
//!
//! The signal is checked before resolving each handler. An already-cancelled
//! signal fails with [`DispatchError::Cancelled`] before any handler runs.
//! Cancelling part-way through a sequential publish stops the remaining
//! handlers; if earlier handlers had failed, the aggregated error lists those
//! failures followed by a `Cancelled` entry for the first handler skipped.

use std::any::type_name;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cancellation::CancellationSignal;
use crate::config::{DispatcherConfig, NotificationErrorPolicy, PublishStrategy};
use crate::error::{DispatchError, HandlerFailure, NotificationFailures, Result};
use crate::handler::{BoxedMessage, BoxedResponse};
use crate::messages::{MessageKind, MessageType, Notification, Request};
use crate::pipeline::{Envelope, PipelineChain};
use crate::registry::{HandlerDescriptor, HandlerRegistry};
use crate::resolver::HandlerResolver;

/// Central request/notification dispatcher.
///
/// Cheap to clone; clones share the registry, resolver and pipeline.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use async_trait::async_trait;
/// use mediator_core::{
///     CancellationSignal, Dispatcher, HandlerError, HandlerRegistry, Request, RequestHandler,
/// };
/// use mediator_core::resolver::{Lifetime, ServiceCollection};
///
/// struct Ping(String);
///
/// impl Request for Ping {
///     type Response = String;
/// }
///
/// struct PingHandler;
///
/// #[async_trait]
/// impl RequestHandler<Ping> for PingHandler {
///     async fn handle(&self, ping: Ping, _: &CancellationSignal) -> Result<String, HandlerError> {
///         Ok(format!("{} Pong", ping.0))
///     }
/// }
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let mut registry = HandlerRegistry::builder();
/// registry.register_request::<Ping, PingHandler>()?;
///
/// let services = ServiceCollection::new()
///     .add::<PingHandler, _>(Lifetime::Transient, |_| Ok(PingHandler))
///     .build();
///
/// let dispatcher = Dispatcher::new(registry.build(), Arc::new(services));
/// assert_eq!(dispatcher.send(Ping("Hello".into())).await?, "Hello Pong");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    resolver: Arc<dyn HandlerResolver>,
    pipeline: PipelineChain,
    config: DispatcherConfig,
}

impl Dispatcher {
    /// Create a dispatcher with default policies and no behaviors.
    pub fn new(registry: HandlerRegistry, resolver: Arc<dyn HandlerResolver>) -> Self {
        Self::with_config(registry, resolver, DispatcherConfig::default())
    }

    /// Create a dispatcher with explicit policies.
    ///
    /// Behaviors implied by the config (logging, timeout) are installed by
    /// [`crate::bootstrap::DispatcherBuilder`], not here.
    pub fn with_config(
        registry: HandlerRegistry,
        resolver: Arc<dyn HandlerResolver>,
        config: DispatcherConfig,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            resolver,
            pipeline: PipelineChain::new(),
            config,
        }
    }

    pub fn with_pipeline(mut self, pipeline: PipelineChain) -> Self {
        self.pipeline = pipeline;
        self
    }

    /// A dispatcher sharing this one's registry, pipeline and policies but
    /// resolving handlers through `resolver`, e.g. a per-request service scope.
    pub fn with_resolver(&self, resolver: Arc<dyn HandlerResolver>) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            resolver,
            pipeline: self.pipeline.clone(),
            config: self.config.clone(),
        }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub fn pipeline(&self) -> &PipelineChain {
        &self.pipeline
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Send a request to its single handler and return the response unchanged.
    pub async fn send<R: Request>(&self, request: R) -> Result<R::Response> {
        self.send_with_cancellation(request, &CancellationSignal::never())
            .await
    }

    pub async fn send_with_cancellation<R: Request>(
        &self,
        request: R,
        cancellation: &CancellationSignal,
    ) -> Result<R::Response> {
        let message_type = MessageType::of::<R>();
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled {
                message_type: message_type.name(),
            });
        }

        let descriptor = match self.handlers_for(&message_type, MessageKind::Request) {
            [] => {
                return Err(DispatchError::NoHandler {
                    message_type: message_type.name(),
                })
            }
            [descriptor] => descriptor,
            many => {
                return Err(DispatchError::AmbiguousHandler {
                    message_type: message_type.name(),
                    count: many.len(),
                })
            }
        };

        debug!(
            message_type = message_type.name(),
            handler_type = descriptor.handler_type().name(),
            "Sending request"
        );

        let response = self
            .invoke(
                descriptor,
                Box::new(request),
                message_type,
                MessageKind::Request,
                cancellation,
            )
            .await?;

        response
            .downcast::<R::Response>()
            .map(|response| *response)
            .map_err(|_| DispatchError::ResponseTypeMismatch {
                expected: type_name::<R::Response>(),
            })
    }

    /// Deliver a notification to every registered handler.
    ///
    /// Zero handlers is not an error.
    pub async fn publish<N: Notification>(&self, notification: N) -> Result<()> {
        self.publish_with_cancellation(notification, &CancellationSignal::never())
            .await
    }

    pub async fn publish_with_cancellation<N: Notification>(
        &self,
        notification: N,
        cancellation: &CancellationSignal,
    ) -> Result<()> {
        let message_type = MessageType::of::<N>();
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled {
                message_type: message_type.name(),
            });
        }

        let handlers = self.handlers_for(&message_type, MessageKind::Notification);
        if handlers.is_empty() {
            debug!(
                message_type = message_type.name(),
                "No handlers registered for notification"
            );
            return Ok(());
        }

        debug!(
            message_type = message_type.name(),
            handlers = handlers.len(),
            strategy = ?self.config.publish_strategy,
            policy = ?self.config.notification_error_policy,
            "Publishing notification"
        );

        match self.config.publish_strategy {
            PublishStrategy::Sequential => {
                self.publish_sequential(&notification, message_type, handlers, cancellation)
                    .await
            }
            PublishStrategy::Concurrent => {
                self.publish_concurrent(&notification, message_type, handlers, cancellation)
                    .await
            }
        }
    }

    async fn publish_sequential<N: Notification>(
        &self,
        notification: &N,
        message_type: MessageType,
        handlers: &[HandlerDescriptor],
        cancellation: &CancellationSignal,
    ) -> Result<()> {
        let mut failures = Vec::new();

        for (index, descriptor) in handlers.iter().enumerate() {
            if cancellation.is_cancelled() {
                debug!(
                    message_type = message_type.name(),
                    completed = index,
                    remaining = handlers.len() - index,
                    "Publish cancelled, skipping remaining handlers"
                );
                failures.push(HandlerFailure {
                    index,
                    handler: descriptor.handler_type().name(),
                    error: DispatchError::Cancelled {
                        message_type: message_type.name(),
                    },
                });
                break;
            }

            let result = self
                .invoke(
                    descriptor,
                    Box::new(notification.clone()),
                    message_type,
                    MessageKind::Notification,
                    cancellation,
                )
                .await;

            if let Err(error) = result {
                if self.config.notification_error_policy == NotificationErrorPolicy::FailFast {
                    return Err(error);
                }
                warn!(
                    message_type = message_type.name(),
                    handler_type = descriptor.handler_type().name(),
                    index,
                    error = %error,
                    "Notification handler failed, continuing"
                );
                failures.push(HandlerFailure {
                    index,
                    handler: descriptor.handler_type().name(),
                    error,
                });
            }
        }

        Self::conclude(message_type, handlers.len(), failures)
    }

    async fn publish_concurrent<N: Notification>(
        &self,
        notification: &N,
        message_type: MessageType,
        handlers: &[HandlerDescriptor],
        cancellation: &CancellationSignal,
    ) -> Result<()> {
        let invocations = handlers.iter().map(|descriptor| {
            self.invoke(
                descriptor,
                Box::new(notification.clone()),
                message_type,
                MessageKind::Notification,
                cancellation,
            )
        });

        // join_all yields results in input order, i.e. registration order.
        let results = futures::future::join_all(invocations).await;

        let mut failures = Vec::new();
        for (index, (descriptor, result)) in handlers.iter().zip(results).enumerate() {
            if let Err(error) = result {
                if self.config.notification_error_policy == NotificationErrorPolicy::FailFast {
                    return Err(error);
                }
                failures.push(HandlerFailure {
                    index,
                    handler: descriptor.handler_type().name(),
                    error,
                });
            }
        }

        Self::conclude(message_type, handlers.len(), failures)
    }

    fn conclude(
        message_type: MessageType,
        handler_count: usize,
        failures: Vec<HandlerFailure>,
    ) -> Result<()> {
        if failures.is_empty() {
            return Ok(());
        }
        if failures.iter().all(|failure| failure.error.is_cancelled()) {
            return Err(DispatchError::Cancelled {
                message_type: message_type.name(),
            });
        }
        Err(DispatchError::AggregatedNotification(NotificationFailures {
            message_type: message_type.name(),
            handler_count,
            failures,
        }))
    }

    /// Handlers for `message_type` when it is registered as `kind`.
    fn handlers_for(&self, message_type: &MessageType, kind: MessageKind) -> &[HandlerDescriptor] {
        match self.registry.kind_of(message_type) {
            Some(registered) if registered == kind => self.registry.lookup(message_type),
            _ => &[],
        }
    }

    async fn invoke(
        &self,
        descriptor: &HandlerDescriptor,
        message: BoxedMessage,
        message_type: MessageType,
        kind: MessageKind,
        cancellation: &CancellationSignal,
    ) -> Result<BoxedResponse> {
        let handler_type = *descriptor.handler_type();
        if cancellation.is_cancelled() {
            return Err(DispatchError::Cancelled {
                message_type: message_type.name(),
            });
        }

        let handler = self
            .resolver
            .resolve(&handler_type)
            .and_then(|instance| descriptor.bind(instance))
            .map_err(|source| DispatchError::Resolution {
                handler: handler_type.name(),
                source,
            })?;

        let envelope = Envelope::new(
            message,
            message_type,
            handler_type,
            kind,
            cancellation.clone(),
        );

        self.pipeline
            .execute(envelope, handler.as_ref())
            .await
            .map_err(|source| DispatchError::HandlerExecution {
                handler: handler_type.name(),
                source,
            })
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("registry", &self.registry.stats())
            .field("pipeline", &self.pipeline)
            .field("config", &self.config)
            .finish()
    }
}
