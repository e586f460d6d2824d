//! # Dispatcher Bootstrap
//!
//! One-stop assembly of a [`Dispatcher`]: handler registrations, the services
//! they depend on, pipeline behaviors and policy configuration.
//!
//! Every `add_*_handler` call registers the handler type in the routing table
//! and its factory in the built-in [`ServiceCollection`], so the two cannot
//! drift apart.
//!
//! Pipeline order after [`DispatcherBuilder::build`]:
//!
//! ```text
//! LoggingBehavior (if log_invocations) ─► user behaviors (in add order) ─► TimeoutBehavior (if handler_timeout_ms) ─► handler
//! ```

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{ConfigResult, DispatcherConfig, MediatorConfig};
use crate::dispatcher::Dispatcher;
use crate::error::{RegistrationError, ResolutionError};
use crate::handler::{NotificationHandler, RequestHandler};
use crate::messages::{Notification, Request};
use crate::pipeline::{LoggingBehavior, PipelineBehavior, PipelineChain, TimeoutBehavior};
use crate::registry::HandlerRegistryBuilder;
use crate::resolver::{HandlerResolver, Lifetime, ServiceCollection, ServiceProvider};

#[derive(Default)]
pub struct DispatcherBuilder {
    registry: HandlerRegistryBuilder,
    services: ServiceCollection,
    behaviors: PipelineChain,
    config: DispatcherConfig,
    resolver: Option<Arc<dyn HandlerResolver>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder with dispatch policies taken from a loaded configuration.
    pub fn from_config(config: &MediatorConfig) -> ConfigResult<Self> {
        Self::new().with_config(config.dispatcher.clone())
    }

    /// Apply dispatch policies, rejecting values `ConfigManager` would reject.
    pub fn with_config(mut self, config: DispatcherConfig) -> ConfigResult<Self> {
        config.validate()?;
        self.config = config;
        Ok(self)
    }

    /// Register `H` as the handler for `R`, constructed by `factory`.
    pub fn add_request_handler<R, H, F>(
        mut self,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<Self, RegistrationError>
    where
        R: Request,
        H: RequestHandler<R>,
        F: Fn(&ServiceProvider) -> Result<H, ResolutionError> + Send + Sync + 'static,
    {
        self.registry.register_request::<R, H>()?;
        self.services.insert(lifetime, factory);
        Ok(self)
    }

    /// Append `H` to the handlers of `N`, constructed by `factory`.
    ///
    /// Adding the same handler type twice delivers each notification to it twice.
    /// Factories are keyed by handler type, so when `H` is added more than once
    /// (for the same or another notification) the last factory serves every
    /// registration.
    pub fn add_notification_handler<N, H, F>(
        mut self,
        lifetime: Lifetime,
        factory: F,
    ) -> Result<Self, RegistrationError>
    where
        N: Notification,
        H: NotificationHandler<N>,
        F: Fn(&ServiceProvider) -> Result<H, ResolutionError> + Send + Sync + 'static,
    {
        self.registry.register_notification::<N, H>()?;
        self.services.insert(lifetime, factory);
        Ok(self)
    }

    /// Register a dependency that handler factories can fetch with [`ServiceProvider::get`].
    pub fn add_service<T, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<T, ResolutionError> + Send + Sync + 'static,
    {
        self.services.insert(lifetime, factory);
        self
    }

    pub fn add_instance<T>(mut self, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.services.insert_instance(instance);
        self
    }

    pub fn add_behavior(mut self, behavior: impl PipelineBehavior + 'static) -> Self {
        self.behaviors.push(Arc::new(behavior));
        self
    }

    /// Resolve handlers through an external container instead of the built-in services.
    pub fn with_resolver(mut self, resolver: Arc<dyn HandlerResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn build(self) -> Dispatcher {
        self.build_with_services().0
    }

    /// Build the dispatcher and return the root service provider alongside it.
    ///
    /// The provider is what per-request scopes are created from:
    /// `dispatcher.with_resolver(Arc::new(provider.create_scope()))`.
    pub fn build_with_services(self) -> (Dispatcher, ServiceProvider) {
        let pipeline = Self::compose_pipeline(&self.config, self.behaviors);
        let has_services = !self.services.is_empty();
        let provider = self.services.build();

        let resolver: Arc<dyn HandlerResolver> = match self.resolver {
            Some(resolver) => {
                if has_services {
                    warn!("External resolver configured; built-in service registrations will not be used for handlers");
                }
                resolver
            }
            None => Arc::new(provider.clone()),
        };

        let registry = self.registry.build();
        let stats = registry.stats();
        info!(
            request_types = stats.request_types,
            notification_types = stats.notification_types,
            total_handlers = stats.total_handlers,
            behaviors = ?pipeline.names(),
            "Dispatcher built"
        );

        let dispatcher =
            Dispatcher::with_config(registry, resolver, self.config).with_pipeline(pipeline);
        (dispatcher, provider)
    }

    fn compose_pipeline(config: &DispatcherConfig, behaviors: PipelineChain) -> PipelineChain {
        let mut pipeline = PipelineChain::new();
        if config.log_invocations {
            pipeline.push(Arc::new(LoggingBehavior));
        }
        for behavior in behaviors.iter() {
            pipeline.push(Arc::clone(behavior));
        }
        if let Some(timeout) = config.handler_timeout() {
            debug!(timeout_ms = timeout.as_millis() as u64, "Installing handler timeout");
            pipeline.push(Arc::new(TimeoutBehavior::new(timeout)));
        }
        pipeline
    }
}

impl std::fmt::Debug for DispatcherBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatcherBuilder")
            .field("registry", &self.registry)
            .field("services", &self.services)
            .field("behaviors", &self.behaviors)
            .field("config", &self.config)
            .field("external_resolver", &self.resolver.is_some())
            .finish()
    }
}
