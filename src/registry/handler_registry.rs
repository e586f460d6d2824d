//! # Handler Registry
//!
//! Maps message types to the handler types registered for them.
//!
//! ## Overview
//!
//! Registrations are collected in a [`HandlerRegistryBuilder`] during process
//! setup and sealed into an immutable [`HandlerRegistry`] by `build()`. The
//! sealed registry has no interior mutability, so any number of dispatch calls
//! can look up handlers concurrently without locking.
//!
//! ## Rules
//!
//! - A request type has at most one handler; a second registration fails with
//!   [`RegistrationError::DuplicateHandler`].
//! - A notification type has any number of handlers, kept in registration order.
//!   Registering the same handler type twice yields two invocations per publish.
//! - A message type is either a request or a notification, never both.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let mut builder = HandlerRegistry::builder();
//! builder
//!     .register_request::<Ping, PingHandler>()?
//!     .register_notification::<StateChanged, AuditHandler>()?
//!     .register_notification::<StateChanged, MetricsHandler>()?;
//! let registry = builder.build();
//!
//! assert_eq!(registry.lookup_for::<StateChanged>().len(), 2);
//! ```

use std::any::TypeId;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::error::{RegistrationError, ResolutionError};
use crate::handler::{
    bind_notification, bind_request, Binder, ErasedHandler, NotificationHandler, RequestHandler,
};
use crate::messages::{HandlerType, MessageKind, MessageType, Notification, Request};
use crate::resolver::ResolvedHandler;

/// One registered handler type together with the adapter that invokes it.
#[derive(Clone)]
pub struct HandlerDescriptor {
    handler_type: HandlerType,
    binder: Binder,
}

impl HandlerDescriptor {
    pub fn handler_type(&self) -> &HandlerType {
        &self.handler_type
    }

    pub(crate) fn bind(
        &self,
        instance: ResolvedHandler,
    ) -> Result<Arc<dyn ErasedHandler>, ResolutionError> {
        (self.binder)(instance)
    }
}

impl fmt::Debug for HandlerDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerDescriptor")
            .field("handler_type", &self.handler_type.name())
            .finish()
    }
}

/// All handlers registered for one message type.
#[derive(Debug, Clone)]
pub struct MessageRegistration {
    pub message_type: MessageType,
    pub kind: MessageKind,
    pub handlers: Vec<HandlerDescriptor>,
}

/// Registry statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryStats {
    pub request_types: usize,
    pub notification_types: usize,
    pub total_handlers: usize,
}

/// Collects registrations before the registry is sealed.
#[derive(Debug, Default)]
pub struct HandlerRegistryBuilder {
    registrations: HashMap<TypeId, MessageRegistration>,
    order: Vec<MessageType>,
}

impl HandlerRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `H` as the single handler for request type `R`.
    pub fn register_request<R, H>(&mut self) -> Result<&mut Self, RegistrationError>
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let message_type = MessageType::of::<R>();
        let handler_type = HandlerType::of::<H>();
        let registration = self.entry(message_type, MessageKind::Request)?;

        if let Some(existing) = registration.handlers.first() {
            return Err(RegistrationError::DuplicateHandler {
                message_type: message_type.name(),
                existing: existing.handler_type.name(),
                rejected: handler_type.name(),
            });
        }

        registration.handlers.push(HandlerDescriptor {
            handler_type,
            binder: bind_request::<R, H>,
        });
        debug!(
            message_type = message_type.name(),
            handler_type = handler_type.name(),
            "Registered request handler"
        );
        Ok(self)
    }

    /// Append `H` to the handlers of notification type `N`.
    pub fn register_notification<N, H>(&mut self) -> Result<&mut Self, RegistrationError>
    where
        N: Notification,
        H: NotificationHandler<N>,
    {
        let message_type = MessageType::of::<N>();
        let handler_type = HandlerType::of::<H>();
        let registration = self.entry(message_type, MessageKind::Notification)?;

        registration.handlers.push(HandlerDescriptor {
            handler_type,
            binder: bind_notification::<N, H>,
        });
        debug!(
            message_type = message_type.name(),
            handler_type = handler_type.name(),
            position = registration.handlers.len() - 1,
            "Registered notification handler"
        );
        Ok(self)
    }

    fn entry(
        &mut self,
        message_type: MessageType,
        kind: MessageKind,
    ) -> Result<&mut MessageRegistration, RegistrationError> {
        if !self.registrations.contains_key(&message_type.id()) {
            self.order.push(message_type);
        }

        let registration = self
            .registrations
            .entry(message_type.id())
            .or_insert_with(|| MessageRegistration {
                message_type,
                kind,
                handlers: Vec::new(),
            });

        if registration.kind != kind {
            return Err(RegistrationError::MessageKindConflict {
                message_type: message_type.name(),
                registered_as: registration.kind.as_str(),
            });
        }
        Ok(registration)
    }

    /// Bypasses the single-handler rule so dispatcher tests can exercise its own check.
    #[cfg(test)]
    pub(crate) fn push_request_unchecked<R, H>(&mut self)
    where
        R: Request,
        H: RequestHandler<R>,
    {
        let message_type = MessageType::of::<R>();
        if let Ok(registration) = self.entry(message_type, MessageKind::Request) {
            registration.handlers.push(HandlerDescriptor {
                handler_type: HandlerType::of::<H>(),
                binder: bind_request::<R, H>,
            });
        }
    }

    /// Seal the registrations. No further mutation is possible.
    pub fn build(self) -> HandlerRegistry {
        let registry = HandlerRegistry {
            registrations: self.registrations,
            order: self.order,
        };
        let stats = registry.stats();
        debug!(
            request_types = stats.request_types,
            notification_types = stats.notification_types,
            total_handlers = stats.total_handlers,
            "Handler registry sealed"
        );
        registry
    }
}

/// Immutable mapping from message type to ordered handler descriptors.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    registrations: HashMap<TypeId, MessageRegistration>,
    order: Vec<MessageType>,
}

impl HandlerRegistry {
    pub fn builder() -> HandlerRegistryBuilder {
        HandlerRegistryBuilder::new()
    }

    /// Handlers registered for `message_type`, in registration order. Empty when none.
    pub fn lookup(&self, message_type: &MessageType) -> &[HandlerDescriptor] {
        self.registrations
            .get(&message_type.id())
            .map(|registration| registration.handlers.as_slice())
            .unwrap_or(&[])
    }

    pub fn lookup_for<M: 'static>(&self) -> &[HandlerDescriptor] {
        self.lookup(&MessageType::of::<M>())
    }

    pub fn kind_of(&self, message_type: &MessageType) -> Option<MessageKind> {
        self.registrations
            .get(&message_type.id())
            .map(|registration| registration.kind)
    }

    /// Registered message types in first-registration order.
    pub fn message_types(&self) -> &[MessageType] {
        &self.order
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    pub fn stats(&self) -> RegistryStats {
        self.registrations
            .values()
            .fold(RegistryStats::default(), |mut stats, registration| {
                match registration.kind {
                    MessageKind::Request => stats.request_types += 1,
                    MessageKind::Notification => stats.notification_types += 1,
                }
                stats.total_handlers += registration.handlers.len();
                stats
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancellation::CancellationSignal;
    use crate::error::HandlerError;
    use async_trait::async_trait;

    struct Ping;

    impl Request for Ping {
        type Response = ();
    }

    #[derive(Clone)]
    struct Opened;

    impl Notification for Opened {}

    struct PingHandler;
    struct OtherPingHandler;
    struct FirstListener;
    struct SecondListener;

    #[async_trait]
    impl RequestHandler<Ping> for PingHandler {
        async fn handle(&self, _: Ping, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl RequestHandler<Ping> for OtherPingHandler {
        async fn handle(&self, _: Ping, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationHandler<Opened> for FirstListener {
        async fn handle(&self, _: Opened, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationHandler<Opened> for SecondListener {
        async fn handle(&self, _: Opened, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    // Lets a request type also be offered as a notification to provoke a kind conflict.
    #[derive(Clone)]
    struct Both;

    impl Request for Both {
        type Response = ();
    }

    impl Notification for Both {}

    struct BothHandler;

    #[async_trait]
    impl RequestHandler<Both> for BothHandler {
        async fn handle(&self, _: Both, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    #[async_trait]
    impl NotificationHandler<Both> for BothHandler {
        async fn handle(&self, _: Both, _: &CancellationSignal) -> Result<(), HandlerError> {
            Ok(())
        }
    }

    fn handler_names(descriptors: &[HandlerDescriptor]) -> Vec<&'static str> {
        descriptors
            .iter()
            .map(|d| d.handler_type().short_name())
            .collect()
    }

    #[test]
    fn test_request_registration_and_lookup() {
        let mut builder = HandlerRegistry::builder();
        builder.register_request::<Ping, PingHandler>().unwrap();
        let registry = builder.build();

        assert_eq!(handler_names(registry.lookup_for::<Ping>()), ["PingHandler"]);
        assert_eq!(
            registry.kind_of(&MessageType::of::<Ping>()),
            Some(MessageKind::Request)
        );
    }

    #[test]
    fn test_duplicate_request_handler_rejected() {
        let mut builder = HandlerRegistry::builder();
        builder.register_request::<Ping, PingHandler>().unwrap();

        let error = builder
            .register_request::<Ping, OtherPingHandler>()
            .unwrap_err();
        match error {
            RegistrationError::DuplicateHandler {
                existing, rejected, ..
            } => {
                assert!(existing.ends_with("PingHandler"));
                assert!(rejected.ends_with("OtherPingHandler"));
            }
            other => panic!("Expected DuplicateHandler, got {other:?}"),
        }

        // Same handler type again is still a duplicate for requests.
        assert!(builder.register_request::<Ping, PingHandler>().is_err());
        assert_eq!(builder.build().lookup_for::<Ping>().len(), 1);
    }

    #[test]
    fn test_notification_handlers_keep_registration_order() {
        let mut builder = HandlerRegistry::builder();
        builder
            .register_notification::<Opened, SecondListener>()
            .unwrap()
            .register_notification::<Opened, FirstListener>()
            .unwrap()
            .register_notification::<Opened, SecondListener>()
            .unwrap();
        let registry = builder.build();

        assert_eq!(
            handler_names(registry.lookup_for::<Opened>()),
            ["SecondListener", "FirstListener", "SecondListener"]
        );
    }

    #[test]
    fn test_lookup_of_unknown_type_is_empty() {
        let registry = HandlerRegistry::builder().build();
        assert!(registry.lookup_for::<Opened>().is_empty());
        assert!(registry.kind_of(&MessageType::of::<Opened>()).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_kind_conflict() {
        let mut builder = HandlerRegistry::builder();
        builder.register_request::<Both, BothHandler>().unwrap();

        let error = builder
            .register_notification::<Both, BothHandler>()
            .unwrap_err();
        assert_eq!(
            error,
            RegistrationError::MessageKindConflict {
                message_type: MessageType::of::<Both>().name(),
                registered_as: "request",
            }
        );
    }

    #[test]
    fn test_stats_and_message_order() {
        let mut builder = HandlerRegistry::builder();
        builder
            .register_notification::<Opened, FirstListener>()
            .unwrap()
            .register_request::<Ping, PingHandler>()
            .unwrap()
            .register_notification::<Opened, SecondListener>()
            .unwrap();
        let registry = builder.build();

        assert_eq!(
            registry.stats(),
            RegistryStats {
                request_types: 1,
                notification_types: 1,
                total_handlers: 3,
            }
        );
        assert_eq!(
            registry.message_types(),
            [MessageType::of::<Opened>(), MessageType::of::<Ping>()]
        );
    }
}
