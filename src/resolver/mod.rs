//! # Handler Resolution
//!
//! The dispatcher never constructs handlers. It asks a [`HandlerResolver`] for an
//! instance of the registered handler type on every invocation; whether that
//! instance is fresh, scoped or shared is the resolver's business.
//!
//! ## Available Resolvers
//!
//! - **ServiceProvider**: small type-keyed container with transient, scoped and
//!   singleton lifetimes
//! - **Closures**: any `Fn(&HandlerType) -> Result<ResolvedHandler, ResolutionError>`
//!
//! ## Usage
//!
//! ```rust
//! use mediator_core::resolver::{HandlerResolver, Lifetime, ServiceCollection};
//! use mediator_core::HandlerType;
//!
//! struct AuditHandler;
//!
//! let provider = ServiceCollection::new()
//!     .add::<AuditHandler, _>(Lifetime::Transient, |_| Ok(AuditHandler))
//!     .build();
//!
//! let instance = provider.resolve(&HandlerType::of::<AuditHandler>()).unwrap();
//! assert!(instance.downcast::<AuditHandler>().is_ok());
//! ```

pub mod service_provider;

use std::any::Any;
use std::sync::Arc;

use crate::error::ResolutionError;
use crate::messages::HandlerType;

pub use service_provider::{Lifetime, ServiceCollection, ServiceProvider};

/// A constructed handler instance with its concrete type erased.
pub type ResolvedHandler = Arc<dyn Any + Send + Sync>;

/// Produces handler instances by type. Injected into the dispatcher at construction.
pub trait HandlerResolver: Send + Sync {
    fn resolve(&self, handler_type: &HandlerType) -> Result<ResolvedHandler, ResolutionError>;
}

impl<F> HandlerResolver for F
where
    F: Fn(&HandlerType) -> Result<ResolvedHandler, ResolutionError> + Send + Sync,
{
    fn resolve(&self, handler_type: &HandlerType) -> Result<ResolvedHandler, ResolutionError> {
        self(handler_type)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoHandler;

    #[test]
    fn test_closure_resolver() {
        let resolver = |handler_type: &HandlerType| -> Result<ResolvedHandler, ResolutionError> {
            if *handler_type == HandlerType::of::<EchoHandler>() {
                Ok(Arc::new(EchoHandler))
            } else {
                Err(ResolutionError::NotRegistered {
                    type_name: handler_type.name(),
                })
            }
        };

        let dyn_resolver: &dyn HandlerResolver = &resolver;
        assert!(dyn_resolver
            .resolve(&HandlerType::of::<EchoHandler>())
            .is_ok());
        assert!(matches!(
            dyn_resolver.resolve(&HandlerType::of::<String>()),
            Err(ResolutionError::NotRegistered { .. })
        ));
    }
}
