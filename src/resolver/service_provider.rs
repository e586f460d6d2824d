//! # Service Provider
//!
//! Default [`HandlerResolver`]: a type-keyed registry of factories with
//! per-service lifetimes.
//!
//! ## Lifetimes
//!
//! - **Transient**: the factory runs on every resolution
//! - **Scoped**: one instance per provider scope (see [`ServiceProvider::create_scope`])
//! - **Singleton**: one instance shared by the root provider and every scope
//!
//! Factories receive the resolving provider so they can pull in their own
//! dependencies. Singleton factories always receive the root provider, which
//! keeps a singleton from capturing a scoped instance.
//!
//! A factory that (directly or through other factories) asks for the service it
//! is constructing fails with [`ResolutionError::ConstructionFailed`] naming the
//! cycle.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{HandlerResolver, ResolvedHandler};
use crate::error::ResolutionError;
use crate::messages::HandlerType;

/// How long a resolved instance lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Lifetime {
    Transient,
    Scoped,
    Singleton,
}

type Factory = Arc<dyn Fn(&ServiceProvider) -> Result<ResolvedHandler, ResolutionError> + Send + Sync>;

type InstanceCache = RwLock<HashMap<TypeId, ResolvedHandler>>;

#[derive(Clone)]
struct ServiceDescriptor {
    service: HandlerType,
    lifetime: Lifetime,
    factory: Factory,
}

/// Mutable set of service registrations, consumed by [`ServiceCollection::build`].
#[derive(Default, Clone)]
pub struct ServiceCollection {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory for `T`. A later registration for the same type replaces the earlier one.
    pub fn add<T, F>(mut self, lifetime: Lifetime, factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<T, ResolutionError> + Send + Sync + 'static,
    {
        self.insert(lifetime, factory);
        self
    }

    /// Register a pre-built shared instance.
    pub fn add_instance<T>(mut self, instance: Arc<T>) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.insert_instance(instance);
        self
    }

    /// Register `T::default()` as the factory.
    pub fn add_default<T>(self, lifetime: Lifetime) -> Self
    where
        T: Default + Send + Sync + 'static,
    {
        self.add::<T, _>(lifetime, |_| Ok(T::default()))
    }

    pub(crate) fn insert<T, F>(&mut self, lifetime: Lifetime, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&ServiceProvider) -> Result<T, ResolutionError> + Send + Sync + 'static,
    {
        let service = HandlerType::of::<T>();
        let factory: Factory = Arc::new(move |provider: &ServiceProvider| {
            factory(provider)
                .map(|instance| Arc::new(instance) as ResolvedHandler)
                .map_err(|e| {
                    let own_failure = matches!(
                        &e,
                        ResolutionError::ConstructionFailed { type_name, .. }
                            if *type_name == service.name()
                    );
                    if own_failure {
                        e
                    } else {
                        ResolutionError::construction(service.name(), e)
                    }
                })
        });
        self.put(ServiceDescriptor {
            service,
            lifetime,
            factory,
        });
    }

    pub(crate) fn insert_instance<T>(&mut self, instance: Arc<T>)
    where
        T: Send + Sync + 'static,
    {
        let instance: ResolvedHandler = instance;
        self.put(ServiceDescriptor {
            service: HandlerType::of::<T>(),
            lifetime: Lifetime::Singleton,
            factory: Arc::new(move |_: &ServiceProvider| Ok(Arc::clone(&instance))),
        });
    }

    /// Later registrations for a type replace earlier ones.
    fn put(&mut self, descriptor: ServiceDescriptor) {
        if let Some(previous) = self.descriptors.insert(descriptor.service.id(), descriptor) {
            warn!(
                service = previous.service.name(),
                previous_lifetime = ?previous.lifetime,
                "Replacing existing service registration; the last factory serves every resolution of this type"
            );
        }
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.descriptors.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    /// Freeze the registrations into a root provider.
    pub fn build(self) -> ServiceProvider {
        let root = Arc::new(ProviderRoot {
            descriptors: self.descriptors,
            singletons: RwLock::new(HashMap::new()),
            root_scope: Arc::new(RwLock::new(HashMap::new())),
        });
        ServiceProvider {
            scoped: Arc::clone(&root.root_scope),
            root,
            resolving: Vec::new(),
        }
    }
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceCollection")
            .field("services", &self.descriptors.len())
            .finish()
    }
}

struct ProviderRoot {
    descriptors: HashMap<TypeId, ServiceDescriptor>,
    singletons: InstanceCache,
    root_scope: Arc<InstanceCache>,
}

/// Resolves services registered in a [`ServiceCollection`].
///
/// Cloning a provider yields a handle to the same scope.
#[derive(Clone)]
pub struct ServiceProvider {
    root: Arc<ProviderRoot>,
    scoped: Arc<InstanceCache>,
    /// Services under construction in the current resolution chain, outermost first.
    resolving: Vec<HandlerType>,
}

impl ServiceProvider {
    /// New scope sharing singletons with this provider but with its own scoped instances.
    pub fn create_scope(&self) -> ServiceProvider {
        ServiceProvider {
            root: Arc::clone(&self.root),
            scoped: Arc::new(RwLock::new(HashMap::new())),
            resolving: Vec::new(),
        }
    }

    /// Resolve a service by its concrete type.
    pub fn get<T: Send + Sync + 'static>(&self) -> Result<Arc<T>, ResolutionError> {
        self.resolve_service(&HandlerType::of::<T>())?
            .downcast::<T>()
            .map_err(|_| ResolutionError::TypeMismatch {
                expected: type_name::<T>(),
            })
    }

    pub fn contains(&self, service: &HandlerType) -> bool {
        self.root.descriptors.contains_key(&service.id())
    }

    pub fn lifetime_of(&self, service: &HandlerType) -> Option<Lifetime> {
        self.root
            .descriptors
            .get(&service.id())
            .map(|descriptor| descriptor.lifetime)
    }

    fn resolve_service(&self, service: &HandlerType) -> Result<ResolvedHandler, ResolutionError> {
        let descriptor = self.root.descriptors.get(&service.id()).ok_or(
            ResolutionError::NotRegistered {
                type_name: service.name(),
            },
        )?;

        match descriptor.lifetime {
            Lifetime::Transient => (descriptor.factory)(&self.enter(service)?),
            Lifetime::Scoped => Self::get_or_create(&self.scoped, service, || {
                (descriptor.factory)(&self.enter(service)?)
            }),
            Lifetime::Singleton => Self::get_or_create(&self.root.singletons, service, || {
                (descriptor.factory)(&self.root_provider().enter(service)?)
            }),
        }
    }

    /// Provider handed to the factory of `service`, or an error if `service`
    /// is already being constructed further up the chain.
    fn enter(&self, service: &HandlerType) -> Result<ServiceProvider, ResolutionError> {
        if self.resolving.contains(service) {
            let cycle = self
                .resolving
                .iter()
                .chain(std::iter::once(service))
                .map(|s| s.short_name())
                .collect::<Vec<_>>()
                .join(" -> ");
            warn!(service = service.name(), cycle = %cycle, "Circular service dependency");
            return Err(ResolutionError::construction(
                service.name(),
                format!("circular dependency: {cycle}"),
            ));
        }

        let mut resolving = self.resolving.clone();
        resolving.push(*service);
        Ok(ServiceProvider {
            root: Arc::clone(&self.root),
            scoped: Arc::clone(&self.scoped),
            resolving,
        })
    }

    /// Root scope, keeping the current resolution chain.
    fn root_provider(&self) -> ServiceProvider {
        ServiceProvider {
            root: Arc::clone(&self.root),
            scoped: Arc::clone(&self.root.root_scope),
            resolving: self.resolving.clone(),
        }
    }

    fn get_or_create(
        cache: &InstanceCache,
        service: &HandlerType,
        create: impl FnOnce() -> Result<ResolvedHandler, ResolutionError>,
    ) -> Result<ResolvedHandler, ResolutionError> {
        let key = service.id();
        if let Some(existing) = cache.read().get(&key) {
            return Ok(Arc::clone(existing));
        }

        // The lock is not held while the factory runs so it can resolve its own dependencies.
        let created = create()?;
        let mut cache = cache.write();
        Ok(Arc::clone(cache.entry(key).or_insert(created)))
    }
}

impl HandlerResolver for ServiceProvider {
    fn resolve(&self, handler_type: &HandlerType) -> Result<ResolvedHandler, ResolutionError> {
        self.resolve_service(handler_type)
    }
}

impl fmt::Debug for ServiceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProvider")
            .field("services", &self.root.descriptors.len())
            .field("singletons", &self.root.singletons.read().len())
            .field("scoped", &self.scoped.read().len())
            .finish()
    }
}
