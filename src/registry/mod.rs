//! # Registry Infrastructure
//!
//! Static mapping from message types to handler types, built once at startup.
//!
//! ## Architecture
//!
//! ```text
//! Registry Infrastructure
//! ├── HandlerRegistryBuilder  (mutable, setup time)
//! └── HandlerRegistry         (sealed, shared read-only by the dispatcher)
//! ```
//!
//! Keys are `TypeId`s taken from the generic parameters of the registration
//! calls, so no runtime reflection is involved in routing.

pub mod handler_registry;

// Re-export main types for easy access
pub use handler_registry::{
    HandlerDescriptor, HandlerRegistry, HandlerRegistryBuilder, MessageRegistration, RegistryStats,
};
