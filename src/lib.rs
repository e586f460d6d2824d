#![allow(clippy::doc_markdown)] // Allow technical terms in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Mediator Core Rust
//!
//! Typed in-process mediator: requests go to exactly one handler, notifications
//! fan out to every subscriber, and both pass through an ordered chain of
//! pipeline behaviors.
//!
//! ## Overview
//!
//! Senders depend only on the [`Dispatcher`]. They never name a handler; routing
//! is by the concrete message type. Handler instances are produced per invocation
//! by an injected [`resolver::HandlerResolver`], so handler lifetimes and
//! dependencies stay outside the mediator.
//!
//! ## Module Organization
//!
//! - [`messages`] - `Request`/`Notification` marker traits and type identities
//! - [`handler`] - Handler traits and their type-erased adapters
//! - [`registry`] - Sealed message-type to handler routing table
//! - [`resolver`] - Handler resolution boundary and a built-in service provider
//! - [`pipeline`] - Cross-cutting behaviors around every handler invocation
//! - [`dispatcher`] - Send and Publish
//! - [`bootstrap`] - `DispatcherBuilder` assembling all of the above
//! - [`cancellation`] - Cooperative cancellation signal
//! - [`config`] - YAML configuration with environment overrides
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use async_trait::async_trait;
//! use mediator_core::{
//!     CancellationSignal, DispatcherBuilder, HandlerError, Lifetime, Request, RequestHandler,
//! };
//!
//! struct Ping(String);
//!
//! impl Request for Ping {
//!     type Response = String;
//! }
//!
//! struct PingHandler;
//!
//! #[async_trait]
//! impl RequestHandler<Ping> for PingHandler {
//!     async fn handle(&self, ping: Ping, _: &CancellationSignal) -> Result<String, HandlerError> {
//!         Ok(format!("{} Pong", ping.0))
//!     }
//! }
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let dispatcher = DispatcherBuilder::new()
//!     .add_request_handler::<Ping, PingHandler, _>(Lifetime::Transient, |_| Ok(PingHandler))?
//!     .build();
//!
//! assert_eq!(dispatcher.send(Ping("Hello".into())).await?, "Hello Pong");
//! # Ok(())
//! # }
//! ```
//!
//! ## Testing
//!
//! ```bash
//! cargo test --lib    # Unit tests
//! cargo test          # Unit and integration tests
//! ```

pub mod bootstrap;
pub mod cancellation;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod logging;
pub mod messages;
pub mod pipeline;
pub mod registry;
pub mod resolver;

pub use bootstrap::DispatcherBuilder;
pub use cancellation::CancellationSignal;
pub use config::{
    ConfigManager, DispatcherConfig, LoggingConfig, MediatorConfig, NotificationErrorPolicy,
    PublishStrategy,
};
pub use dispatcher::Dispatcher;
pub use error::{
    DispatchError, HandlerError, HandlerFailure, NotificationFailures, RegistrationError,
    ResolutionError, Result,
};
pub use handler::{NotificationHandler, RequestHandler};
pub use messages::{HandlerType, MessageKind, MessageType, Notification, Request};
pub use pipeline::{Envelope, LoggingBehavior, Next, PipelineBehavior, PipelineChain, TimeoutBehavior};
pub use registry::{HandlerRegistry, HandlerRegistryBuilder};
pub use resolver::{HandlerResolver, Lifetime, ResolvedHandler, ServiceCollection, ServiceProvider};
