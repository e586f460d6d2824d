//! # Pipeline
//!
//! Ordered cross-cutting behaviors wrapped around every handler invocation.
//!
//! ## Composition
//!
//! The first behavior added is the outermost: it sees the message first on the
//! way in and the result last on the way out.
//!
//! ```text
//! dispatcher ─► B1 ─► B2 ─► B3 ─► handler
//!            ◄─    ◄─    ◄─    ◄─
//! ```
//!
//! Each behavior receives the [`Envelope`] and a [`Next`] continuation. It may
//! inspect or replace the message, call `next.run(envelope)` and inspect or
//! replace the response, return early without calling `next`, or pass an error
//! from `next` straight through.
//!
//! Behaviors run for both requests and notifications; a notification handler's
//! response is `()`. Use [`Envelope::kind`] or [`Envelope::message`] to target
//! specific messages.

pub mod behaviors;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::cancellation::CancellationSignal;
use crate::error::HandlerError;
use crate::handler::{BoxedMessage, BoxedResponse, ErasedHandler};
use crate::messages::{HandlerType, MessageKind, MessageType};

pub use behaviors::{HandlerTimeout, LoggingBehavior, TimeoutBehavior};

/// A message on its way to one handler.
pub struct Envelope {
    message: BoxedMessage,
    message_type: MessageType,
    handler_type: HandlerType,
    kind: MessageKind,
    cancellation: CancellationSignal,
}

impl Envelope {
    pub(crate) fn new(
        message: BoxedMessage,
        message_type: MessageType,
        handler_type: HandlerType,
        kind: MessageKind,
        cancellation: CancellationSignal,
    ) -> Self {
        Self {
            message,
            message_type,
            handler_type,
            kind,
            cancellation,
        }
    }

    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    pub fn handler_type(&self) -> &HandlerType {
        &self.handler_type
    }

    pub fn kind(&self) -> MessageKind {
        self.kind
    }

    pub fn cancellation(&self) -> &CancellationSignal {
        &self.cancellation
    }

    /// The message, if it is an `M`.
    pub fn message<M: 'static>(&self) -> Option<&M> {
        self.message.downcast_ref::<M>()
    }

    pub fn message_mut<M: 'static>(&mut self) -> Option<&mut M> {
        self.message.downcast_mut::<M>()
    }

    /// Swap in a new message, returning the previous one.
    ///
    /// The handler still expects its registered message type; anything else
    /// fails the invocation.
    pub fn replace_message<M: Send + 'static>(&mut self, message: M) -> BoxedMessage {
        std::mem::replace(&mut self.message, Box::new(message))
    }

    fn into_parts(self) -> (BoxedMessage, CancellationSignal) {
        (self.message, self.cancellation)
    }
}

impl fmt::Debug for Envelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Envelope")
            .field("message_type", &self.message_type.name())
            .field("handler_type", &self.handler_type.name())
            .field("kind", &self.kind)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish()
    }
}

/// Cross-cutting logic around a handler invocation.
#[async_trait]
pub trait PipelineBehavior: Send + Sync {
    async fn handle(
        &self,
        envelope: Envelope,
        next: Next<'_>,
    ) -> Result<BoxedResponse, HandlerError>;

    /// Behavior name for diagnostics
    fn name(&self) -> &str {
        "unnamed_behavior"
    }
}

/// Continuation into the rest of the chain and finally the handler.
pub struct Next<'a> {
    behaviors: &'a [Arc<dyn PipelineBehavior>],
    handler: &'a dyn ErasedHandler,
}

impl<'a> Next<'a> {
    pub fn run(self, envelope: Envelope) -> BoxFuture<'a, Result<BoxedResponse, HandlerError>> {
        match self.behaviors.split_first() {
            Some((behavior, rest)) => behavior.handle(
                envelope,
                Next {
                    behaviors: rest,
                    handler: self.handler,
                },
            ),
            None => {
                let (message, cancellation) = envelope.into_parts();
                self.handler.invoke(message, cancellation)
            }
        }
    }

    /// Behaviors still to run before the handler.
    pub fn remaining(&self) -> usize {
        self.behaviors.len()
    }
}

/// Ordered list of behaviors, first-added outermost.
#[derive(Clone, Default)]
pub struct PipelineChain {
    behaviors: Vec<Arc<dyn PipelineBehavior>>,
}

impl PipelineChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, behavior: Arc<dyn PipelineBehavior>) {
        self.behaviors.push(behavior);
    }

    pub fn with(mut self, behavior: impl PipelineBehavior + 'static) -> Self {
        self.push(Arc::new(behavior));
        self
    }

    pub fn len(&self) -> usize {
        self.behaviors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.behaviors.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn PipelineBehavior>> {
        self.behaviors.iter()
    }

    pub fn names(&self) -> Vec<&str> {
        self.behaviors.iter().map(|b| b.name()).collect()
    }

    /// Run `envelope` through every behavior and then `handler`.
    pub fn execute<'a>(
        &'a self,
        envelope: Envelope,
        handler: &'a dyn ErasedHandler,
    ) -> BoxFuture<'a, Result<BoxedResponse, HandlerError>> {
        Next {
            behaviors: &self.behaviors,
            handler,
        }
        .run(envelope)
    }
}

impl fmt::Debug for PipelineChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineChain")
            .field("behaviors", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{bind_request, RequestHandler};
    use crate::messages::Request;
    use parking_lot::Mutex;

    struct Greet(String);

    impl Request for Greet {
        type Response = String;
    }

    struct GreetHandler {
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl RequestHandler<Greet> for GreetHandler {
        async fn handle(
            &self,
            request: Greet,
            _cancellation: &CancellationSignal,
        ) -> Result<String, HandlerError> {
            self.log.lock().push("handler".to_string());
            if request.0.is_empty() {
                return Err("empty greeting".into());
            }
            Ok(format!("hello {}", request.0))
        }
    }

    struct Recording {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl PipelineBehavior for Recording {
        async fn handle(
            &self,
            envelope: Envelope,
            next: Next<'_>,
        ) -> Result<BoxedResponse, HandlerError> {
            self.log.lock().push(format!("{} in", self.label));
            let result = next.run(envelope).await;
            self.log.lock().push(format!("{} out", self.label));
            result
        }

        fn name(&self) -> &str {
            self.label
        }
    }

    struct Uppercase;

    #[async_trait]
    impl PipelineBehavior for Uppercase {
        async fn handle(
            &self,
            mut envelope: Envelope,
            next: Next<'_>,
        ) -> Result<BoxedResponse, HandlerError> {
            if let Some(greet) = envelope.message_mut::<Greet>() {
                greet.0 = greet.0.to_uppercase();
            }
            let response = next.run(envelope).await?;
            match response.downcast::<String>() {
                Ok(text) => Ok(Box::new(format!("{text}!"))),
                Err(other) => Ok(other),
            }
        }
    }

    struct ShortCircuit;

    #[async_trait]
    impl PipelineBehavior for ShortCircuit {
        async fn handle(
            &self,
            _envelope: Envelope,
            _next: Next<'_>,
        ) -> Result<BoxedResponse, HandlerError> {
            Ok(Box::new("cached".to_string()))
        }
    }

    fn envelope(name: &str) -> Envelope {
        Envelope::new(
            Box::new(Greet(name.to_string())),
            MessageType::of::<Greet>(),
            HandlerType::of::<GreetHandler>(),
            MessageKind::Request,
            CancellationSignal::never(),
        )
    }

    fn handler(log: &Arc<Mutex<Vec<String>>>) -> Arc<dyn ErasedHandler> {
        bind_request::<Greet, GreetHandler>(Arc::new(GreetHandler {
            log: Arc::clone(log),
        }))
        .unwrap()
    }

    async fn run(chain: &PipelineChain, handler: &Arc<dyn ErasedHandler>, name: &str) -> Result<String, HandlerError> {
        let response = chain.execute(envelope(name), handler.as_ref()).await?;
        Ok(*response.downcast::<String>().unwrap())
    }

    #[tokio::test]
    async fn test_first_behavior_is_outermost() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PipelineChain::new()
            .with(Recording {
                label: "outer",
                log: Arc::clone(&log),
            })
            .with(Recording {
                label: "inner",
                log: Arc::clone(&log),
            });

        let response = run(&chain, &handler(&log), "world").await.unwrap();

        assert_eq!(response, "hello world");
        assert_eq!(
            *log.lock(),
            ["outer in", "inner in", "handler", "inner out", "outer out"]
        );
        assert_eq!(chain.names(), ["outer", "inner"]);
    }

    #[tokio::test]
    async fn test_behavior_transforms_request_and_response() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PipelineChain::new().with(Uppercase);

        let response = run(&chain, &handler(&log), "world").await.unwrap();
        assert_eq!(response, "hello WORLD!");
    }

    #[tokio::test]
    async fn test_short_circuit_skips_handler() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PipelineChain::new()
            .with(Recording {
                label: "outer",
                log: Arc::clone(&log),
            })
            .with(ShortCircuit);

        let response = run(&chain, &handler(&log), "world").await.unwrap();

        assert_eq!(response, "cached");
        assert_eq!(*log.lock(), ["outer in", "outer out"]);
    }

    #[tokio::test]
    async fn test_handler_error_propagates_through_behaviors() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PipelineChain::new().with(Recording {
            label: "outer",
            log: Arc::clone(&log),
        });

        let error = run(&chain, &handler(&log), "").await.unwrap_err();

        assert_eq!(error.to_string(), "empty greeting");
        assert_eq!(*log.lock(), ["outer in", "handler", "outer out"]);
    }

    #[tokio::test]
    async fn test_empty_chain_invokes_handler_directly() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = PipelineChain::new();
        assert!(chain.is_empty());

        let response = run(&chain, &handler(&log), "there").await.unwrap();
        assert_eq!(response, "hello there");
    }

    #[test]
    fn test_envelope_replace_message() {
        let mut envelope = envelope("a");
        let previous = envelope.replace_message(Greet("b".to_string()));

        assert_eq!(previous.downcast::<Greet>().unwrap().0, "a");
        assert_eq!(envelope.message::<Greet>().unwrap().0, "b");
        assert!(envelope.message::<String>().is_none());
        assert_eq!(envelope.kind(), MessageKind::Request);
    }
}
