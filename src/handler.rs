//! # Handlers
//!
//! Typed handler traits implemented by application code, and the type-erased
//! adapters the dispatcher invokes them through.
//!
//! The registry stores one [`Binder`] per registration. A binder takes the
//! instance produced by the resolver, checks it is the registered handler type,
//! and wraps it in an [`ErasedHandler`] that accepts boxed messages.

use std::any::{type_name, Any};
use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;

use crate::cancellation::CancellationSignal;
use crate::error::{HandlerError, MessageTypeMismatch, ResolutionError};
use crate::messages::{Notification, Request};
use crate::resolver::ResolvedHandler;

/// Type-erased message travelling through the pipeline.
pub type BoxedMessage = Box<dyn Any + Send>;

/// Type-erased handler result travelling back through the pipeline.
pub type BoxedResponse = Box<dyn Any + Send>;

/// Handles a single request type.
#[async_trait]
pub trait RequestHandler<R: Request>: Send + Sync + 'static {
    async fn handle(
        &self,
        request: R,
        cancellation: &CancellationSignal,
    ) -> Result<R::Response, HandlerError>;
}

/// One of possibly many subscribers to a notification type.
#[async_trait]
pub trait NotificationHandler<N: Notification>: Send + Sync + 'static {
    async fn handle(
        &self,
        notification: N,
        cancellation: &CancellationSignal,
    ) -> Result<(), HandlerError>;
}

/// Handler with its message and response types erased.
pub trait ErasedHandler: Send + Sync {
    fn invoke(
        &self,
        message: BoxedMessage,
        cancellation: CancellationSignal,
    ) -> BoxFuture<'static, Result<BoxedResponse, HandlerError>>;
}

/// Turns a resolved instance into an invocable handler.
pub(crate) type Binder = fn(ResolvedHandler) -> Result<Arc<dyn ErasedHandler>, ResolutionError>;

fn downcast_message<M: 'static>(message: BoxedMessage) -> Result<M, HandlerError> {
    message
        .downcast::<M>()
        .map(|boxed| *boxed)
        .map_err(|_| {
            Box::new(MessageTypeMismatch {
                expected: type_name::<M>(),
            }) as HandlerError
        })
}

fn downcast_instance<H: Send + Sync + 'static>(
    instance: ResolvedHandler,
) -> Result<Arc<H>, ResolutionError> {
    instance
        .downcast::<H>()
        .map_err(|_| ResolutionError::TypeMismatch {
            expected: type_name::<H>(),
        })
}

struct RequestAdapter<R, H> {
    handler: Arc<H>,
    _message: PhantomData<fn(R)>,
}

impl<R, H> ErasedHandler for RequestAdapter<R, H>
where
    R: Request,
    H: RequestHandler<R>,
{
    fn invoke(
        &self,
        message: BoxedMessage,
        cancellation: CancellationSignal,
    ) -> BoxFuture<'static, Result<BoxedResponse, HandlerError>> {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let request = downcast_message::<R>(message)?;
            let response = handler.handle(request, &cancellation).await?;
            Ok(Box::new(response) as BoxedResponse)
        })
    }
}

struct NotificationAdapter<N, H> {
    handler: Arc<H>,
    _message: PhantomData<fn(N)>,
}

impl<N, H> ErasedHandler for NotificationAdapter<N, H>
where
    N: Notification,
    H: NotificationHandler<N>,
{
    fn invoke(
        &self,
        message: BoxedMessage,
        cancellation: CancellationSignal,
    ) -> BoxFuture<'static, Result<BoxedResponse, HandlerError>> {
        let handler = Arc::clone(&self.handler);
        Box::pin(async move {
            let notification = downcast_message::<N>(message)?;
            handler.handle(notification, &cancellation).await?;
            Ok(Box::new(()) as BoxedResponse)
        })
    }
}

pub(crate) fn bind_request<R, H>(
    instance: ResolvedHandler,
) -> Result<Arc<dyn ErasedHandler>, ResolutionError>
where
    R: Request,
    H: RequestHandler<R>,
{
    let handler = downcast_instance::<H>(instance)?;
    Ok(Arc::new(RequestAdapter::<R, H> {
        handler,
        _message: PhantomData,
    }))
}

pub(crate) fn bind_notification<N, H>(
    instance: ResolvedHandler,
) -> Result<Arc<dyn ErasedHandler>, ResolutionError>
where
    N: Notification,
    H: NotificationHandler<N>,
{
    let handler = downcast_instance::<H>(instance)?;
    Ok(Arc::new(NotificationAdapter::<N, H> {
        handler,
        _message: PhantomData,
    }))
}
