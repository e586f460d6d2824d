use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use mediator_core::{
    CancellationSignal, HandlerError, Notification, NotificationHandler, Request, RequestHandler,
};

/// Ordered record of what handlers observed.
#[derive(Debug, Default)]
pub struct ObservationLog {
    lines: Mutex<Vec<String>>,
}

impl ObservationLog {
    pub fn write(&self, line: impl Into<String>) {
        self.lines.lock().push(line.into());
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().clone()
    }
}

/// Formats the reply for [`PingHandler`].
#[derive(Debug, Default)]
pub struct ReplyWriter {
    calls: AtomicUsize,
}

impl ReplyWriter {
    pub fn reply(&self, message: &str) -> String {
        self.calls.fetch_add(1, Ordering::SeqCst);
        format!("{message} Pong")
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[derive(Debug, Clone)]
pub struct Ping {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pong {
    pub message: String,
}

impl Request for Ping {
    type Response = Pong;
}

pub struct PingHandler {
    pub writer: Arc<ReplyWriter>,
}

#[async_trait]
impl RequestHandler<Ping> for PingHandler {
    async fn handle(&self, ping: Ping, _: &CancellationSignal) -> Result<Pong, HandlerError> {
        Ok(Pong {
            message: self.writer.reply(&ping.message),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ChangeStateNotification {
    pub state: String,
}

impl Notification for ChangeStateNotification {}

pub struct StateChangedHandler {
    pub log: Arc<ObservationLog>,
}

#[async_trait]
impl NotificationHandler<ChangeStateNotification> for StateChangedHandler {
    async fn handle(
        &self,
        notification: ChangeStateNotification,
        _: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        self.log
            .write(format!("State changed to {}", notification.state));
        Ok(())
    }
}

pub struct AnotherStateChangedHandler {
    pub log: Arc<ObservationLog>,
}

#[async_trait]
impl NotificationHandler<ChangeStateNotification> for AnotherStateChangedHandler {
    async fn handle(
        &self,
        notification: ChangeStateNotification,
        _: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        self.log
            .write(format!("Another State changed to {}", notification.state));
        Ok(())
    }
}

/// Records the attempt and then fails.
pub struct FailingStateHandler {
    pub log: Arc<ObservationLog>,
}

#[derive(Debug, thiserror::Error)]
#[error("state store unavailable while applying {state}")]
pub struct StateStoreUnavailable {
    pub state: String,
}

#[async_trait]
impl NotificationHandler<ChangeStateNotification> for FailingStateHandler {
    async fn handle(
        &self,
        notification: ChangeStateNotification,
        _: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        self.log
            .write(format!("Failing attempt for {}", notification.state));
        Err(Box::new(StateStoreUnavailable {
            state: notification.state,
        }))
    }
}

/// Writes its line only after a delay, so concurrent runs finish out of order.
pub struct SlowStateHandler {
    pub log: Arc<ObservationLog>,
}

#[async_trait]
impl NotificationHandler<ChangeStateNotification> for SlowStateHandler {
    async fn handle(
        &self,
        notification: ChangeStateNotification,
        _: &CancellationSignal,
    ) -> Result<(), HandlerError> {
        tokio::time::sleep(Duration::from_millis(50)).await;
        self.log
            .write(format!("Slow State changed to {}", notification.state));
        Ok(())
    }
}

/// Per-scope unit of work; counts how many handlers shared it.
#[derive(Debug, Default)]
pub struct UnitOfWork {
    pub touches: AtomicUsize,
}

#[derive(Debug, Clone)]
pub struct Touch;

impl Request for Touch {
    type Response = usize;
}

pub struct TouchHandler {
    pub unit_of_work: Arc<UnitOfWork>,
}

#[async_trait]
impl RequestHandler<Touch> for TouchHandler {
    async fn handle(&self, _: Touch, _: &CancellationSignal) -> Result<usize, HandlerError> {
        Ok(self.unit_of_work.touches.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

/// Waits for cancellation and reports it.
#[derive(Debug, Clone)]
pub struct WaitForShutdown;

impl Request for WaitForShutdown {
    type Response = &'static str;
}

pub struct WaitForShutdownHandler;

#[async_trait]
impl RequestHandler<WaitForShutdown> for WaitForShutdownHandler {
    async fn handle(
        &self,
        _: WaitForShutdown,
        cancellation: &CancellationSignal,
    ) -> Result<&'static str, HandlerError> {
        cancellation.cancelled().await;
        Ok("stopped")
    }
}
