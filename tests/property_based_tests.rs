mod common;

use std::sync::Arc;

use async_trait::async_trait;
use common::ObservationLog;
use mediator_core::{
    CancellationSignal, DispatcherBuilder, DispatcherConfig, HandlerError, Lifetime,
    Notification, NotificationHandler, PublishStrategy,
};
use proptest::prelude::*;

#[derive(Debug, Clone)]
struct Signal {
    value: u32,
}

impl Notification for Signal {}

/// Handler whose behavior is fixed per registration slot.
struct Slot<const ID: usize> {
    log: Arc<ObservationLog>,
    fail: bool,
}

#[async_trait]
impl<const ID: usize> NotificationHandler<Signal> for Slot<ID> {
    async fn handle(&self, signal: Signal, _: &CancellationSignal) -> Result<(), HandlerError> {
        self.log.write(format!("{ID}:{}", signal.value));
        if self.fail {
            return Err(format!("slot {ID} failed").into());
        }
        Ok(())
    }
}

fn register<const ID: usize>(
    builder: DispatcherBuilder,
    log: &Arc<ObservationLog>,
    fail: bool,
) -> DispatcherBuilder {
    let log = Arc::clone(log);
    builder
        .add_notification_handler::<Signal, Slot<ID>, _>(Lifetime::Transient, move |_| {
            Ok(Slot {
                log: Arc::clone(&log),
                fail,
            })
        })
        .expect("notification registration should succeed")
}

/// Registers up to six distinct handler types in order; slot `i` fails when `failures[i]`.
fn build(
    failures: &[bool],
    log: &Arc<ObservationLog>,
    strategy: PublishStrategy,
) -> mediator_core::Dispatcher {
    let mut builder = DispatcherBuilder::new().with_config(DispatcherConfig {
        publish_strategy: strategy,
        ..DispatcherConfig::default()
    })
    .expect("valid dispatcher config");
    for (slot, fail) in failures.iter().copied().enumerate() {
        builder = match slot {
            0 => register::<0>(builder, log, fail),
            1 => register::<1>(builder, log, fail),
            2 => register::<2>(builder, log, fail),
            3 => register::<3>(builder, log, fail),
            4 => register::<4>(builder, log, fail),
            _ => register::<5>(builder, log, fail),
        };
    }
    builder.build()
}

fn strategy_strategy() -> impl Strategy<Value = PublishStrategy> {
    prop_oneof![
        Just(PublishStrategy::Sequential),
        Just(PublishStrategy::Concurrent),
    ]
}

proptest! {
    /// Property: every handler runs once, in registration order, and exactly the failing slots are reported
    #[test]
    fn publish_invokes_all_handlers_in_order(
        failures in prop::collection::vec(any::<bool>(), 0..=6),
        value in any::<u32>(),
        strategy in strategy_strategy(),
    ) {
        let log = Arc::new(ObservationLog::default());
        let dispatcher = build(&failures, &log, strategy);

        let result = tokio_test::block_on(dispatcher.publish(Signal { value }));

        let expected: Vec<String> = (0..failures.len()).map(|slot| format!("{slot}:{value}")).collect();
        prop_assert_eq!(log.lines(), expected);

        let failing: Vec<usize> = failures
            .iter()
            .enumerate()
            .filter(|(_, fail)| **fail)
            .map(|(slot, _)| slot)
            .collect();

        match result {
            Ok(()) => prop_assert!(failing.is_empty()),
            Err(error) => {
                let aggregated = error.notification_failures();
                prop_assert!(aggregated.is_some());
                let reported: Vec<usize> = aggregated.unwrap().failures.iter().map(|f| f.index).collect();
                prop_assert_eq!(reported, failing);
            }
        }
    }
}
