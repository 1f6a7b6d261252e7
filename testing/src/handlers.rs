//! Delivery-counting handler.

use plugboard_core::{Context, Handler, HandlerFuture, Message};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Deliveries {
    count: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    messages: Mutex<Vec<Message>>,
    notify: Notify,
}

/// Counts completed deliveries.
///
/// A delivery counts once the handler's future completes, after the
/// optional delay. The handler also tracks how many of its invocations ran
/// at the same time.
#[derive(Debug, Default)]
pub struct CountingHandler {
    deliveries: Arc<Deliveries>,
    delay: Option<Duration>,
}

impl CountingHandler {
    /// A handler that completes immediately
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// A handler that sleeps for `delay` before completing
    #[must_use]
    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            deliveries: Arc::default(),
            delay: Some(delay),
        })
    }

    /// Completed deliveries
    #[must_use]
    pub fn count(&self) -> usize {
        self.deliveries.count.load(Ordering::SeqCst)
    }

    /// Highest number of invocations observed running at once
    #[must_use]
    pub fn max_in_flight(&self) -> usize {
        self.deliveries.max_in_flight.load(Ordering::SeqCst)
    }

    /// Messages of completed deliveries, in completion order
    #[must_use]
    pub fn messages(&self) -> Vec<Message> {
        self.deliveries
            .messages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Wait until at least `expected` deliveries completed.
    ///
    /// Returns `false` if `timeout` elapses first.
    pub async fn wait_for(&self, expected: usize, timeout: Duration) -> bool {
        let deliveries = &self.deliveries;
        let reached = async {
            loop {
                let notified = deliveries.notify.notified();
                if deliveries.count.load(Ordering::SeqCst) >= expected {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, reached).await.is_ok()
    }
}

impl Handler for CountingHandler {
    fn handle(&self, _ctx: Context, message: Message) -> HandlerFuture {
        let deliveries = Arc::clone(&self.deliveries);
        let delay = self.delay;

        Box::pin(async move {
            let running = deliveries.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            deliveries.max_in_flight.fetch_max(running, Ordering::SeqCst);

            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }

            deliveries.in_flight.fetch_sub(1, Ordering::SeqCst);
            deliveries
                .messages
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(message);
            deliveries.count.fetch_add(1, Ordering::SeqCst);
            deliveries.notify.notify_waiters();
            Ok(())
        })
    }
}
