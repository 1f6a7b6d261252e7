//! In-memory message bus with a bounded worker pool.
//!
//! Every delivery becomes a job. With a pool configured, jobs go through
//! one bounded channel drained by a fixed number of workers; a full channel
//! makes publishers wait. Without a pool (`workers == 0`) each job runs on
//! its own task.
//!
//! ```text
//!  publish / enqueue ──▶ [ job channel, capacity C ] ──▶ worker 1..N ──▶ handler
//!          │                                                              │
//!          └── pending += 1                      pending -= 1 (drop guard)┘
//! ```
//!
//! Handlers run isolated: an `Err` is logged, a panic is caught and logged
//! with a short stack, and neither reaches the publisher or other jobs.

use crate::config::DispatcherConfig;
use crate::metrics::{
    HANDLER_ERRORS, HANDLER_PANICS, MESSAGES_DROPPED, MESSAGES_ENQUEUED, MESSAGES_PUBLISHED,
};
use crate::panic;
use crate::pending::{PendingGuard, PendingWork};
use futures::FutureExt;
use futures::future::BoxFuture;
use plugboard_core::{
    Component, ComponentError, Context, DispatchError, Handler, HandlerError, Message, MessageBus,
    Payload, async_trait,
};
use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, error, info, warn};

/// Name under which a [`Dispatcher`] registers as a component.
pub const DISPATCHER_COMPONENT: &str = "dispatcher";

/// One scheduled delivery.
struct Job {
    ctx: Context,
    handler: Arc<dyn Handler>,
    message: Message,
    _pending: PendingGuard,
}

/// Competing consumers of one queue topic.
#[derive(Default)]
struct QueueGroup {
    handlers: Vec<Arc<dyn Handler>>,
    next: AtomicUsize,
}

impl QueueGroup {
    /// Next handler in rotation.
    ///
    /// Called with the state lock held, so the length cannot change between
    /// reading it and indexing.
    fn pick(&self) -> Option<Arc<dyn Handler>> {
        if self.handlers.is_empty() {
            return None;
        }
        let turn = self.next.fetch_add(1, Ordering::Relaxed);
        self.handlers.get(turn % self.handlers.len()).cloned()
    }
}

#[derive(Clone, Copy)]
enum Delivery {
    Broadcast,
    Queue,
}

#[derive(Default)]
struct State {
    broadcast: HashMap<String, Vec<Arc<dyn Handler>>>,
    queues: HashMap<String, QueueGroup>,
    /// `None` in unbounded mode and after shutdown.
    sender: Option<mpsc::Sender<Job>>,
    /// Held until the workers start.
    receiver: Option<mpsc::Receiver<Job>>,
    workers_started: bool,
    closed: bool,
}

/// Publish/subscribe and round-robin queues over a bounded worker pool.
///
/// The dispatcher is shared behind an `Arc`: subscribe and publish take
/// `&self` and may be called from any task.
///
/// # Example
///
/// ```ignore
/// let dispatcher = Dispatcher::new(DispatcherConfig::default());
///
/// dispatcher.subscribe("user.created", |_ctx: Context, msg: Message| async move {
///     let user = msg.data::<UserId>();
///     Ok(())
/// });
///
/// dispatcher.publish("user.created", UserId(7)).await;
/// dispatcher.wait(&Context::background().with_timeout(Duration::from_secs(1))).await?;
/// ```
pub struct Dispatcher {
    config: DispatcherConfig,
    base: Context,
    state: Mutex<State>,
    pending: Arc<PendingWork>,
}

impl Dispatcher {
    /// Create a dispatcher. Workers start on the first delivery.
    #[must_use]
    pub fn new(config: DispatcherConfig) -> Self {
        Self::with_context(config, Context::background())
    }

    /// Create a dispatcher whose handlers receive children of `base`.
    #[must_use]
    pub fn with_context(config: DispatcherConfig, base: Context) -> Self {
        panic::install_trace_hook();

        let mut state = State::default();
        if config.workers > 0 {
            let (sender, receiver) = mpsc::channel(config.effective_capacity());
            state.sender = Some(sender);
            state.receiver = Some(receiver);
        }

        Self {
            config,
            base,
            state: Mutex::new(state),
            pending: Arc::new(PendingWork::new()),
        }
    }

    /// The configuration this dispatcher was built with
    #[must_use]
    pub const fn config(&self) -> &DispatcherConfig {
        &self.config
    }

    /// Deliveries scheduled but not yet finished
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.current()
    }

    /// Whether [`shutdown`](Self::shutdown) has been called
    #[must_use]
    pub fn is_shut_down(&self) -> bool {
        self.lock().closed
    }

    /// Number of broadcast handlers on `topic`
    #[must_use]
    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.lock().broadcast.get(topic).map_or(0, Vec::len)
    }

    /// Number of queue handlers on `topic`
    #[must_use]
    pub fn queue_subscriber_count(&self, topic: &str) -> usize {
        self.lock().queues.get(topic).map_or(0, |group| group.handlers.len())
    }

    /// Add a broadcast handler for `topic`.
    pub fn subscribe<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe_handler(topic, Arc::new(handler));
    }

    /// Add a shared broadcast handler for `topic`.
    pub fn subscribe_handler(&self, topic: &str, handler: Arc<dyn Handler>) {
        self.lock()
            .broadcast
            .entry(topic.to_string())
            .or_default()
            .push(handler);
        debug!(topic, "broadcast handler subscribed");
    }

    /// Add a competing-consumer handler for `topic`.
    pub fn subscribe_queue<F, Fut>(&self, topic: &str, handler: F)
    where
        F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        self.subscribe_queue_handler(topic, Arc::new(handler));
    }

    /// Add a shared competing-consumer handler for `topic`.
    pub fn subscribe_queue_handler(&self, topic: &str, handler: Arc<dyn Handler>) {
        self.lock()
            .queues
            .entry(topic.to_string())
            .or_default()
            .handlers
            .push(handler);
        debug!(topic, "queue handler subscribed");
    }

    /// Deliver `data` to every broadcast handler of `topic`.
    ///
    /// Handlers read it back with [`Message::data::<T>`](Message::data).
    /// Waits while the job queue is full.
    pub async fn publish<T: Any + Send + Sync>(&self, topic: &str, data: T) {
        self.publish_payload(topic, Arc::new(data)).await;
    }

    /// [`publish`](Self::publish) with an already shared payload.
    pub async fn publish_payload(&self, topic: &str, data: Payload) {
        self.dispatch(topic, data, Delivery::Broadcast).await;
    }

    /// Deliver `data` to exactly one queue handler of `topic`, chosen
    /// round-robin. A topic without queue handlers drops the message.
    pub async fn enqueue<T: Any + Send + Sync>(&self, topic: &str, data: T) {
        self.enqueue_payload(topic, Arc::new(data)).await;
    }

    /// [`enqueue`](Self::enqueue) with an already shared payload.
    pub async fn enqueue_payload(&self, topic: &str, data: Payload) {
        self.dispatch(topic, data, Delivery::Queue).await;
    }

    /// Wait until every delivery scheduled so far has finished.
    ///
    /// New deliveries may still be scheduled while waiting.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Timeout`] if `ctx` is cancelled or expires first.
    /// Handlers still running keep running.
    pub async fn wait(&self, ctx: &Context) -> Result<(), DispatchError> {
        self.pending.drained(ctx).await
    }

    /// Stop accepting deliveries and wait for the accepted ones.
    ///
    /// Jobs already queued still run; workers exit once the queue is empty.
    /// Later calls only wait.
    ///
    /// # Errors
    ///
    /// [`DispatchError::Timeout`] if `ctx` is done before the work drains.
    pub async fn shutdown(&self, ctx: &Context) -> Result<(), DispatchError> {
        let first = {
            let mut state = self.lock();
            let first = !state.closed;
            state.closed = true;
            // Workers see the channel close once every in-flight publish
            // has dropped its clone of the sender.
            state.sender = None;
            state.receiver = None;
            first
        };

        if first {
            info!(pending = self.pending.current(), "dispatcher shutting down");
        }

        match self.wait(ctx).await {
            Ok(()) => {
                info!("dispatcher drained");
                Ok(())
            },
            Err(err) => {
                warn!(error = %err, "dispatcher shutdown timed out");
                Err(err)
            },
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn dispatch(&self, topic: &str, data: Payload, delivery: Delivery) {
        let (jobs, sender) = {
            let mut state = self.lock();

            if state.closed {
                warn!(topic, "dispatcher is shut down, dropping message");
                metrics::counter!(MESSAGES_DROPPED).increment(1);
                return;
            }

            let handlers: Vec<Arc<dyn Handler>> = match delivery {
                Delivery::Broadcast => state.broadcast.get(topic).cloned().unwrap_or_default(),
                Delivery::Queue => state
                    .queues
                    .get(topic)
                    .and_then(QueueGroup::pick)
                    .into_iter()
                    .collect(),
            };

            if handlers.is_empty() {
                debug!(topic, "no subscribers, message discarded");
                return;
            }

            self.start_workers(&mut state);

            // Pending is raised under the lock so a concurrent shutdown
            // either rejects this delivery or waits for it.
            let jobs: Vec<Job> = handlers
                .into_iter()
                .map(|handler| Job {
                    ctx: self.base.child(),
                    handler,
                    message: Message::new(topic, Arc::clone(&data)),
                    _pending: self.pending.begin(),
                })
                .collect();

            (jobs, state.sender.clone())
        };

        match delivery {
            Delivery::Broadcast => metrics::counter!(MESSAGES_PUBLISHED).increment(1),
            Delivery::Queue => metrics::counter!(MESSAGES_ENQUEUED).increment(1),
        }
        debug!(topic, deliveries = jobs.len(), "message scheduled");

        for job in jobs {
            match &sender {
                Some(sender) => {
                    if let Err(mpsc::error::SendError(job)) = sender.send(job).await {
                        // Receiver gone; dropping the job releases its pending slot.
                        warn!(topic, message_id = job.message.id(), "job queue closed, dropping message");
                        metrics::counter!(MESSAGES_DROPPED).increment(1);
                    }
                },
                None => {
                    tokio::spawn(execute(job));
                },
            }
        }
    }

    fn start_workers(&self, state: &mut State) {
        if state.workers_started {
            return;
        }
        let Some(receiver) = state.receiver.take() else {
            return;
        };
        state.workers_started = true;

        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));
        for id in 0..self.config.workers {
            tokio::spawn(worker(id, Arc::clone(&receiver)));
        }

        info!(
            workers = self.config.workers,
            queue_capacity = self.config.effective_capacity(),
            "dispatcher workers started"
        );
    }
}

async fn worker(id: usize, jobs: Arc<tokio::sync::Mutex<mpsc::Receiver<Job>>>) {
    loop {
        let next = jobs.lock().await.recv().await;
        let Some(job) = next else {
            break;
        };
        execute(job).await;
    }
    debug!(worker = id, "dispatcher worker stopped");
}

/// Run one job, containing errors and panics.
async fn execute(job: Job) {
    let Job {
        ctx,
        handler,
        message,
        _pending,
    } = job;

    let topic = message.topic().to_string();
    let message_id = message.id().to_string();
    let span = tracing::info_span!("dispatch", topic = %topic, message_id = %message_id);

    async move {
        let outcome = AssertUnwindSafe(async move { handler.handle(ctx, message).await })
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {},
            Ok(Err(err)) => {
                metrics::counter!(HANDLER_ERRORS).increment(1);
                error!(error = %err, "handler error");
            },
            Err(payload) => {
                metrics::counter!(HANDLER_PANICS).increment(1);
                let stack = panic::take_trace();
                error!(
                    panic = %panic::panic_message(payload.as_ref()),
                    stack = %stack,
                    "handler panicked"
                );
            },
        }
    }
    .instrument(span)
    .await;
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::new(DispatcherConfig::default())
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("config", &self.config)
            .field("pending", &self.pending.current())
            .field("shut_down", &self.is_shut_down())
            .finish_non_exhaustive()
    }
}

impl MessageBus for Dispatcher {
    fn subscribe(&self, topic: &str, handler: Arc<dyn Handler>) {
        self.subscribe_handler(topic, handler);
    }

    fn publish<'a>(&'a self, topic: &'a str, data: Payload) -> BoxFuture<'a, ()> {
        self.publish_payload(topic, data).boxed()
    }

    fn subscribe_queue(&self, topic: &str, handler: Arc<dyn Handler>) {
        self.subscribe_queue_handler(topic, handler);
    }

    fn enqueue<'a>(&'a self, topic: &'a str, data: Payload) -> BoxFuture<'a, ()> {
        self.enqueue_payload(topic, data).boxed()
    }

    fn wait<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DispatchError>> {
        Dispatcher::wait(self, ctx).boxed()
    }

    fn shutdown<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DispatchError>> {
        Dispatcher::shutdown(self, ctx).boxed()
    }
}

#[async_trait]
impl Component for Dispatcher {
    fn name(&self) -> &str {
        DISPATCHER_COMPONENT
    }

    async fn shutdown(&self, ctx: &Context) -> Result<(), ComponentError> {
        Dispatcher::shutdown(self, ctx).await.map_err(ComponentError::other)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)] // Test code can use unwrap/panic
mod tests {
    use super::*;
    use plugboard_testing::CountingHandler;
    use std::time::Duration;

    fn deadline(ms: u64) -> Context {
        Context::background().with_timeout(Duration::from_millis(ms))
    }

    #[test]
    fn test_round_robin_pick_cycles() {
        let a = CountingHandler::new();
        let b = CountingHandler::new();
        let group = QueueGroup {
            handlers: vec![a.clone() as Arc<dyn Handler>, b.clone()],
            next: AtomicUsize::new(0),
        };

        let picks: Vec<bool> = (0..4)
            .map(|_| {
                let handler = group.pick().unwrap();
                Arc::as_ptr(&handler).cast::<()>() == Arc::as_ptr(&a).cast::<()>()
            })
            .collect();

        assert_eq!(picks, vec![true, false, true, false]);
        assert!(QueueGroup::default().pick().is_none());
    }

    #[tokio::test]
    async fn test_workers_start_lazily() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(2));
        assert!(!dispatcher.lock().workers_started);

        dispatcher.publish("nobody.listens", 1_u8).await;
        assert!(!dispatcher.lock().workers_started);

        let counter = CountingHandler::new();
        dispatcher.subscribe_handler("t", counter.clone());
        dispatcher.publish("t", 1_u8).await;
        assert!(dispatcher.lock().workers_started);

        dispatcher.wait(&deadline(1_000)).await.unwrap();
        assert_eq!(counter.count(), 1);
    }

    #[tokio::test]
    async fn test_publish_after_shutdown_is_dropped() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(1));
        let counter = CountingHandler::new();
        dispatcher.subscribe_handler("t", counter.clone());

        Dispatcher::shutdown(&dispatcher, &deadline(1_000)).await.unwrap();
        dispatcher.publish("t", ()).await;
        dispatcher.enqueue("t", ()).await;

        assert!(dispatcher.is_shut_down());
        assert_eq!(dispatcher.pending(), 0);
        assert_eq!(counter.count(), 0);
    }

    #[tokio::test]
    async fn test_shutdown_is_idempotent() {
        let dispatcher = Dispatcher::new(DispatcherConfig::default());
        let ctx = deadline(1_000);

        Dispatcher::shutdown(&dispatcher, &ctx).await.unwrap();
        Dispatcher::shutdown(&dispatcher, &ctx).await.unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_counts_are_independent() {
        let dispatcher = Dispatcher::default();
        dispatcher.subscribe_handler("jobs", CountingHandler::new());
        dispatcher.subscribe_queue_handler("jobs", CountingHandler::new());
        dispatcher.subscribe_queue_handler("jobs", CountingHandler::new());

        assert_eq!(dispatcher.subscriber_count("jobs"), 1);
        assert_eq!(dispatcher.queue_subscriber_count("jobs"), 2);
        assert_eq!(dispatcher.subscriber_count("other"), 0);
    }

    #[tokio::test]
    async fn test_as_component_and_bus() {
        let dispatcher = Arc::new(Dispatcher::default());
        let component: Arc<dyn Component> = dispatcher.clone();
        let bus: Arc<dyn MessageBus> = dispatcher.clone();

        let counter = CountingHandler::new();
        bus.subscribe_queue("q", counter.clone());
        bus.enqueue("q", Arc::new(5_u32)).await;
        bus.wait(&deadline(1_000)).await.unwrap();
        assert_eq!(counter.count(), 1);

        assert_eq!(component.name(), DISPATCHER_COMPONENT);
        component.shutdown(&deadline(1_000)).await.unwrap();
        assert!(dispatcher.is_shut_down());
    }
}
