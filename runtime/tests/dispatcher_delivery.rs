//! Integration tests for dispatcher delivery semantics
//!
//! Broadcast fan-out in both pool modes, round-robin fairness, message
//! metadata, handler isolation and backpressure.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)] // Test code can use unwrap/expect/panic

use plugboard_core::{Context, HandlerError, Message};
use plugboard_runtime::{Dispatcher, DispatcherConfig};
use plugboard_testing::{CountingHandler, capture_logs};
use proptest::prelude::*;
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

// ============================================================================
// Test Fixtures
// ============================================================================

fn within(duration: Duration) -> Context {
    Context::background().with_timeout(duration)
}

fn second() -> Context {
    within(Duration::from_secs(5))
}

#[derive(Debug, PartialEq)]
struct OrderPlaced {
    id: u64,
}

// ============================================================================
// Broadcast
// ============================================================================

async fn fan_out(workers: usize) {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(workers));
    let handlers: Vec<Arc<CountingHandler>> = (0..5).map(|_| CountingHandler::new()).collect();
    for handler in &handlers {
        dispatcher.subscribe_handler("orders", handler.clone());
    }

    dispatcher.publish("orders", OrderPlaced { id: 1 }).await;
    dispatcher.wait(&second()).await.unwrap();

    let total: usize = handlers.iter().map(|h| h.count()).sum();
    assert_eq!(total, 5, "workers = {workers}");
    assert!(handlers.iter().all(|h| h.count() == 1));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_reaches_every_subscriber_unbounded() {
    fan_out(0).await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_broadcast_reaches_every_subscriber_pooled() {
    fan_out(3).await;
}

#[tokio::test]
async fn test_each_delivery_gets_its_own_message() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(2));
    let first = CountingHandler::new();
    let second_handler = CountingHandler::new();
    dispatcher.subscribe_handler("orders", first.clone());
    dispatcher.subscribe_handler("orders", second_handler.clone());

    dispatcher.publish("orders", OrderPlaced { id: 42 }).await;
    dispatcher.wait(&second()).await.unwrap();

    let a = first.messages().remove(0);
    let b = second_handler.messages().remove(0);

    assert_ne!(a.id(), b.id());
    for message in [&a, &b] {
        assert_eq!(message.id().len(), 32);
        assert!(message.id().chars().all(|c| matches!(c, '0'..='9' | 'a'..='f')));
        assert_eq!(message.topic(), "orders");
        assert_eq!(message.attempt(), 1);
        assert_eq!(message.data::<OrderPlaced>(), Some(&OrderPlaced { id: 42 }));
        message.ack();
        message.nack();
    }
}

#[tokio::test]
async fn test_publish_without_subscribers_is_noop() {
    let dispatcher = Dispatcher::default();
    dispatcher.publish("nobody", 1_u8).await;
    dispatcher.enqueue("nobody", 1_u8).await;

    assert_eq!(dispatcher.pending(), 0);
    dispatcher.wait(&within(Duration::from_millis(10))).await.unwrap();
}

#[tokio::test]
async fn test_broadcast_and_queue_subscribers_are_independent() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(2));
    let broadcast = CountingHandler::new();
    let queue = CountingHandler::new();
    dispatcher.subscribe_handler("jobs", broadcast.clone());
    dispatcher.subscribe_queue_handler("jobs", queue.clone());

    dispatcher.publish("jobs", ()).await;
    dispatcher.wait(&second()).await.unwrap();
    assert_eq!((broadcast.count(), queue.count()), (1, 0));

    dispatcher.enqueue("jobs", ()).await;
    dispatcher.wait(&second()).await.unwrap();
    assert_eq!((broadcast.count(), queue.count()), (1, 1));
}

// ============================================================================
// Queues
// ============================================================================

#[tokio::test]
async fn test_enqueue_delivers_to_exactly_one() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(4));
    let handlers: Vec<Arc<CountingHandler>> = (0..3).map(|_| CountingHandler::new()).collect();
    for handler in &handlers {
        dispatcher.subscribe_queue_handler("email.send", handler.clone());
    }

    dispatcher.enqueue("email.send", "welcome").await;
    dispatcher.wait(&second()).await.unwrap();

    let counts: Vec<usize> = handlers.iter().map(|h| h.count()).collect();
    assert_eq!(counts, vec![1, 0, 0]);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_round_robin_is_exactly_fair(
        subscribers in 1_usize..6,
        rounds in 1_usize..8,
        workers in 0_usize..4,
    ) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();

        let counts = runtime.block_on(async {
            let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(workers));
            let handlers: Vec<Arc<CountingHandler>> =
                (0..subscribers).map(|_| CountingHandler::new()).collect();
            for handler in &handlers {
                dispatcher.subscribe_queue_handler("work", handler.clone());
            }

            for i in 0..subscribers * rounds {
                dispatcher.enqueue("work", i).await;
            }
            dispatcher.wait(&second()).await.unwrap();

            handlers.iter().map(|h| h.count()).collect::<Vec<_>>()
        });

        prop_assert!(counts.iter().all(|&c| c == rounds), "counts = {:?}", counts);
    }
}

// ============================================================================
// Isolation
// ============================================================================

#[tokio::test(flavor = "current_thread")]
async fn test_handler_errors_are_logged_and_contained() {
    let (logs, _guard) = capture_logs();
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(1));
    let after = CountingHandler::new();

    dispatcher.subscribe("orders", |_ctx: Context, _msg: Message| async {
        Err(HandlerError::msg("inventory unavailable"))
    });
    dispatcher.subscribe_handler("orders", after.clone());

    dispatcher.publish("orders", OrderPlaced { id: 9 }).await;
    dispatcher.wait(&second()).await.unwrap();

    assert_eq!(after.count(), 1);
    assert!(logs.contains("handler error"));
    assert!(logs.contains("inventory unavailable"));
    assert!(logs.contains("topic=orders"));
}

#[tokio::test(flavor = "current_thread")]
async fn test_panicking_handler_is_isolated() {
    let (logs, _guard) = capture_logs();
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(2));
    let survivor = CountingHandler::new();

    dispatcher.subscribe("orders", |_ctx: Context, msg: Message| async move {
        if let Some(order) = msg.data::<OrderPlaced>() {
            reject_corrupt_order(order.id);
        }
        Ok(())
    });
    dispatcher.subscribe_handler("orders", survivor.clone());

    for id in 0..3 {
        dispatcher.publish("orders", OrderPlaced { id }).await;
    }
    dispatcher.wait(&second()).await.unwrap();

    assert_eq!(survivor.count(), 3);
    assert_eq!(dispatcher.pending(), 0);
    assert!(logs.contains("handler panicked"));
    assert!(logs.contains("corrupt order 2"));
    assert!(logs.contains("stack="));
    assert!(
        logs.contains("reject_corrupt_order"),
        "stack must start at the panicking function: {}",
        logs.contents()
    );
}

#[inline(never)]
fn reject_corrupt_order(id: u64) -> ! {
    panic!("corrupt order {id}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panic_in_unbounded_mode_is_isolated() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(0));
    let survivor = CountingHandler::new();

    dispatcher.subscribe("t", |_ctx: Context, msg: Message| async move {
        if msg.topic() == "t" {
            panic!("boom");
        }
        Ok(())
    });
    dispatcher.subscribe_handler("t", survivor.clone());

    dispatcher.publish("t", ()).await;
    dispatcher.wait(&second()).await.unwrap();

    assert_eq!(survivor.count(), 1);
}

// ============================================================================
// Pool bounds
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_pool_bounds_concurrency() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(2));
    let handler = CountingHandler::with_delay(Duration::from_millis(20));
    dispatcher.subscribe_queue_handler("slow", handler.clone());

    for i in 0..8 {
        dispatcher.enqueue("slow", i).await;
    }
    dispatcher.wait(&second()).await.unwrap();

    assert_eq!(handler.count(), 8);
    assert!(handler.max_in_flight() <= 2, "max_in_flight = {}", handler.max_in_flight());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_applies_backpressure() {
    let dispatcher = Arc::new(Dispatcher::new(
        DispatcherConfig::default().with_workers(1).with_queue_capacity(1),
    ));
    let release = Arc::new(tokio::sync::Notify::new());
    let started = Arc::new(AtomicUsize::new(0));

    {
        let release = Arc::clone(&release);
        let started = Arc::clone(&started);
        dispatcher.subscribe_queue("blocked", move |_ctx: Context, _msg: Message| {
            let release = Arc::clone(&release);
            let started = Arc::clone(&started);
            async move {
                started.fetch_add(1, Ordering::SeqCst);
                release.notified().await;
                Ok(())
            }
        });
    }

    // One job occupies the worker, one fills the queue.
    dispatcher.enqueue("blocked", 1).await;
    wait_until(|| started.load(Ordering::SeqCst) == 1).await;
    dispatcher.enqueue("blocked", 2).await;

    let third_sent = Arc::new(AtomicBool::new(false));
    let publisher = {
        let dispatcher = Arc::clone(&dispatcher);
        let third_sent = Arc::clone(&third_sent);
        tokio::spawn(async move {
            dispatcher.enqueue("blocked", 3).await;
            third_sent.store(true, Ordering::SeqCst);
        })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!third_sent.load(Ordering::SeqCst), "publisher must wait for queue space");

    for expected in 1..=3 {
        wait_until(|| started.load(Ordering::SeqCst) >= expected).await;
        release.notify_one();
    }
    publisher.await.unwrap();
    dispatcher.wait(&second()).await.unwrap();

    assert!(third_sent.load(Ordering::SeqCst));
    assert_eq!(started.load(Ordering::SeqCst), 3);
}

async fn wait_until(condition: impl Fn() -> bool) {
    let polled = async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    };
    tokio::time::timeout(Duration::from_secs(5), polled)
        .await
        .expect("condition not reached in time");
}

#[tokio::test]
async fn test_message_ids_are_unique_across_publishes() {
    let dispatcher = Dispatcher::new(DispatcherConfig::default().with_workers(4));
    let handler = CountingHandler::new();
    dispatcher.subscribe_handler("ids", handler.clone());

    for i in 0..50 {
        dispatcher.publish("ids", i).await;
    }
    dispatcher.wait(&second()).await.unwrap();

    let ids: HashSet<String> = handler.messages().iter().map(|m| m.id().to_string()).collect();
    assert_eq!(ids.len(), 50);
}
