//! Message bus abstraction.
//!
//! The [`MessageBus`] trait offers two delivery modes over string topics:
//!
//! - **Broadcast** (`subscribe` / `publish`): every subscriber of the topic
//!   receives every message.
//! - **Queue** (`subscribe_queue` / `enqueue`): each message goes to exactly
//!   one subscriber of the topic, rotating round-robin.
//!
//! Broadcast and queue subscribers of the same topic name are independent.
//!
//! ```text
//!   publish("user.created")            enqueue("email.send")
//!          │                                   │
//!    ┌─────┼─────┐                       round-robin
//!    ▼     ▼     ▼                        ┌────┴────┐
//!   h1    h2    h3                        ▼  (one)  ▼
//!                                        q1   ...   q2
//! ```
//!
//! # Delivery Contract
//!
//! - At-most-once, best effort, no redelivery
//! - Handler errors and panics are contained by the bus
//! - `publish` / `enqueue` may wait for queue space (backpressure)
//! - `wait` and `shutdown` are the only calls that can fail
//!
//! # Dyn Compatibility
//!
//! Methods return boxed futures so that components can hold an
//! `Arc<dyn MessageBus>`.

use crate::context::Context;
use crate::error::DispatchError;
use crate::handler::Handler;
use crate::message::Payload;
use futures::future::BoxFuture;
use std::sync::Arc;

/// Publish/subscribe plus competing-consumer queues.
pub trait MessageBus: Send + Sync {
    /// Add a broadcast handler for `topic`.
    fn subscribe(&self, topic: &str, handler: Arc<dyn Handler>);

    /// Deliver `data` to every broadcast handler of `topic`.
    fn publish<'a>(&'a self, topic: &'a str, data: Payload) -> BoxFuture<'a, ()>;

    /// Add a competing-consumer handler for `topic`.
    fn subscribe_queue(&self, topic: &str, handler: Arc<dyn Handler>);

    /// Deliver `data` to exactly one queue handler of `topic`.
    ///
    /// A topic without queue handlers silently drops the message.
    fn enqueue<'a>(&'a self, topic: &'a str, data: Payload) -> BoxFuture<'a, ()>;

    /// Wait until all work scheduled so far has finished.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`] if `ctx` is done first.
    fn wait<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DispatchError>>;

    /// Stop accepting work, then wait for what was already accepted.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::Timeout`] if `ctx` is done first.
    fn shutdown<'a>(&'a self, ctx: &'a Context) -> BoxFuture<'a, Result<(), DispatchError>>;
}
