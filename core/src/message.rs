//! Messages delivered to handlers.
//!
//! Every delivery gets its own [`Message`]: publishing one payload to three
//! broadcast subscribers creates three messages with distinct ids that share
//! the same [`Payload`].
//!
//! `ack` and `nack` are part of the contract so that a durable bus can hook
//! redelivery in without changing handler code. The in-memory dispatcher
//! leaves them as no-ops.

use chrono::{DateTime, Utc};
use std::any::Any;
use std::fmt;
use std::sync::Arc;

/// Type-erased, shared message payload.
pub type Payload = Arc<dyn Any + Send + Sync>;

type Callback = Arc<dyn Fn() + Send + Sync>;

/// A single delivery of a payload on a topic.
#[derive(Clone)]
pub struct Message {
    id: String,
    topic: String,
    data: Payload,
    attempt: u32,
    published_at: DateTime<Utc>,
    ack: Option<Callback>,
    nack: Option<Callback>,
}

impl Message {
    /// Create a first-attempt message with a fresh random id and no-op
    /// ack/nack.
    #[must_use]
    pub fn new(topic: impl Into<String>, data: Payload) -> Self {
        Self::with_id(generate_message_id(), topic, data)
    }

    /// Create a first-attempt message with a caller-chosen id.
    #[must_use]
    pub fn with_id(id: impl Into<String>, topic: impl Into<String>, data: Payload) -> Self {
        Self {
            id: id.into(),
            topic: topic.into(),
            data,
            attempt: 1,
            published_at: Utc::now(),
            ack: None,
            nack: None,
        }
    }

    /// Create a message whose acknowledgement is observed by the caller.
    ///
    /// Intended for bus implementations that track delivery. `attempt` is
    /// clamped to at least 1.
    #[must_use]
    pub fn with_callbacks<A, N>(
        id: impl Into<String>,
        topic: impl Into<String>,
        data: Payload,
        attempt: u32,
        ack: A,
        nack: N,
    ) -> Self
    where
        A: Fn() + Send + Sync + 'static,
        N: Fn() + Send + Sync + 'static,
    {
        Self {
            attempt: attempt.max(1),
            ack: Some(Arc::new(ack)),
            nack: Some(Arc::new(nack)),
            ..Self::with_id(id, topic, data)
        }
    }

    /// Unique id of this delivery.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Topic the message was published or enqueued on.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Delivery attempt, starting at 1.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// When the message was created.
    #[must_use]
    pub const fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }

    /// The raw shared payload.
    #[must_use]
    pub const fn payload(&self) -> &Payload {
        &self.data
    }

    /// The payload as `T`, or `None` if it holds a different type.
    ///
    /// ```
    /// use plugboard_core::message::Message;
    /// use std::sync::Arc;
    ///
    /// let msg = Message::new("greetings", Arc::new("hello"));
    /// assert_eq!(msg.data::<&str>(), Some(&"hello"));
    /// assert!(msg.data::<String>().is_none());
    /// ```
    #[must_use]
    pub fn data<T: Any>(&self) -> Option<&T> {
        self.data.downcast_ref::<T>()
    }

    /// Acknowledge successful processing.
    pub fn ack(&self) {
        if let Some(ack) = &self.ack {
            ack();
        }
    }

    /// Report failed processing so a durable bus may redeliver.
    pub fn nack(&self) {
        if let Some(nack) = &self.nack {
            nack();
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("id", &self.id)
            .field("topic", &self.topic)
            .field("attempt", &self.attempt)
            .field("published_at", &self.published_at)
            .finish_non_exhaustive()
    }
}

/// 16 random bytes, lowercase hex encoded.
#[must_use]
pub fn generate_message_id() -> String {
    hex::encode(rand::random::<[u8; 16]>())
}
