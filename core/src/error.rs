//! Error types shared across the component and dispatch interfaces.

use thiserror::Error;

/// Error returned by a component's `init` or `shutdown` hook.
#[derive(Error, Debug)]
pub enum ComponentError {
    /// A plain description of what went wrong
    #[error("{0}")]
    Message(String),

    /// An underlying error from the component's own dependencies
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl ComponentError {
    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap any error type.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }
}

/// Error returned by a message handler.
///
/// Handler errors never reach the publisher: the dispatcher logs and drops
/// them.
#[derive(Error, Debug)]
pub enum HandlerError {
    /// A plain description of what went wrong
    #[error("{0}")]
    Message(String),

    /// An underlying error raised while handling the message
    #[error("{0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl HandlerError {
    /// Build an error from a message.
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    /// Wrap any error type.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Box::new(error))
    }
}

/// Errors surfaced by the publisher-facing drain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// The context finished before all pending work completed
    ///
    /// In-flight handlers keep running; they are simply no longer awaited.
    #[error("timeout waiting for handlers to finish ({pending} still pending)")]
    Timeout {
        /// Units of work outstanding when the wait gave up
        pending: usize,
    },
}

/// Reason a [`Context`](crate::context::Context) is done.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
    /// The context or one of its ancestors was cancelled
    #[error("context cancelled")]
    Cancelled,

    /// The context's deadline passed
    #[error("context deadline exceeded")]
    DeadlineExceeded,
}
