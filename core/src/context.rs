//! Cancellation and deadline propagation.
//!
//! A [`Context`] travels with every lifecycle hook and every handler
//! invocation. It answers one question: should the caller stop waiting?
//!
//! Contexts form a tree. Deriving a child ([`Context::child`],
//! [`Context::with_timeout`], [`Context::with_deadline`]) links it to its
//! parent's cancellation token, so cancelling a parent cancels every
//! descendant. A child's deadline is never later than its parent's.
//!
//! # Example
//!
//! ```
//! use plugboard_core::context::Context;
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let root = Context::background();
//! let ctx = root.with_timeout(Duration::from_millis(5));
//!
//! ctx.done().await;
//! assert!(ctx.is_done());
//! assert!(!root.is_done());
//! # }
//! ```

use crate::error::ContextError;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation token plus optional deadline.
///
/// Cloning a context is cheap and yields a handle to the same token:
/// cancelling the clone cancels the original.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// A root context that is never cancelled unless [`Context::cancel`] is
    /// called on it and that has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Derive a child that shares this context's deadline.
    ///
    /// Cancelling the child does not affect the parent.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Derive a child that expires `timeout` from now, or at the parent's
    /// deadline if that comes first.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Derive a child that expires at `deadline`, or at the parent's deadline
    /// if that comes first.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(parent) if parent < deadline => parent,
            _ => deadline,
        };

        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Cancel this context and all of its descendants.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The point in time after which this context is done, if any.
    #[must_use]
    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// True once cancelled or past the deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.err().is_some()
    }

    /// Why this context is done, or `None` while it is still live.
    ///
    /// Cancellation takes precedence over an elapsed deadline.
    #[must_use]
    pub fn err(&self) -> Option<ContextError> {
        if self.token.is_cancelled() {
            return Some(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
            _ => None,
        }
    }

    /// Resolves when this context is cancelled or its deadline passes.
    ///
    /// Never resolves for a background context that is not cancelled.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    () = self.token.cancelled() => {}
                    () = tokio::time::sleep_until(deadline) => {}
                }
            },
            None => self.token.cancelled().await,
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}
