//! Message handlers.
//!
//! Any `Fn(Context, Message) -> impl Future<Output = Result<(), HandlerError>>`
//! closure is a [`Handler`]. Implement the trait directly when a handler
//! carries its own state.

use crate::context::Context;
use crate::error::HandlerError;
use crate::message::Message;
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by [`Handler::handle`].
pub type HandlerFuture = Pin<Box<dyn Future<Output = Result<(), HandlerError>> + Send>>;

/// Processes delivered messages.
///
/// Handlers may be invoked concurrently with themselves. Returning `Err` or
/// panicking never affects the publisher; the dispatcher logs the failure
/// and moves on.
pub trait Handler: Send + Sync + 'static {
    /// Handle one message.
    fn handle(&self, ctx: Context, message: Message) -> HandlerFuture;
}

impl<F, Fut> Handler for F
where
    F: Fn(Context, Message) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
{
    fn handle(&self, ctx: Context, message: Message) -> HandlerFuture {
        Box::pin(self(ctx, message))
    }
}
