//! # Plugboard Core
//!
//! Core traits and types shared by the plugboard runtime and by every
//! component that plugs into it.
//!
//! ## Core Concepts
//!
//! - **Component**: A named unit with optional dependencies and lifecycle hooks
//! - **Lookup**: Read-only view of the registry handed to components at init time
//! - **Context**: Cancellation and deadline propagation for hooks and handlers
//! - **Message**: A single delivery of a published payload to one handler
//! - **Handler**: Async function invoked for each delivered message
//! - **MessageBus**: Publish/subscribe and competing-consumer queue interface
//!
//! ## Example
//!
//! ```ignore
//! use plugboard_core::component::{Component, Lookup};
//! use plugboard_core::context::Context;
//! use plugboard_core::error::ComponentError;
//!
//! struct Mailer;
//!
//! #[async_trait::async_trait]
//! impl Component for Mailer {
//!     fn name(&self) -> &str {
//!         "mailer"
//!     }
//!
//!     fn deps(&self) -> Vec<String> {
//!         vec!["dispatcher".to_string()]
//!     }
//!
//!     async fn init(&self, _ctx: &Context, lookup: &dyn Lookup) -> Result<(), ComponentError> {
//!         // Dependencies are initialized before this hook runs.
//!         let _bus = lookup.component("dispatcher");
//!         Ok(())
//!     }
//! }
//! ```

pub mod bus;
pub mod component;
pub mod context;
pub mod error;
pub mod handler;
pub mod message;

// Re-export commonly used types
pub use bus::MessageBus;
pub use component::{Component, Lookup, ServerOption};
pub use context::Context;
pub use error::{ComponentError, DispatchError, HandlerError};
pub use handler::{Handler, HandlerFuture};
pub use message::{Message, Payload};

/// Re-exported so implementors can write `#[plugboard_core::async_trait]`.
pub use async_trait::async_trait;
