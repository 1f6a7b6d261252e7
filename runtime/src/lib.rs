//! # Plugboard Runtime
//!
//! Runtime implementation for plugboard.
//!
//! This crate provides the two pieces every plugboard server is composed
//! around:
//!
//! - **Registry**: Orders components by their declared dependencies, runs
//!   their init hooks in that order and their shutdown hooks in reverse
//! - **Dispatcher**: In-memory message bus with broadcast topics,
//!   round-robin work queues and a bounded worker pool
//!
//! ## Example
//!
//! ```ignore
//! use plugboard_core::Context;
//! use plugboard_runtime::{Dispatcher, DispatcherConfig, Registry};
//! use std::sync::Arc;
//!
//! let dispatcher = Arc::new(Dispatcher::new(DispatcherConfig::default()));
//!
//! let mut registry = Registry::new();
//! registry.register(Arc::clone(&dispatcher))?;
//! registry.register(Arc::new(Mailer::default()))?; // deps: ["dispatcher"]
//!
//! let ctx = Context::background();
//! registry.init(&ctx).await?;
//!
//! dispatcher.publish("user.created", user_id).await;
//!
//! registry.shutdown(&ctx.with_timeout(Duration::from_secs(5))).await?;
//! ```

/// Dispatcher configuration
pub mod config;

/// In-memory message bus with a bounded worker pool
pub mod dispatcher;

/// Registry error types
pub mod error;

/// Dependency graph resolution
pub mod graph;

/// Metric names recorded by the runtime
pub mod metrics;

/// Component registry and lifecycle
pub mod registry;

mod panic;
mod pending;

pub use config::{ConfigError, DispatcherConfig};
pub use dispatcher::{DISPATCHER_COMPONENT, Dispatcher};
pub use error::{RegistryError, ShutdownFailure};
pub use registry::Registry;
