//! # Plugboard Testing
//!
//! Testing utilities for plugboard registries and dispatchers.
//!
//! This crate provides:
//! - [`RecordingComponent`]: a component that writes its lifecycle calls to
//!   a shared [`Journal`] and can be told to fail
//! - [`CountingHandler`]: a handler that counts deliveries and lets a test
//!   wait for a given number of them
//! - [`capture_logs`]: buffers formatted `tracing` output for assertions
//!
//! ## Example
//!
//! ```ignore
//! use plugboard_testing::{Journal, RecordingComponent};
//!
//! #[tokio::test]
//! async fn test_order() {
//!     let journal = Journal::new();
//!     let mut registry = Registry::new();
//!     registry.register(Arc::new(RecordingComponent::new("api", &journal).with_deps(&["db"])))?;
//!     registry.register(Arc::new(RecordingComponent::new("db", &journal)))?;
//!
//!     registry.init(&Context::background()).await?;
//!     assert_eq!(journal.inits(), vec!["db", "api"]);
//! }
//! ```

mod components;
mod handlers;
mod logs;

pub use components::{Journal, RecordingComponent};
pub use handlers::CountingHandler;
pub use logs::{CaptureWriter, CapturedLogs, capture_logs, init_test_tracing};
