//! Metrics recorded by the runtime.
//!
//! The runtime only talks to the `metrics` facade. Nothing is exported
//! until the application installs a recorder (for example a Prometheus
//! exporter); without one every call below is a no-op.
//!
//! # Example
//!
//! ```ignore
//! // After installing a recorder:
//! plugboard_runtime::metrics::describe_metrics();
//! ```

use metrics::{Unit, describe_counter, describe_gauge};

// Re-export metrics macros for use in other modules
pub use metrics::{counter, gauge};

/// Broadcast publishes that reached at least one subscriber.
pub const MESSAGES_PUBLISHED: &str = "dispatcher.messages.published";

/// Enqueued messages that were handed to a queue subscriber.
pub const MESSAGES_ENQUEUED: &str = "dispatcher.messages.enqueued";

/// Deliveries discarded because the dispatcher was shut down.
pub const MESSAGES_DROPPED: &str = "dispatcher.messages.dropped";

/// Handlers that returned an error.
pub const HANDLER_ERRORS: &str = "dispatcher.handler.errors";

/// Handlers that panicked.
pub const HANDLER_PANICS: &str = "dispatcher.handler.panics";

/// Units of work scheduled but not yet finished.
pub const PENDING: &str = "dispatcher.pending";

/// Successful `Registry::init` runs.
pub const REGISTRY_INIT_COMPLETED: &str = "registry.init.completed";

/// Component shutdown hooks that failed.
pub const REGISTRY_SHUTDOWN_FAILED: &str = "registry.shutdown.failed";

/// Register descriptions for every runtime metric with the installed
/// recorder.
pub fn describe_metrics() {
    describe_counter!(
        MESSAGES_PUBLISHED,
        Unit::Count,
        "Broadcast publishes delivered to at least one subscriber"
    );
    describe_counter!(
        MESSAGES_ENQUEUED,
        Unit::Count,
        "Queue messages handed to a subscriber"
    );
    describe_counter!(
        MESSAGES_DROPPED,
        Unit::Count,
        "Deliveries discarded after dispatcher shutdown"
    );
    describe_counter!(HANDLER_ERRORS, Unit::Count, "Handlers that returned an error");
    describe_counter!(HANDLER_PANICS, Unit::Count, "Handlers that panicked");
    describe_gauge!(PENDING, Unit::Count, "Scheduled units of work not yet finished");
    describe_counter!(
        REGISTRY_INIT_COMPLETED,
        Unit::Count,
        "Successful registry initializations"
    );
    describe_counter!(
        REGISTRY_SHUTDOWN_FAILED,
        Unit::Count,
        "Component shutdown hooks that failed"
    );
}
