//! Lifecycle-recording component.

use async_trait::async_trait;
use plugboard_core::{Component, ComponentError, Context, Lookup, ServerOption};
use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Shared, ordered log of lifecycle calls.
///
/// Entries look like `init:db` and `shutdown:db`.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    /// Create an empty journal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry
    pub fn push(&self, entry: impl Into<String>) {
        self.lock().push(entry.into());
    }

    /// Every entry, oldest first
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        self.lock().clone()
    }

    /// Components whose init hook was called, in call order
    #[must_use]
    pub fn inits(&self) -> Vec<String> {
        self.with_prefix("init:")
    }

    /// Components whose shutdown hook was called, in call order
    #[must_use]
    pub fn shutdowns(&self) -> Vec<String> {
        self.with_prefix("shutdown:")
    }

    fn with_prefix(&self, prefix: &str) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|entry| entry.strip_prefix(prefix))
            .map(str::to_string)
            .collect()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<String>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A component that records its hooks into a [`Journal`].
///
/// # Example
///
/// ```
/// use plugboard_testing::{Journal, RecordingComponent};
///
/// let journal = Journal::new();
/// let api = RecordingComponent::new("api", &journal)
///     .with_deps(&["db"])
///     .failing_shutdown();
/// ```
#[derive(Debug, Clone)]
pub struct RecordingComponent {
    name: String,
    deps: Vec<String>,
    opt_deps: Vec<String>,
    journal: Journal,
    fail_init: bool,
    fail_shutdown: bool,
    options: Vec<ServerOption>,
}

impl RecordingComponent {
    /// A component named `name` with no dependencies
    #[must_use]
    pub fn new(name: impl Into<String>, journal: &Journal) -> Self {
        Self {
            name: name.into(),
            deps: Vec::new(),
            opt_deps: Vec::new(),
            journal: journal.clone(),
            fail_init: false,
            fail_shutdown: false,
            options: Vec::new(),
        }
    }

    /// Declare required dependencies
    #[must_use]
    pub fn with_deps(mut self, deps: &[&str]) -> Self {
        self.deps = deps.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Declare optional dependencies
    #[must_use]
    pub fn with_opt_deps(mut self, deps: &[&str]) -> Self {
        self.opt_deps = deps.iter().map(|d| (*d).to_string()).collect();
        self
    }

    /// Make the init hook fail after recording the call
    #[must_use]
    pub const fn failing_init(mut self) -> Self {
        self.fail_init = true;
        self
    }

    /// Make the shutdown hook fail after recording the call
    #[must_use]
    pub const fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    /// Contribute a server option
    #[must_use]
    pub fn with_server_option<T: Any + Send + Sync>(mut self, option: T) -> Self {
        self.options.push(ServerOption::new(option));
        self
    }
}

#[async_trait]
impl Component for RecordingComponent {
    fn name(&self) -> &str {
        &self.name
    }

    fn deps(&self) -> Vec<String> {
        self.deps.clone()
    }

    fn opt_deps(&self) -> Vec<String> {
        self.opt_deps.clone()
    }

    async fn init(&self, _ctx: &Context, _lookup: &dyn Lookup) -> Result<(), ComponentError> {
        self.journal.push(format!("init:{}", self.name));
        if self.fail_init {
            return Err(ComponentError::msg(format!("{} refused to start", self.name)));
        }
        Ok(())
    }

    async fn shutdown(&self, _ctx: &Context) -> Result<(), ComponentError> {
        self.journal.push(format!("shutdown:{}", self.name));
        if self.fail_shutdown {
            return Err(ComponentError::msg(format!("{} refused to stop", self.name)));
        }
        Ok(())
    }

    fn server_options(&self) -> Vec<ServerOption> {
        self.options.clone()
    }
}
