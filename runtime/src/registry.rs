//! Component registry and lifecycle driver.
//!
//! ```text
//!   register(A) register(B) ...        init(ctx)                shutdown(ctx)
//!        │                                │                          │
//!        ▼                                ▼                          ▼
//!   ┌──────────┐   resolve order   ┌──────────────┐   reverse   ┌──────────┐
//!   │components│ ────────────────▶ │ D, C, B, A   │ ──────────▶ │A, B, C, D│
//!   └──────────┘   (no hooks yet)  │ init hooks   │             │ shutdown │
//!                                  └──────────────┘             └──────────┘
//! ```

use crate::error::{RegistryError, ShutdownFailure};
use crate::graph::{self, Edges};
use plugboard_core::{Component, Context, Lookup, ServerOption};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, error, info};

struct Entry {
    component: Arc<dyn Component>,
    any: Arc<dyn Any + Send + Sync>,
}

/// Owns the registered components and drives their lifecycle.
///
/// Components are looked up by name; dependents receive the registry as a
/// [`Lookup`] during their own init and typically keep the `Arc<T>` they
/// fetch from it.
///
/// # Example
///
/// ```ignore
/// let mut registry = Registry::new();
/// registry.register(Arc::new(Database::new(url)))?;
/// registry.register(Arc::new(UserService::new()))?; // deps: ["database"]
///
/// registry.init(&ctx).await?;
/// let users = registry.get_as::<UserService>("users");
/// ```
#[derive(Default)]
pub struct Registry {
    components: HashMap<String, Entry>,
    order: Vec<String>,
    initialized: Vec<String>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a component under its name.
    ///
    /// Dependencies are not checked here; they are resolved by
    /// [`init`](Self::init).
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateComponent`] if the name is taken.
    pub fn register<C: Component>(&mut self, component: Arc<C>) -> Result<(), RegistryError> {
        let name = component.name().to_string();
        if self.components.contains_key(&name) {
            return Err(RegistryError::DuplicateComponent(name));
        }

        debug!(component = %name, "component registered");
        let any: Arc<dyn Any + Send + Sync> = Arc::clone(&component) as _;
        self.components.insert(name.clone(), Entry { component, any });
        self.order.push(name);
        Ok(())
    }

    /// Number of registered components
    #[must_use]
    pub fn len(&self) -> usize {
        self.components.len()
    }

    /// Whether nothing is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
    }

    /// Registered names in registration order
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Whether `name` is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.components.contains_key(name)
    }

    /// The component registered under `name`
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.components.get(name).map(|entry| Arc::clone(&entry.component))
    }

    /// The component registered under `name` as its concrete type.
    ///
    /// `None` for unknown names and for components of another type.
    #[must_use]
    pub fn get_as<T: Component>(&self, name: &str) -> Option<Arc<T>> {
        let any = Arc::clone(&self.components.get(name)?.any);
        any.downcast::<T>().ok()
    }

    /// Components whose init hook has succeeded, in the order it ran.
    #[must_use]
    pub fn init_order(&self) -> &[String] {
        &self.initialized
    }

    /// Compute the initialization order without running any hook.
    ///
    /// # Errors
    ///
    /// [`RegistryError::DependencyCycle`] or
    /// [`RegistryError::MissingDependency`] when the graph is invalid.
    pub fn resolve_order(&self) -> Result<Vec<String>, RegistryError> {
        graph::resolve(&self.order, |name| {
            self.components.get(name).map(|entry| Edges {
                required: entry.component.deps(),
                optional: entry.component.opt_deps(),
            })
        })
    }

    /// Options contributed by every component, in registration order.
    #[must_use]
    pub fn server_options(&self) -> Vec<ServerOption> {
        self.order
            .iter()
            .filter_map(|name| self.components.get(name))
            .flat_map(|entry| entry.component.server_options())
            .collect()
    }

    /// Initialize every component in dependency order.
    ///
    /// The whole graph is resolved first, so an invalid graph never runs a
    /// hook. Hooks then run one at a time. On the first failure the
    /// remaining components are left untouched and the ones already
    /// initialized stay initialized; [`shutdown`](Self::shutdown) releases
    /// them.
    ///
    /// Calling `init` again runs every hook again.
    ///
    /// # Errors
    ///
    /// - [`RegistryError::DependencyCycle`] / [`RegistryError::MissingDependency`]
    ///   for an invalid graph
    /// - [`RegistryError::InitFailed`] naming the first hook that failed
    #[tracing::instrument(skip_all, name = "registry_init", fields(components = self.components.len()))]
    pub async fn init(&mut self, ctx: &Context) -> Result<(), RegistryError> {
        let order = self.resolve_order()?;
        debug!(order = ?order, "initialization order resolved");

        self.initialized.clear();

        for name in order {
            let Some(component) = self.get(&name) else {
                continue;
            };

            if let Err(source) = component.init(ctx, &*self).await {
                error!(component = %name, error = %source, "component init failed");
                return Err(RegistryError::InitFailed {
                    component: name,
                    source,
                });
            }

            info!(component = %name, "component initialized");
            self.initialized.push(name);
        }

        metrics::counter!(crate::metrics::REGISTRY_INIT_COMPLETED).increment(1);
        Ok(())
    }

    /// Shut down every initialized component in reverse init order.
    ///
    /// Every component is given its chance even when an earlier one fails.
    /// Before `init` this does nothing.
    ///
    /// # Errors
    ///
    /// [`RegistryError::ShutdownFailed`] listing every hook that failed.
    #[tracing::instrument(skip_all, name = "registry_shutdown", fields(components = self.initialized.len()))]
    pub async fn shutdown(&mut self, ctx: &Context) -> Result<(), RegistryError> {
        let initialized = std::mem::take(&mut self.initialized);
        let mut failures = Vec::new();

        for name in initialized.into_iter().rev() {
            let Some(component) = self.get(&name) else {
                continue;
            };

            match component.shutdown(ctx).await {
                Ok(()) => info!(component = %name, "component shut down"),
                Err(err) => {
                    error!(component = %name, error = %err, "component shutdown failed");
                    metrics::counter!(crate::metrics::REGISTRY_SHUTDOWN_FAILED).increment(1);
                    failures.push(ShutdownFailure {
                        component: name,
                        error: err,
                    });
                },
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(RegistryError::ShutdownFailed(failures))
        }
    }
}

impl Lookup for Registry {
    fn component(&self, name: &str) -> Option<Arc<dyn Component>> {
        self.get(name)
    }

    fn component_any(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>> {
        self.components.get(name).map(|entry| Arc::clone(&entry.any))
    }
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("components", &self.order)
            .field("initialized", &self.initialized)
            .finish()
    }
}
