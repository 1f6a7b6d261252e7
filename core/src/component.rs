//! The component capability set.
//!
//! A component is anything the registry can order and drive through a
//! lifecycle. Only [`Component::name`] is mandatory; every other capability
//! has a default body meaning "not implemented":
//!
//! | Capability        | Default          | Purpose                                        |
//! |-------------------|------------------|------------------------------------------------|
//! | `deps`            | none             | Must be registered and initialized first       |
//! | `opt_deps`        | none             | Initialized first when registered              |
//! | `init`            | `Ok(())`         | Called once, in dependency order               |
//! | `shutdown`        | `Ok(())`         | Called once, in reverse order, if init passed  |
//! | `server_options`  | none             | Configuration handed to the transport layer    |

use crate::context::Context;
use crate::error::ComponentError;
use async_trait::async_trait;
use std::any::{Any, type_name};
use std::fmt;
use std::sync::Arc;

/// A registrable unit with optional dependencies and lifecycle hooks.
///
/// # Dyn Compatibility
///
/// The registry stores components as `Arc<dyn Component>`, so the trait is
/// object safe. Async hooks go through `async_trait`.
#[async_trait]
pub trait Component: Send + Sync + 'static {
    /// Unique name, used for lookup and dependency resolution.
    fn name(&self) -> &str;

    /// Names of components that must be registered and initialized before
    /// this one.
    fn deps(&self) -> Vec<String> {
        Vec::new()
    }

    /// Names of components that are initialized before this one if they are
    /// registered. Missing optional dependencies are ignored.
    fn opt_deps(&self) -> Vec<String> {
        Vec::new()
    }

    /// Initialize the component.
    ///
    /// Every declared dependency that is registered has already been
    /// initialized and can be fetched through `lookup`.
    ///
    /// # Errors
    ///
    /// Any error aborts registry initialization.
    async fn init(&self, _ctx: &Context, _lookup: &dyn Lookup) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Release the component's resources.
    ///
    /// # Errors
    ///
    /// Errors are collected by the registry; the remaining components are
    /// still shut down.
    async fn shutdown(&self, _ctx: &Context) -> Result<(), ComponentError> {
        Ok(())
    }

    /// Options this component contributes to the surrounding server.
    fn server_options(&self) -> Vec<ServerOption> {
        Vec::new()
    }
}

/// Read-only component lookup, handed to [`Component::init`].
pub trait Lookup: Send + Sync {
    /// The component registered under `name`.
    fn component(&self, name: &str) -> Option<Arc<dyn Component>>;

    /// The component registered under `name`, as `Any` for downcasting.
    fn component_any(&self, name: &str) -> Option<Arc<dyn Any + Send + Sync>>;
}

impl dyn Lookup + '_ {
    /// The component registered under `name` as its concrete type.
    ///
    /// Returns `None` if nothing is registered under `name` or if the
    /// registered component is not a `T`.
    #[must_use]
    pub fn get_as<T: Component>(&self, name: &str) -> Option<Arc<T>> {
        self.component_any(name)?.downcast::<T>().ok()
    }
}

/// An opaque option a component contributes to the transport layer.
///
/// The core never interprets options; the server that assembles the
/// components downcasts the ones it understands.
#[derive(Clone)]
pub struct ServerOption {
    value: Arc<dyn Any + Send + Sync>,
    type_name: &'static str,
}

impl ServerOption {
    /// Wrap a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self {
            value: Arc::new(value),
            type_name: type_name::<T>(),
        }
    }

    /// The option as `T`, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    /// Rust type name of the wrapped value, for diagnostics.
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl fmt::Debug for ServerOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ServerOption").field(&self.type_name).finish()
    }
}
