use plugboard_core::ComponentError;
use std::fmt;
use thiserror::Error;

/// Errors that can occur while registering, initializing or shutting down
/// components.
#[derive(Error, Debug)]
pub enum RegistryError {
    /// A component with the same name is already registered
    #[error("component '{0}' is already registered")]
    DuplicateComponent(String),

    /// The dependency graph contains a cycle
    ///
    /// Names the component whose traversal re-entered itself.
    #[error("dependency cycle detected involving '{component}'")]
    DependencyCycle {
        /// Component where the cycle was detected
        component: String,
    },

    /// A required dependency is not registered
    #[error("missing dependency, '{dependency}' not registered (required by '{dependent}')")]
    MissingDependency {
        /// The unregistered name
        dependency: String,
        /// The component that declared it
        dependent: String,
    },

    /// A component's init hook failed
    ///
    /// Components initialized before it are not rolled back.
    #[error("failed to initialize '{component}': {source}")]
    InitFailed {
        /// Component whose hook failed
        component: String,
        /// The hook's error
        #[source]
        source: ComponentError,
    },

    /// One or more shutdown hooks failed
    ///
    /// Every component was still given the chance to shut down.
    #[error("{} component(s) failed to shut down: {}", .0.len(), DisplayFailures(.0))]
    ShutdownFailed(Vec<ShutdownFailure>),
}

/// A single failed shutdown hook.
#[derive(Debug)]
pub struct ShutdownFailure {
    /// Component whose hook failed
    pub component: String,
    /// The hook's error
    pub error: ComponentError,
}

impl fmt::Display for ShutdownFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}': {}", self.component, self.error)
    }
}

struct DisplayFailures<'a>(&'a [ShutdownFailure]);

impl fmt::Display for DisplayFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contract_messages() {
        let cycle = RegistryError::DependencyCycle { component: "A".into() };
        assert_eq!(cycle.to_string(), "dependency cycle detected involving 'A'");

        let missing = RegistryError::MissingDependency {
            dependency: "XX".into(),
            dependent: "B".into(),
        };
        assert!(missing.to_string().starts_with("missing dependency, 'XX' not registered"));
    }

    #[test]
    fn test_shutdown_failures_are_listed() {
        let err = RegistryError::ShutdownFailed(vec![
            ShutdownFailure { component: "db".into(), error: ComponentError::msg("pool busy") },
            ShutdownFailure { component: "cache".into(), error: ComponentError::msg("flush failed") },
        ]);

        assert_eq!(
            err.to_string(),
            "2 component(s) failed to shut down: 'db': pool busy; 'cache': flush failed"
        );
    }
}
