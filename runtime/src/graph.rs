//! Initialization order from declared dependencies.
//!
//! The order is produced by a depth-first traversal that emits a node only
//! after everything it depends on has been emitted:
//!
//! 1. Roots are visited in registration order
//! 2. From each node, required dependencies are visited in declared order,
//!    then optional dependencies in declared order
//! 3. A node reached again while still on the traversal stack is a cycle
//! 4. A required dependency that is not registered is an error; an optional
//!    one is skipped
//!
//! Because every choice point follows a declared order, the result is
//! deterministic: components with no unmet dependencies keep their
//! registration order.

use crate::error::RegistryError;
use std::collections::HashMap;

/// Outgoing edges of one registered node.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Edges {
    /// Dependencies that must be registered
    pub required: Vec<String>,
    /// Dependencies that are ordered first only when registered
    pub optional: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Compute an order in which every registered dependency precedes its
/// dependents.
///
/// `roots` lists the registered names in registration order; `edges` returns
/// the dependencies of a registered name and `None` for unknown names.
///
/// # Errors
///
/// - [`RegistryError::DependencyCycle`] naming the node whose traversal
///   re-entered itself
/// - [`RegistryError::MissingDependency`] for an unregistered required
///   dependency
pub fn resolve<F>(roots: &[String], edges: F) -> Result<Vec<String>, RegistryError>
where
    F: Fn(&str) -> Option<Edges>,
{
    let mut resolver = Resolver {
        edges,
        marks: HashMap::with_capacity(roots.len()),
        order: Vec::with_capacity(roots.len()),
    };

    for root in roots {
        resolver.visit(root)?;
    }

    Ok(resolver.order)
}

struct Resolver<F> {
    edges: F,
    marks: HashMap<String, Mark>,
    order: Vec<String>,
}

impl<F> Resolver<F>
where
    F: Fn(&str) -> Option<Edges>,
{
    fn visit(&mut self, name: &str) -> Result<(), RegistryError> {
        match self.marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                return Err(RegistryError::DependencyCycle {
                    component: name.to_string(),
                });
            },
            None => {},
        }

        // Roots are always registered; dependencies are checked before recursing.
        let Some(edges) = (self.edges)(name) else {
            return Ok(());
        };

        self.marks.insert(name.to_string(), Mark::Visiting);

        for dep in &edges.required {
            if (self.edges)(dep).is_none() {
                return Err(RegistryError::MissingDependency {
                    dependency: dep.clone(),
                    dependent: name.to_string(),
                });
            }
            self.visit(dep)?;
        }

        for dep in &edges.optional {
            if (self.edges)(dep).is_none() {
                tracing::debug!(
                    component = name,
                    dependency = dep.as_str(),
                    "optional dependency not registered, skipping"
                );
                continue;
            }
            self.visit(dep)?;
        }

        self.marks.insert(name.to_string(), Mark::Done);
        self.order.push(name.to_string());
        Ok(())
    }
}
