//! Explicit registry of topology modules.
//!
//! A topology reaches the graph only through [`App::register`]. Defining
//! a topology value, or even building it against some other graph, leaves
//! the application untouched.

use stackline_common::error::Result;
use stackline_graph::synth::{self, CloudAssembly};
use stackline_graph::{Resource, ResourceGraph, StackId, Topology, validator};

/// A module registered with the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    /// Name of the module's stack.
    pub name: String,
    /// The module's stack.
    pub stack: StackId,
}

/// An application: one resource graph and the modules registered into it.
#[derive(Debug, Default)]
pub struct App {
    graph: ResourceGraph,
    modules: Vec<ModuleRecord>,
}

impl App {
    /// Creates an empty application.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds `topology` into its own stack and seals it.
    ///
    /// On error the stack is discarded, so a failed module leaves no
    /// resources behind.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack name is taken or the topology fails
    /// to build.
    pub fn register<T: Topology>(&mut self, topology: T, input: T::Input) -> Result<T::Output> {
        let name = topology.stack_name().to_string();
        let stack = self.graph.open_stack(name.clone())?;
        tracing::info!(module = %name, "registering module");

        match topology.build(&mut self.graph, stack, input) {
            Ok(output) => {
                self.graph.seal_stack(stack)?;
                tracing::info!(
                    module = %name,
                    resources = self.graph.resources_in(stack).count(),
                    "module sealed"
                );
                self.modules.push(ModuleRecord { name, stack });
                Ok(output)
            }
            Err(e) => {
                tracing::warn!(module = %name, error = %e, "module failed, discarding stack");
                self.graph.discard_stack(stack)?;
                Err(e)
            }
        }
    }

    /// Returns the registered modules in registration order.
    #[must_use]
    pub fn modules(&self) -> &[ModuleRecord] {
        &self.modules
    }

    /// Returns the underlying graph.
    #[must_use]
    pub const fn graph(&self) -> &ResourceGraph {
        &self.graph
    }

    /// Mutable access to the graph, for declaring resources by hand.
    pub const fn graph_mut(&mut self) -> &mut ResourceGraph {
        &mut self.graph
    }

    /// Validates the whole graph.
    ///
    /// # Errors
    ///
    /// Returns the first validation failure.
    pub fn validate(&self) -> Result<()> {
        validator::validate(&self.graph)
    }

    /// Renders the graph into a cloud assembly.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph fails validation.
    pub fn synthesize(&self) -> Result<CloudAssembly> {
        synth::synthesize(&self.graph)
    }

    /// Resources in creation order.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn deployment_order(&self) -> Result<Vec<&Resource>> {
        self.graph.deployment_order()
    }

    /// Resources in destruction order, dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains a cycle.
    pub fn teardown_order(&self) -> Result<Vec<&Resource>> {
        self.graph.teardown_order()
    }
}

#[cfg(test)]
mod tests {
    use stackline_common::error::StacklineError;
    use stackline_graph::{ResourceKind, ResourceSpec, StackState};

    use super::*;

    struct Bucket {
        name: &'static str,
        fail: bool,
    }

    impl Topology for Bucket {
        type Input = ();
        type Output = usize;

        fn stack_name(&self) -> &str {
            self.name
        }

        fn build(self, graph: &mut ResourceGraph, stack: StackId, (): ()) -> Result<usize> {
            let _ = graph.add_resource(
                stack,
                ResourceSpec::new(format!("{}Group", self.name), ResourceKind::LogGroup),
            )?;
            if self.fail {
                return Err(StacklineError::config("bucket refused"));
            }
            Ok(graph.resources_in(stack).count())
        }
    }

    #[test]
    fn registered_module_is_sealed_and_recorded() {
        let mut app = App::new();
        let count = app
            .register(Bucket { name: "Logs", fail: false }, ())
            .expect("register");
        assert_eq!(count, 1);
        assert_eq!(app.modules().len(), 1);
        let record = &app.modules()[0];
        assert_eq!(record.name, "Logs");
        assert_eq!(app.graph().stack_state(record.stack), Some(StackState::Sealed));
    }

    #[test]
    fn unregistered_topology_declares_nothing() {
        let app = App::new();
        let _defined = Bucket { name: "Orphan", fail: false };
        assert!(app.modules().is_empty());
        assert!(app.graph().is_empty());
    }

    #[test]
    fn failed_module_is_discarded() {
        let mut app = App::new();
        let err = app
            .register(Bucket { name: "Broken", fail: true }, ())
            .unwrap_err();
        assert!(matches!(err, StacklineError::Config { .. }));
        assert!(app.modules().is_empty());
        assert!(app.graph().is_empty());
        assert!(app.graph().find_stack("Broken").is_none());
    }

    #[test]
    fn duplicate_module_name_is_rejected() {
        let mut app = App::new();
        let _ = app
            .register(Bucket { name: "Logs", fail: false }, ())
            .expect("first");
        assert!(app.register(Bucket { name: "Logs", fail: false }, ()).is_err());
        assert_eq!(app.modules().len(), 1);
    }
}
