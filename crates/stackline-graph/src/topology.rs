//! The contract of an independently constructible topology module.

use stackline_common::error::Result;

use crate::graph::{ResourceGraph, StackId};

/// A unit that declares its resources into one stack of a graph.
///
/// Dependencies on other topologies arrive through [`Topology::Input`] as
/// fully resolved values, never by looking resources up by name. A
/// topology only reaches the graph when a composition root registers it;
/// constructing the value alone declares nothing.
pub trait Topology {
    /// Resolved handles this topology depends on.
    type Input;
    /// Handles and values this topology exposes to its dependents.
    type Output;

    /// Name of the stack the topology declares into.
    fn stack_name(&self) -> &str;

    /// Declares every resource of the topology into the open `stack`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, an input handle is
    /// not resolved, or an invariant does not hold. The caller discards the
    /// stack on error.
    fn build(self, graph: &mut ResourceGraph, stack: StackId, input: Self::Input)
    -> Result<Self::Output>;
}
