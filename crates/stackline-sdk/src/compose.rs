//! The composition root.
//!
//! The network is registered first and sealed; only then is its handle
//! passed into the compute topology. Registration order is the single
//! cross-stack edge of the graph and fixes both creation and teardown
//! order.

use stackline_common::config::StacklineConfig;
use stackline_common::error::Result;
use stackline_compute::{ComputeOutputs, ComputeTopology};
use stackline_network::{NetworkHandle, NetworkTopology};

use crate::app::App;
use crate::outputs::OutputSet;

/// A fully composed application.
#[derive(Debug)]
pub struct Composition {
    /// The application holding both stacks.
    pub app: App,
    /// Handle of the sealed network.
    pub network: NetworkHandle,
    /// Outputs of the compute topology.
    pub compute: ComputeOutputs,
    /// Published outputs.
    pub outputs: OutputSet,
}

/// Builds the network, then the compute topology inside it.
///
/// # Errors
///
/// Returns the first configuration, ordering or invariant error. A failed
/// topology leaves no resources of its stack in the graph.
pub fn compose(config: &StacklineConfig) -> Result<Composition> {
    let mut app = App::new();
    let network = app.register(NetworkTopology::from_config(config), ())?;
    let compute = app.register(ComputeTopology::from_config(config), network.clone())?;
    let outputs = OutputSet::new(&network, &compute);
    tracing::info!(modules = app.modules().len(), resources = app.graph().len(), "composition complete");
    Ok(Composition {
        app,
        network,
        compute,
        outputs,
    })
}
