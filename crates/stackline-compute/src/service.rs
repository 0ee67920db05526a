//! Service port binding and deployment safety.

use serde_json::{Value, json};
use stackline_common::config::ComputeConfig;
use stackline_common::error::{Result, StacklineError};

/// The ports tying the load balancer to the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortBinding {
    /// Port the load balancer listens on.
    pub listener: u16,
    /// Port mapped on the container and host.
    pub container: u16,
}

impl PortBinding {
    /// Derives and checks the binding from the compute configuration.
    ///
    /// The listener must face the container's mapped host port, and the
    /// container must map the port the application listens on.
    ///
    /// # Errors
    ///
    /// Returns an invariant error naming the mismatched ports.
    pub fn from_config(config: &ComputeConfig) -> Result<Self> {
        if config.container_port != config.contract.port {
            return Err(StacklineError::invariant(
                "TaskDefinition",
                format!(
                    "container maps port {} but the application listens on {}",
                    config.container_port, config.contract.port
                ),
            ));
        }
        if config.listener_port != config.container_port {
            return Err(StacklineError::invariant(
                "Listener",
                format!(
                    "listener port {} differs from container host port {}",
                    config.listener_port, config.container_port
                ),
            ));
        }
        Ok(Self {
            listener: config.listener_port,
            container: config.container_port,
        })
    }
}

/// How the service replaces running tasks with a new revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeploymentPolicy {
    /// Whether a failed revision rolls back automatically.
    pub rollback: bool,
    /// Lower bound of running tasks during a deployment, in percent of desired.
    pub minimum_healthy_percent: u32,
    /// Upper bound of running tasks during a deployment, in percent of desired.
    pub maximum_percent: u32,
}

impl DeploymentPolicy {
    /// Rolling replacement that keeps the full desired count serving.
    #[must_use]
    pub const fn rolling(rollback: bool) -> Self {
        Self {
            rollback,
            minimum_healthy_percent: 100,
            maximum_percent: 200,
        }
    }

    /// Renders the service deployment configuration.
    #[must_use]
    pub fn render(&self) -> Value {
        json!({
            "DeploymentCircuitBreaker": {
                "Enable": true,
                "Rollback": self.rollback,
            },
            "MinimumHealthyPercent": self.minimum_healthy_percent,
            "MaximumPercent": self.maximum_percent,
        })
    }
}
