//! # stackline-compute
//!
//! The dependent topology: packages a local source tree into a container
//! image and runs it as a load-balanced, self-healing service inside the
//! network it receives.
//!
//! Handles:
//! - **Capacity**: Accepted CPU/memory combinations per architecture.
//! - **Role**: The single task identity and its additive policies.
//! - **Health**: Target group health checks bound to the application contract.
//! - **Task**: Task definitions and their revision fingerprints.
//! - **Service**: Port binding and deployment safety settings.
//! - **Rollout**: The revision rollout state machine the service is configured for.
//! - **Topology**: Declaring the compute stack.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod capacity;
pub mod health;
pub mod role;
pub mod rollout;
pub mod service;
pub mod task;
pub mod topology;

pub use health::{HealthCheck, HttpCodeMatcher};
pub use rollout::{Revision, Rollout, RolloutState};
pub use task::TaskDefinitionSpec;
pub use topology::{ComputeOutputs, ComputeTopology};
