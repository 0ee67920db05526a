//! # stackline-graph
//!
//! The resource graph every topology declares into.
//!
//! Handles:
//! - **Resource**: typed resource nodes, references and attribute tokens.
//! - **Graph**: stacks, dependency edges and deployment/teardown ordering.
//! - **Validator**: reference resolution and cross-stack edge checks.
//! - **Synth**: pure rendering of the graph into a cloud assembly.
//! - **Topology**: the trait a constructible topology module implements.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod graph;
pub mod resource;
pub mod synth;
pub mod topology;
pub mod validator;

pub use graph::{GraphId, Output, ResourceGraph, StackId, StackState};
pub use resource::{NodeRef, Resource, ResourceKind, ResourceSpec};
pub use topology::Topology;
