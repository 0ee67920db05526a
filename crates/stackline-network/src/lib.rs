//! # stackline-network
//!
//! The leaf topology: an isolated virtual network with a public and a
//! private-with-egress subnet per availability zone, one shared NAT
//! gateway, and private routes to the image registry, its storage backend
//! and the logging backend.
//!
//! Handles:
//! - **Cidr**: IPv4 block arithmetic.
//! - **Subnet**: Carving disjoint subnet tiers out of the network block.
//! - **Endpoint**: The managed services reached without internet transit.
//! - **Topology**: Declaring the network and exposing its handle.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used))]

pub mod cidr;
pub mod endpoint;
pub mod subnet;
pub mod topology;

pub use cidr::Ipv4Cidr;
pub use topology::{NetworkHandle, NetworkTopology};
