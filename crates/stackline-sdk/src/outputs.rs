//! The externally consumed results of a composition.

use serde::Serialize;
use serde_json::Value;
use stackline_common::constants;
use stackline_compute::ComputeOutputs;
use stackline_network::NetworkHandle;

/// Named outputs, read-only once the composition completes.
///
/// Values are tokens until an apply engine resolves them, except for the
/// image URI when the account is configured.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputSet {
    /// Public address of the service.
    #[serde(rename = "LoadBalancerDNS")]
    pub load_balancer_dns: Value,
    /// Content-addressed location of the deployed image.
    #[serde(rename = "ImageURI")]
    pub image_uri: Value,
    /// Identifier of the constructed network.
    #[serde(rename = "VpcId")]
    pub vpc_id: Value,
}

impl OutputSet {
    /// Collects the outputs of a network and the compute topology built on it.
    #[must_use]
    pub fn new(network: &NetworkHandle, compute: &ComputeOutputs) -> Self {
        Self {
            load_balancer_dns: compute.load_balancer_dns.clone(),
            image_uri: compute.image_uri.clone(),
            vpc_id: network.vpc_id(),
        }
    }

    /// Looks an output up by its published name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        match name {
            constants::OUTPUT_LOAD_BALANCER_DNS => Some(&self.load_balancer_dns),
            constants::OUTPUT_IMAGE_URI => Some(&self.image_uri),
            constants::OUTPUT_VPC_ID => Some(&self.vpc_id),
            _ => None,
        }
    }

    /// Iterates over `(name, value)` pairs in publication order.
    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        [
            (constants::OUTPUT_LOAD_BALANCER_DNS, &self.load_balancer_dns),
            (constants::OUTPUT_IMAGE_URI, &self.image_uri),
            (constants::OUTPUT_VPC_ID, &self.vpc_id),
        ]
        .into_iter()
    }
}
