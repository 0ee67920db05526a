//! Private routes to managed backend services.

use std::fmt;

use serde::Serialize;

/// How an endpoint attaches to the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum EndpointKind {
    /// Network interfaces in the private subnets, resolved through private DNS.
    Interface,
    /// Route-table entries pointing at a gateway.
    Gateway,
}

impl EndpointKind {
    /// Returns the endpoint type name used in resource properties.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Interface => "Interface",
            Self::Gateway => "Gateway",
        }
    }
}

impl fmt::Display for EndpointKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A managed service the private subnets reach without internet transit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct ServiceEndpoint {
    /// Logical id of the endpoint resource.
    pub logical_id: &'static str,
    /// Service short name, e.g. `ecr.dkr`.
    pub service: &'static str,
    /// Attachment kind.
    pub kind: EndpointKind,
}

impl ServiceEndpoint {
    /// Returns the regional service name.
    #[must_use]
    pub fn service_name(&self, region: &str) -> String {
        format!("com.amazonaws.{region}.{}", self.service)
    }
}

/// Registry data plane: image layer pulls.
pub const ECR_DOCKER: ServiceEndpoint = ServiceEndpoint {
    logical_id: "EcrDockerEndpoint",
    service: "ecr.dkr",
    kind: EndpointKind::Interface,
};

/// Registry control plane: authentication and manifests.
pub const ECR_API: ServiceEndpoint = ServiceEndpoint {
    logical_id: "EcrEndpoint",
    service: "ecr.api",
    kind: EndpointKind::Interface,
};

/// Object storage backing the registry's layers.
pub const S3: ServiceEndpoint = ServiceEndpoint {
    logical_id: "S3Endpoint",
    service: "s3",
    kind: EndpointKind::Gateway,
};

/// Logging backend receiving container logs.
pub const CLOUDWATCH_LOGS: ServiceEndpoint = ServiceEndpoint {
    logical_id: "CloudWatchLogsEndpoint",
    service: "logs",
    kind: EndpointKind::Interface,
};

/// Every endpoint the network always carries, in attachment order.
pub const REQUIRED_ENDPOINTS: [ServiceEndpoint; 4] = [ECR_DOCKER, ECR_API, S3, CLOUDWATCH_LOGS];
