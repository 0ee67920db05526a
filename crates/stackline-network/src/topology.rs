//! Network topology declaration.

use serde_json::{Value, json};
use stackline_common::config::{EnvironmentConfig, NetworkConfig, StacklineConfig};
use stackline_common::constants;
use stackline_common::error::{Result, StacklineError};
use stackline_graph::{GraphId, NodeRef, ResourceGraph, ResourceKind, ResourceSpec, StackId, Topology};

use crate::cidr::Ipv4Cidr;
use crate::endpoint::{EndpointKind, REQUIRED_ENDPOINTS, ServiceEndpoint};
use crate::subnet::{self, SubnetPlan, SubnetTier};

const ANYWHERE: &str = "0.0.0.0/0";

/// Declared resources of one subnet.
#[derive(Debug, Clone)]
pub struct SubnetHandle {
    /// Placement of the subnet.
    pub plan: SubnetPlan,
    /// The subnet itself.
    pub subnet: NodeRef,
    /// Its route table.
    pub route_table: NodeRef,
    /// Its default route.
    pub default_route: NodeRef,
}

/// A declared service endpoint.
#[derive(Debug, Clone)]
pub struct EndpointHandle {
    /// Which service the endpoint reaches.
    pub endpoint: ServiceEndpoint,
    /// The endpoint resource.
    pub node: NodeRef,
}

/// The typed handle a completed network hands to its dependents.
///
/// Only [`NetworkTopology`] constructs it, so every handle refers to
/// resources that were actually declared. Whether the owning stack has
/// been sealed is checked by the consumer through
/// [`ResourceGraph::require_sealed`].
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    vpc: NodeRef,
    cidr: Ipv4Cidr,
    public_subnets: Vec<SubnetHandle>,
    private_subnets: Vec<SubnetHandle>,
    nat_gateway: NodeRef,
    endpoints: Vec<EndpointHandle>,
}

impl NetworkHandle {
    /// Returns the network resource.
    #[must_use]
    pub const fn vpc(&self) -> &NodeRef {
        &self.vpc
    }

    /// Token resolving to the network identifier.
    #[must_use]
    pub fn vpc_id(&self) -> Value {
        self.vpc.reference()
    }

    /// Returns the graph the network was declared in.
    #[must_use]
    pub const fn graph(&self) -> GraphId {
        self.vpc.graph()
    }

    /// Returns the stack owning the network.
    #[must_use]
    pub const fn stack(&self) -> StackId {
        self.vpc.stack()
    }

    /// Returns the network address block.
    #[must_use]
    pub const fn cidr(&self) -> Ipv4Cidr {
        self.cidr
    }

    /// Returns the public subnets, one per availability zone.
    #[must_use]
    pub fn public_subnets(&self) -> &[SubnetHandle] {
        &self.public_subnets
    }

    /// Returns the private subnets, one per availability zone.
    #[must_use]
    pub fn private_subnets(&self) -> &[SubnetHandle] {
        &self.private_subnets
    }

    /// Returns the shared NAT gateway.
    #[must_use]
    pub const fn nat_gateway(&self) -> &NodeRef {
        &self.nat_gateway
    }

    /// Returns the service endpoints.
    #[must_use]
    pub fn endpoints(&self) -> &[EndpointHandle] {
        &self.endpoints
    }

    /// Returns every subnet, public first.
    pub fn subnets(&self) -> impl Iterator<Item = &SubnetHandle> + '_ {
        self.public_subnets.iter().chain(&self.private_subnets)
    }

    /// Tokens of the public subnet identifiers.
    #[must_use]
    pub fn public_subnet_ids(&self) -> Vec<Value> {
        self.public_subnets.iter().map(|s| s.subnet.reference()).collect()
    }

    /// Tokens of the private subnet identifiers.
    #[must_use]
    pub fn private_subnet_ids(&self) -> Vec<Value> {
        self.private_subnets.iter().map(|s| s.subnet.reference()).collect()
    }
}

/// The isolated virtual network.
#[derive(Debug, Clone)]
pub struct NetworkTopology {
    stack_name: String,
    cidr: String,
    max_azs: u8,
    subnet_mask: u8,
    region: String,
}

impl NetworkTopology {
    /// Creates a network topology for the given settings.
    #[must_use]
    pub fn new(
        stack_name: impl Into<String>,
        network: &NetworkConfig,
        environment: &EnvironmentConfig,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            cidr: network.cidr.clone(),
            max_azs: network.max_azs,
            subnet_mask: network.subnet_mask,
            region: environment.region.clone(),
        }
    }

    /// Creates the standard network stack from a full configuration.
    #[must_use]
    pub fn from_config(config: &StacklineConfig) -> Self {
        Self::new(
            constants::NETWORK_STACK_NAME,
            &config.network,
            &config.environment,
        )
    }

    fn declare_subnet(
        graph: &mut ResourceGraph,
        stack: StackId,
        vpc: &NodeRef,
        plan: SubnetPlan,
    ) -> Result<(NodeRef, NodeRef)> {
        let name = plan.name();
        let subnet = graph.add_resource(
            stack,
            ResourceSpec::new(name.clone(), ResourceKind::Subnet)
                .property("VpcId", vpc.reference())
                .property("CidrBlock", plan.cidr.to_string())
                .property("AvailabilityZone", plan.availability_zone.clone())
                .property("MapPublicIpOnLaunch", plan.tier == SubnetTier::Public)
                .property(
                    "Tags",
                    json!([
                        { "Key": "Name", "Value": name },
                        { "Key": "stackline:subnet-type", "Value": plan.tier.label() },
                    ]),
                ),
        )?;
        let route_table = graph.add_resource(
            stack,
            ResourceSpec::new(format!("{name}RouteTable"), ResourceKind::RouteTable)
                .property("VpcId", vpc.reference()),
        )?;
        let _ = graph.add_resource(
            stack,
            ResourceSpec::new(
                format!("{name}RouteTableAssociation"),
                ResourceKind::RouteTableAssociation,
            )
            .property("RouteTableId", route_table.reference())
            .property("SubnetId", subnet.reference()),
        )?;
        Ok((subnet, route_table))
    }
}

impl Topology for NetworkTopology {
    type Input = ();
    type Output = NetworkHandle;

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    fn build(self, graph: &mut ResourceGraph, stack: StackId, (): ()) -> Result<NetworkHandle> {
        let cidr: Ipv4Cidr = self.cidr.parse()?;
        let zones = subnet::availability_zones(&self.region, self.max_azs)?;
        let plans = subnet::plan_subnets(&cidr, &zones, self.subnet_mask)?;
        tracing::info!(
            stack = %self.stack_name,
            cidr = %cidr,
            azs = zones.len(),
            "declaring network"
        );

        let vpc = graph.add_resource(
            stack,
            ResourceSpec::new("Vpc", ResourceKind::Vpc)
                .property("CidrBlock", cidr.to_string())
                .property("EnableDnsHostnames", true)
                .property("EnableDnsSupport", true)
                .property(
                    "Tags",
                    json!([{ "Key": "Name", "Value": format!("{}/Vpc", self.stack_name) }]),
                ),
        )?;
        let igw = graph.add_resource(
            stack,
            ResourceSpec::new("VpcIGW", ResourceKind::InternetGateway),
        )?;
        let attachment = graph.add_resource(
            stack,
            ResourceSpec::new("VpcGatewayAttachment", ResourceKind::GatewayAttachment)
                .property("VpcId", vpc.reference())
                .property("InternetGatewayId", igw.reference()),
        )?;

        let (public_plans, private_plans): (Vec<SubnetPlan>, Vec<SubnetPlan>) = plans
            .into_iter()
            .partition(|p| p.tier == SubnetTier::Public);

        let mut public_subnets = Vec::with_capacity(public_plans.len());
        for plan in public_plans {
            let (subnet, route_table) = Self::declare_subnet(graph, stack, &vpc, plan.clone())?;
            let default_route = graph.add_resource(
                stack,
                ResourceSpec::new(format!("{}DefaultRoute", plan.name()), ResourceKind::Route)
                    .property("RouteTableId", route_table.reference())
                    .property("DestinationCidrBlock", ANYWHERE)
                    .property("GatewayId", igw.reference())
                    .depends_on(&attachment),
            )?;
            public_subnets.push(SubnetHandle {
                plan,
                subnet,
                route_table,
                default_route,
            });
        }

        // One NAT gateway in the first public subnet serves every zone.
        let nat_home = public_subnets
            .first()
            .ok_or_else(|| StacklineError::config("network has no public subnet"))?;
        let home_name = nat_home.plan.name();
        let eip = graph.add_resource(
            stack,
            ResourceSpec::new(format!("{home_name}EIP"), ResourceKind::ElasticIp)
                .property("Domain", "vpc"),
        )?;
        let nat_gateway = graph.add_resource(
            stack,
            ResourceSpec::new(format!("{home_name}NATGateway"), ResourceKind::NatGateway)
                .property("SubnetId", nat_home.subnet.reference())
                .property("AllocationId", eip.attribute("AllocationId"))
                .depends_on(&nat_home.default_route),
        )?;

        let mut private_subnets = Vec::with_capacity(private_plans.len());
        for plan in private_plans {
            let (subnet, route_table) = Self::declare_subnet(graph, stack, &vpc, plan.clone())?;
            let default_route = graph.add_resource(
                stack,
                ResourceSpec::new(format!("{}DefaultRoute", plan.name()), ResourceKind::Route)
                    .property("RouteTableId", route_table.reference())
                    .property("DestinationCidrBlock", ANYWHERE)
                    .property("NatGatewayId", nat_gateway.reference()),
            )?;
            private_subnets.push(SubnetHandle {
                plan,
                subnet,
                route_table,
                default_route,
            });
        }

        let endpoint_sg = graph.add_resource(
            stack,
            ResourceSpec::new("EndpointSecurityGroup", ResourceKind::SecurityGroup)
                .property("GroupDescription", "HTTPS from inside the network to service endpoints")
                .property("VpcId", vpc.reference())
                .property(
                    "SecurityGroupIngress",
                    json!([{
                        "IpProtocol": "tcp",
                        "FromPort": 443,
                        "ToPort": 443,
                        "CidrIp": cidr.to_string(),
                    }]),
                ),
        )?;

        let private_subnet_ids: Vec<Value> =
            private_subnets.iter().map(|s| s.subnet.reference()).collect();
        let private_route_tables: Vec<Value> = private_subnets
            .iter()
            .map(|s| s.route_table.reference())
            .collect();
        let mut endpoints = Vec::with_capacity(REQUIRED_ENDPOINTS.len());
        for endpoint in REQUIRED_ENDPOINTS {
            let spec = ResourceSpec::new(endpoint.logical_id, ResourceKind::VpcEndpoint)
                .property("ServiceName", endpoint.service_name(&self.region))
                .property("VpcEndpointType", endpoint.kind.as_str())
                .property("VpcId", vpc.reference());
            let spec = match endpoint.kind {
                EndpointKind::Interface => spec
                    .property("PrivateDnsEnabled", true)
                    .property("SubnetIds", private_subnet_ids.clone())
                    .property("SecurityGroupIds", json!([endpoint_sg.attribute("GroupId")])),
                EndpointKind::Gateway => {
                    spec.property("RouteTableIds", private_route_tables.clone())
                }
            };
            let node = graph.add_resource(stack, spec)?;
            endpoints.push(EndpointHandle { endpoint, node });
        }

        graph.add_output(
            stack,
            constants::OUTPUT_VPC_ID,
            vpc.reference(),
            Some("Identifier of the isolated network".to_string()),
        )?;

        let handle = NetworkHandle {
            vpc,
            cidr,
            public_subnets,
            private_subnets,
            nat_gateway,
            endpoints,
        };
        check_network(graph, &handle)?;
        Ok(handle)
    }
}

/// Re-verifies the network invariants against the declared resources.
///
/// # Checks performed
///
/// 1. Exactly one NAT gateway exists in the network stack.
/// 2. Every private route table has a default route, and every route in it
///    targets the shared NAT gateway; no private route reaches the
///    internet gateway.
/// 3. Subnet blocks lie inside the network and are pairwise disjoint.
/// 4. Every required service endpoint is attached.
///
/// # Errors
///
/// Returns an invariant error naming the offending resource.
pub fn check_network(graph: &ResourceGraph, handle: &NetworkHandle) -> Result<()> {
    let nat_count = graph
        .resources_in(handle.stack())
        .filter(|r| r.kind == ResourceKind::NatGateway)
        .count();
    if nat_count != 1 {
        return Err(StacklineError::invariant(
            "NatGateway",
            format!("expected exactly one NAT gateway, found {nat_count}"),
        ));
    }

    let nat_ref = handle.nat_gateway.reference();
    for subnet in &handle.private_subnets {
        let table = subnet.route_table.reference();
        let routes: Vec<_> = graph
            .resources_in(handle.stack())
            .filter(|r| r.kind == ResourceKind::Route && r.property("RouteTableId") == Some(&table))
            .collect();
        if routes.is_empty() {
            return Err(StacklineError::invariant(
                subnet.route_table.logical_id(),
                "private route table has no egress route",
            ));
        }
        for route in routes {
            if route.property("GatewayId").is_some()
                || route.property("NatGatewayId") != Some(&nat_ref)
            {
                return Err(StacklineError::invariant(
                    &route.logical_id,
                    "private subnet egress must go through the shared NAT gateway",
                ));
            }
        }
    }

    let plans: Vec<SubnetPlan> = handle.subnets().map(|s| s.plan.clone()).collect();
    subnet::check_disjoint(&handle.cidr, &plans)?;

    for required in REQUIRED_ENDPOINTS {
        if !handle.endpoints.iter().any(|e| e.endpoint == required) {
            return Err(StacklineError::invariant(
                required.logical_id,
                "required service endpoint is missing",
            ));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(config: &StacklineConfig) -> (ResourceGraph, Result<NetworkHandle>) {
        let mut graph = ResourceGraph::new();
        let topology = NetworkTopology::from_config(config);
        let stack = graph.open_stack(topology.stack_name().to_string()).expect("open");
        let result = topology.build(&mut graph, stack, ());
        (graph, result)
    }

    fn count(graph: &ResourceGraph, kind: ResourceKind) -> usize {
        graph.resources().filter(|r| r.kind == kind).count()
    }

    #[test]
    fn default_network_has_two_zones() {
        let (graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        assert_eq!(handle.public_subnets().len(), 2);
        assert_eq!(handle.private_subnets().len(), 2);
        assert_eq!(count(&graph, ResourceKind::Subnet), 4);
        assert_eq!(count(&graph, ResourceKind::NatGateway), 1);
        assert_eq!(count(&graph, ResourceKind::VpcEndpoint), 4);
        assert_eq!(handle.cidr().to_string(), "10.0.0.0/16");
    }

    #[test]
    fn nat_gateway_count_is_independent_of_zones() {
        for azs in 1..=4u8 {
            let mut config = StacklineConfig::default();
            config.network.max_azs = azs;
            let (graph, handle) = build(&config);
            let handle = handle.expect("build");
            assert_eq!(count(&graph, ResourceKind::NatGateway), 1);
            assert_eq!(handle.private_subnets().len(), usize::from(azs));
        }
    }

    #[test]
    fn private_routes_target_the_nat_gateway() {
        let (graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        for subnet in handle.private_subnets() {
            let route = graph.node(&subnet.default_route).expect("route");
            assert_eq!(
                route.property("NatGatewayId"),
                Some(&handle.nat_gateway().reference())
            );
            assert!(route.property("GatewayId").is_none());
        }
        for subnet in handle.public_subnets() {
            let route = graph.node(&subnet.default_route).expect("route");
            assert_eq!(route.property("GatewayId"), Some(&json!({ "Ref": "VpcIGW" })));
        }
    }

    #[test]
    fn gateway_endpoint_binds_private_route_tables() {
        let (graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        let s3 = graph.resource(handle.stack(), "S3Endpoint").expect("s3");
        let tables: Vec<Value> = handle
            .private_subnets()
            .iter()
            .map(|s| s.route_table.reference())
            .collect();
        assert_eq!(s3.property("RouteTableIds"), Some(&Value::Array(tables)));
        assert_eq!(s3.property("ServiceName"), Some(&json!("com.amazonaws.us-east-1.s3")));

        let logs = graph.resource(handle.stack(), "CloudWatchLogsEndpoint").expect("logs");
        assert_eq!(logs.property("VpcEndpointType"), Some(&json!("Interface")));
        assert_eq!(logs.property("PrivateDnsEnabled"), Some(&json!(true)));
    }

    #[test]
    fn invalid_split_fails_before_any_resource() {
        let mut config = StacklineConfig::default();
        config.network.cidr = "10.0.0.0/23".into();
        config.network.max_azs = 2;
        let (graph, handle) = build(&config);
        assert!(matches!(handle, Err(StacklineError::Config { .. })));
        assert!(graph.is_empty());
    }

    #[test]
    fn malformed_cidr_fails_before_any_resource() {
        let mut config = StacklineConfig::default();
        config.network.cidr = "10.0.0.1/16".into();
        let (graph, handle) = build(&config);
        assert!(handle.is_err());
        assert!(graph.is_empty());
    }

    #[test]
    fn vpc_id_output_is_declared() {
        let (graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        let outputs = graph.outputs(handle.stack());
        assert_eq!(outputs.len(), 1);
        assert_eq!(outputs[0].name, "VpcId");
        assert_eq!(outputs[0].value, handle.vpc_id());
    }

    #[test]
    fn check_network_flags_second_nat_gateway() {
        let (mut graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        let _ = graph
            .add_resource(
                handle.stack(),
                ResourceSpec::new("ExtraNat", ResourceKind::NatGateway),
            )
            .expect("extra");
        let err = check_network(&graph, &handle).unwrap_err();
        assert!(err.to_string().contains("exactly one NAT gateway"), "got: {err}");
    }

    #[test]
    fn check_network_flags_direct_internet_route_from_private_subnet() {
        let (mut graph, handle) = build(&StacklineConfig::default());
        let handle = handle.expect("build");
        let table = handle.private_subnets()[0].route_table.clone();
        let _ = graph
            .add_resource(
                handle.stack(),
                ResourceSpec::new("LeakyRoute", ResourceKind::Route)
                    .property("RouteTableId", table.reference())
                    .property("DestinationCidrBlock", "0.0.0.0/0")
                    .property("GatewayId", json!({ "Ref": "VpcIGW" })),
            )
            .expect("route");
        let err = check_network(&graph, &handle).unwrap_err();
        assert!(matches!(err, StacklineError::Invariant { ref resource, .. } if resource == "LeakyRoute"));
    }
}
