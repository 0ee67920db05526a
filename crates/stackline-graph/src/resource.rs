//! Typed resource nodes and the tokens that reference them.
//!
//! Properties are plain JSON values. A property that points at another
//! resource holds a token, either `{"Ref": id}` or
//! `{"Fn::GetAtt": [id, attribute]}`, produced by [`NodeRef`]. The graph
//! turns every token into a dependency edge when the resource is added.

use std::collections::BTreeMap;
use std::fmt;

use petgraph::stable_graph::NodeIndex;
use serde::Serialize;
use serde_json::{Map, Value, json};

use crate::graph::{GraphId, StackId};

/// The kind of a declared resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum ResourceKind {
    /// Isolated virtual network.
    Vpc,
    /// Internet gateway of the network.
    InternetGateway,
    /// Attachment of the internet gateway to the network.
    GatewayAttachment,
    /// A subnet in one availability zone.
    Subnet,
    /// Route table of one subnet.
    RouteTable,
    /// Association of a route table with a subnet.
    RouteTableAssociation,
    /// A single route inside a route table.
    Route,
    /// Elastic IP address.
    ElasticIp,
    /// Shared NAT gateway.
    NatGateway,
    /// Private route to a managed service.
    VpcEndpoint,
    /// Security group.
    SecurityGroup,
    /// Container log group.
    LogGroup,
    /// Packaged container image (assembly metadata, not a template resource).
    ContainerImageAsset,
    /// Container cluster.
    Cluster,
    /// Identity assumed by tasks.
    Role,
    /// Task definition revision.
    TaskDefinition,
    /// Long-running service.
    Service,
    /// Layer-7 load balancer.
    LoadBalancer,
    /// Load balancer target group.
    TargetGroup,
    /// Load balancer listener.
    Listener,
}

impl ResourceKind {
    /// Returns the provider type name written to templates.
    #[must_use]
    pub const fn type_name(self) -> &'static str {
        match self {
            Self::Vpc => "AWS::EC2::VPC",
            Self::InternetGateway => "AWS::EC2::InternetGateway",
            Self::GatewayAttachment => "AWS::EC2::VPCGatewayAttachment",
            Self::Subnet => "AWS::EC2::Subnet",
            Self::RouteTable => "AWS::EC2::RouteTable",
            Self::RouteTableAssociation => "AWS::EC2::SubnetRouteTableAssociation",
            Self::Route => "AWS::EC2::Route",
            Self::ElasticIp => "AWS::EC2::EIP",
            Self::NatGateway => "AWS::EC2::NatGateway",
            Self::VpcEndpoint => "AWS::EC2::VPCEndpoint",
            Self::SecurityGroup => "AWS::EC2::SecurityGroup",
            Self::LogGroup => "AWS::Logs::LogGroup",
            Self::ContainerImageAsset => "Stackline::Asset::ContainerImage",
            Self::Cluster => "AWS::ECS::Cluster",
            Self::Role => "AWS::IAM::Role",
            Self::TaskDefinition => "AWS::ECS::TaskDefinition",
            Self::Service => "AWS::ECS::Service",
            Self::LoadBalancer => "AWS::ElasticLoadBalancingV2::LoadBalancer",
            Self::TargetGroup => "AWS::ElasticLoadBalancingV2::TargetGroup",
            Self::Listener => "AWS::ElasticLoadBalancingV2::Listener",
        }
    }

    /// Whether the kind is assembly metadata rather than a template resource.
    #[must_use]
    pub const fn is_metadata(self) -> bool {
        matches!(self, Self::ContainerImageAsset)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name())
    }
}

/// A resource node stored in the graph.
#[derive(Debug, Clone, Serialize)]
pub struct Resource {
    /// Logical id, unique within its stack.
    pub logical_id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Owning stack.
    #[serde(skip)]
    pub stack: StackId,
    /// Declared properties.
    pub properties: Map<String, Value>,
    /// Logical ids of explicit dependencies declared in the same stack.
    /// Explicit dependencies on other stacks only order the stacks.
    pub depends_on: Vec<String>,
    #[serde(skip)]
    pub(crate) links: BTreeMap<String, StackId>,
}

impl Resource {
    /// Returns a property by name.
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Returns the stack a token target resolved to when declared.
    #[must_use]
    pub fn target_stack(&self, logical_id: &str) -> Option<StackId> {
        self.links.get(logical_id).copied()
    }

    /// Returns every logical id referenced by a token in the properties.
    #[must_use]
    pub fn referenced_ids(&self) -> Vec<String> {
        let mut ids = Vec::new();
        for value in self.properties.values() {
            collect_token_targets(value, &mut ids);
        }
        ids.sort();
        ids.dedup();
        ids
    }
}

/// Declaration of a resource before it enters the graph.
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub(crate) logical_id: String,
    pub(crate) kind: ResourceKind,
    pub(crate) properties: Map<String, Value>,
    pub(crate) depends_on: Vec<NodeRef>,
}

impl ResourceSpec {
    /// Starts a declaration with the given logical id and kind.
    #[must_use]
    pub fn new(logical_id: impl Into<String>, kind: ResourceKind) -> Self {
        Self {
            logical_id: logical_id.into(),
            kind,
            properties: Map::new(),
            depends_on: Vec::new(),
        }
    }

    /// Sets a property.
    #[must_use]
    pub fn property(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        let _ = self.properties.insert(name.into(), value.into());
        self
    }

    /// Adds an explicit dependency that no property token expresses.
    #[must_use]
    pub fn depends_on(mut self, node: &NodeRef) -> Self {
        self.depends_on.push(node.clone());
        self
    }

    /// Returns the logical id being declared.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }
}

/// A resolved handle to a resource inside a specific graph.
///
/// Only [`crate::ResourceGraph`] hands these out, so holding one proves the
/// resource was declared in that graph.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub(crate) graph: GraphId,
    pub(crate) stack: StackId,
    pub(crate) index: NodeIndex,
    pub(crate) logical_id: String,
    pub(crate) kind: ResourceKind,
}

impl NodeRef {
    /// Returns the logical id of the referenced resource.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Returns the kind of the referenced resource.
    #[must_use]
    pub const fn kind(&self) -> ResourceKind {
        self.kind
    }

    /// Returns the stack that owns the referenced resource.
    #[must_use]
    pub const fn stack(&self) -> StackId {
        self.stack
    }

    /// Returns the graph the resource was declared in.
    #[must_use]
    pub const fn graph(&self) -> GraphId {
        self.graph
    }

    /// Token resolving to the resource's primary identifier.
    #[must_use]
    pub fn reference(&self) -> Value {
        json!({ "Ref": self.logical_id })
    }

    /// Token resolving to one attribute of the resource.
    #[must_use]
    pub fn attribute(&self, name: &str) -> Value {
        json!({ "Fn::GetAtt": [self.logical_id, name] })
    }
}

/// Returns the target of a token, if `value` is one.
#[must_use]
pub fn token_target(value: &Value) -> Option<&str> {
    let obj = value.as_object()?;
    if obj.len() != 1 {
        return None;
    }
    if let Some(Value::String(id)) = obj.get("Ref") {
        if id.starts_with("AWS::") {
            return None;
        }
        return Some(id);
    }
    match obj.get("Fn::GetAtt") {
        Some(Value::Array(parts)) => parts.first().and_then(Value::as_str),
        _ => None,
    }
}

/// Walks a JSON value and collects the target of every token.
pub fn collect_token_targets(value: &Value, out: &mut Vec<String>) {
    if let Some(target) = token_target(value) {
        out.push(target.to_string());
        return;
    }
    match value {
        Value::Array(items) => {
            for item in items {
                collect_token_targets(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_token_targets(item, out);
            }
        }
        _ => {}
    }
}
