//! Compute topology declaration.

use serde_json::{Value, json};
use stackline_common::config::{ComputeConfig, EnvironmentConfig, StacklineConfig};
use stackline_common::constants;
use stackline_common::error::{Result, StacklineError};
use stackline_graph::{NodeRef, ResourceGraph, ResourceKind, ResourceSpec, StackId, Topology};
use stackline_image::{BuildContext, ImageAsset};
use stackline_network::NetworkHandle;

use crate::capacity;
use crate::health::HealthCheck;
use crate::role::TaskRole;
use crate::rollout::{Revision, Rollout};
use crate::service::{DeploymentPolicy, PortBinding};
use crate::task::{self, CONTAINER_NAME, ContainerSpec, LogTarget, TaskDefinitionSpec};

/// Values and handles the compute topology exposes.
#[derive(Debug, Clone)]
pub struct ComputeOutputs {
    /// Token resolving to the load balancer's public DNS name.
    pub load_balancer_dns: Value,
    /// Image reference as written into the task definition.
    pub image_uri: Value,
    /// The packaged image.
    pub image: ImageAsset,
    /// The declared task definition.
    pub task_definition: TaskDefinitionSpec,
    /// Revision the service is configured to run.
    pub revision: Revision,
    /// Target group health check.
    pub health_check: HealthCheck,
    /// Listener and container ports.
    pub ports: PortBinding,
    /// Deployment safety settings of the service.
    pub deployment: DeploymentPolicy,
    /// The container cluster.
    pub cluster: NodeRef,
    /// The task identity.
    pub role: NodeRef,
    /// The load balancer.
    pub load_balancer: NodeRef,
    /// The long-running service.
    pub service: NodeRef,
}

impl ComputeOutputs {
    /// Prepares the rollout of this revision over `previous`.
    #[must_use]
    pub fn rollout(&self, previous: Option<Revision>) -> Rollout {
        Rollout::new(
            self.health_check.clone(),
            self.deployment.rollback,
            previous,
            self.revision.clone(),
        )
    }
}

/// The load-balanced container service.
#[derive(Debug, Clone)]
pub struct ComputeTopology {
    stack_name: String,
    config: ComputeConfig,
    environment: EnvironmentConfig,
}

impl ComputeTopology {
    /// Creates a compute topology for the given settings.
    #[must_use]
    pub fn new(
        stack_name: impl Into<String>,
        config: &ComputeConfig,
        environment: &EnvironmentConfig,
    ) -> Self {
        Self {
            stack_name: stack_name.into(),
            config: config.clone(),
            environment: environment.clone(),
        }
    }

    /// Creates the standard compute stack from a full configuration.
    #[must_use]
    pub fn from_config(config: &StacklineConfig) -> Self {
        Self::new(
            constants::COMPUTE_STACK_NAME,
            &config.compute,
            &config.environment,
        )
    }

    /// Checks everything that can be checked without touching the graph.
    fn validate(&self) -> Result<(PortBinding, HealthCheck)> {
        let config = &self.config;
        capacity::validate(config.cpu, config.memory_mib, config.architecture)?;
        if config.desired_count == 0 {
            return Err(StacklineError::config("desired task count must be at least 1"));
        }
        task::validate_log_retention(config.log_retention_days)?;
        let ports = PortBinding::from_config(config)?;
        let health = HealthCheck::from_config(&config.health_check)?;
        health.verify_contract(&config.contract)?;
        Ok((ports, health))
    }

    fn image_reference(image: &ImageAsset) -> Value {
        if image.is_account_resolved() {
            json!(image.uri)
        } else {
            json!({ "Fn::Sub": image.uri })
        }
    }
}

impl Topology for ComputeTopology {
    type Input = NetworkHandle;
    type Output = ComputeOutputs;

    fn stack_name(&self) -> &str {
        &self.stack_name
    }

    #[allow(clippy::too_many_lines)]
    fn build(
        self,
        graph: &mut ResourceGraph,
        stack: StackId,
        network: NetworkHandle,
    ) -> Result<ComputeOutputs> {
        graph.require_sealed(network.graph(), network.stack())?;
        let (ports, health) = self.validate()?;
        let config = &self.config;

        let context = BuildContext::open(&config.build_context, &config.exclude)?;
        let image = ImageAsset::resolve(&context, &config.repository, &self.environment)?;
        tracing::info!(
            stack = %self.stack_name,
            cpu = config.cpu,
            memory_mib = config.memory_mib,
            architecture = %config.architecture,
            "declaring compute"
        );

        let log_group = graph.add_resource(
            stack,
            ResourceSpec::new("TaskLogGroup", ResourceKind::LogGroup)
                .property("LogGroupName", config.log_group_name.clone())
                .property("RetentionInDays", config.log_retention_days),
        )?;
        let image_uri = Self::image_reference(&image);
        let _ = graph.add_resource(
            stack,
            ResourceSpec::new("ContainerImage", ResourceKind::ContainerImageAsset)
                .property("Repository", image.repository.clone())
                .property("Tag", image.tag())
                .property("ImageUri", image.uri.clone())
                .property("Context", image.context.display().to_string())
                .property("Files", image.file_count),
        )?;
        let cluster = graph.add_resource(
            stack,
            ResourceSpec::new("Cluster", ResourceKind::Cluster)
                .property("ClusterName", config.cluster_name.clone())
                .depends_on(network.vpc()),
        )?;
        let role = graph.add_resource(stack, TaskRole::standard("TaskRole").to_spec())?;

        let task_definition = TaskDefinitionSpec {
            family: format!("{}TaskDefinition", self.stack_name),
            cpu: config.cpu,
            memory_mib: config.memory_mib,
            architecture: config.architecture,
            role_arn: role.attribute("Arn"),
            container: ContainerSpec {
                name: CONTAINER_NAME.to_string(),
                image: image_uri.clone(),
                port: ports.container,
                logs: LogTarget {
                    group: log_group.reference(),
                    region: self.environment.region.clone(),
                    stream_prefix: config.log_stream_prefix.clone(),
                },
            },
        };
        let task = graph.add_resource(stack, task_definition.to_spec("TaskDefinition"))?;

        let lb_sg = graph.add_resource(
            stack,
            ResourceSpec::new("LoadBalancerSecurityGroup", ResourceKind::SecurityGroup)
                .property("GroupDescription", "Public access to the load balancer listener")
                .property("VpcId", network.vpc_id())
                .property(
                    "SecurityGroupIngress",
                    json!([{
                        "IpProtocol": "tcp",
                        "FromPort": ports.listener,
                        "ToPort": ports.listener,
                        "CidrIp": "0.0.0.0/0",
                    }]),
                ),
        )?;
        let service_sg = graph.add_resource(
            stack,
            ResourceSpec::new("ServiceSecurityGroup", ResourceKind::SecurityGroup)
                .property("GroupDescription", "Load balancer traffic to the service tasks")
                .property("VpcId", network.vpc_id())
                .property(
                    "SecurityGroupIngress",
                    json!([{
                        "IpProtocol": "tcp",
                        "FromPort": ports.container,
                        "ToPort": ports.container,
                        "SourceSecurityGroupId": lb_sg.attribute("GroupId"),
                    }]),
                ),
        )?;

        let mut lb_spec = ResourceSpec::new("LoadBalancer", ResourceKind::LoadBalancer)
            .property("Type", "application")
            .property("Scheme", "internet-facing")
            .property("Subnets", network.public_subnet_ids())
            .property("SecurityGroups", json!([lb_sg.attribute("GroupId")]));
        for subnet in network.public_subnets() {
            lb_spec = lb_spec.depends_on(&subnet.default_route);
        }
        let load_balancer = graph.add_resource(stack, lb_spec)?;

        let mut tg_spec = ResourceSpec::new("TargetGroup", ResourceKind::TargetGroup)
            .property("Port", ports.container)
            .property("Protocol", config.protocol.as_str())
            .property("TargetType", "ip")
            .property("VpcId", network.vpc_id());
        for (name, value) in health.target_group_properties() {
            tg_spec = tg_spec.property(name, value);
        }
        let target_group = graph.add_resource(stack, tg_spec)?;

        let listener = graph.add_resource(
            stack,
            ResourceSpec::new("Listener", ResourceKind::Listener)
                .property("LoadBalancerArn", load_balancer.reference())
                .property("Port", ports.listener)
                .property("Protocol", config.protocol.as_str())
                .property(
                    "DefaultActions",
                    json!([{ "Type": "forward", "TargetGroupArn": target_group.reference() }]),
                ),
        )?;

        let deployment = DeploymentPolicy::rolling(config.rollback);
        let mut service_spec = ResourceSpec::new("Service", ResourceKind::Service)
            .property("Cluster", cluster.reference())
            .property("TaskDefinition", task.reference())
            .property("DesiredCount", config.desired_count)
            .property("LaunchType", "FARGATE")
            .property("DeploymentConfiguration", deployment.render())
            .property("HealthCheckGracePeriodSeconds", health.time_to_healthy().as_secs())
            .property(
                "NetworkConfiguration",
                json!({
                    "AwsvpcConfiguration": {
                        "AssignPublicIp": "DISABLED",
                        "Subnets": network.private_subnet_ids(),
                        "SecurityGroups": [service_sg.attribute("GroupId")],
                    },
                }),
            )
            .property(
                "LoadBalancers",
                json!([{
                    "ContainerName": CONTAINER_NAME,
                    "ContainerPort": ports.container,
                    "TargetGroupArn": target_group.reference(),
                }]),
            )
            .depends_on(&listener);
        for subnet in network.private_subnets() {
            service_spec = service_spec.depends_on(&subnet.default_route);
        }
        let service = graph.add_resource(stack, service_spec)?;

        let load_balancer_dns = load_balancer.attribute("DNSName");
        graph.add_output(
            stack,
            constants::OUTPUT_LOAD_BALANCER_DNS,
            load_balancer_dns.clone(),
            Some("Public address of the service".to_string()),
        )?;
        graph.add_output(
            stack,
            constants::OUTPUT_IMAGE_URI,
            image_uri.clone(),
            Some("Content-addressed location of the deployed image".to_string()),
        )?;

        let revision = Revision {
            fingerprint: task_definition.revision(),
            desired_count: config.desired_count,
        };
        tracing::info!(
            revision = %revision.fingerprint.short(12),
            image = %image.uri,
            "compute declared"
        );

        Ok(ComputeOutputs {
            load_balancer_dns,
            image_uri,
            image,
            task_definition,
            revision,
            health_check: health,
            ports,
            deployment,
            cluster,
            role,
            load_balancer,
            service,
        })
    }
}

#[cfg(test)]
mod tests {
    use stackline_graph::Resource;
    use stackline_network::NetworkTopology;

    use super::*;

    struct Fixture {
        dir: tempfile::TempDir,
        config: StacklineConfig,
    }

    fn fixture() -> Fixture {
        let dir = tempfile::tempdir().expect("failed to create tempdir");
        std::fs::write(dir.path().join("server.py"), "print('sse')").expect("write");
        std::fs::write(dir.path().join("Dockerfile"), "FROM python:3.12").expect("write");
        let mut config = StacklineConfig::default();
        config.compute.build_context = dir.path().to_path_buf();
        Fixture { dir, config }
    }

    fn sealed_network(graph: &mut ResourceGraph, config: &StacklineConfig) -> NetworkHandle {
        let topology = NetworkTopology::from_config(config);
        let stack = graph.open_stack(topology.stack_name().to_string()).expect("open");
        let handle = topology.build(graph, stack, ()).expect("network");
        graph.seal_stack(stack).expect("seal");
        handle
    }

    fn build_compute(
        graph: &mut ResourceGraph,
        config: &StacklineConfig,
        network: NetworkHandle,
    ) -> Result<ComputeOutputs> {
        let topology = ComputeTopology::from_config(config);
        let stack = graph.open_stack(topology.stack_name().to_string()).expect("open");
        topology.build(graph, stack, network)
    }

    fn declared<'g>(graph: &'g ResourceGraph, logical_id: &str) -> &'g Resource {
        let stack = graph
            .find_stack(constants::COMPUTE_STACK_NAME)
            .expect("compute stack");
        graph.resource(stack, logical_id).expect("declared")
    }

    fn count(graph: &ResourceGraph, kind: ResourceKind) -> usize {
        graph.resources().filter(|r| r.kind == kind).count()
    }

    #[test]
    fn declares_load_balanced_service() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let outputs = build_compute(&mut graph, &fx.config, network).expect("compute");

        for kind in [
            ResourceKind::LogGroup,
            ResourceKind::Cluster,
            ResourceKind::Role,
            ResourceKind::TaskDefinition,
            ResourceKind::LoadBalancer,
            ResourceKind::TargetGroup,
            ResourceKind::Listener,
            ResourceKind::Service,
        ] {
            assert_eq!(count(&graph, kind), 1, "{kind}");
        }
        let service = graph.node(&outputs.service).expect("service");
        assert_eq!(service.property("DesiredCount"), Some(&json!(1)));
        assert_eq!(
            service.properties["DeploymentConfiguration"]["DeploymentCircuitBreaker"],
            json!({ "Enable": true, "Rollback": true })
        );
        assert_eq!(outputs.load_balancer_dns, json!({ "Fn::GetAtt": ["LoadBalancer", "DNSName"] }));
    }

    #[test]
    fn listener_faces_container_host_port() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let _ = build_compute(&mut graph, &fx.config, network).expect("compute");

        let listener = declared(&graph, "Listener");
        let task = declared(&graph, "TaskDefinition");
        let mapping = &task.properties["ContainerDefinitions"][0]["PortMappings"][0];
        assert_eq!(listener.property("Port"), Some(&json!(8000)));
        assert_eq!(listener.property("Port"), Some(&mapping["HostPort"]));
        assert_eq!(listener.property("Protocol"), Some(&json!("HTTP")));
    }

    #[test]
    fn target_group_polls_liveness_contract() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let _ = build_compute(&mut graph, &fx.config, network).expect("compute");

        let tg = declared(&graph, "TargetGroup");
        assert_eq!(tg.property("HealthCheckPath"), Some(&json!("/sse")));
        assert_eq!(tg.property("HealthCheckIntervalSeconds"), Some(&json!(30)));
        assert_eq!(tg.property("HealthCheckTimeoutSeconds"), Some(&json!(5)));
        assert_eq!(tg.property("HealthyThresholdCount"), Some(&json!(2)));
        assert_eq!(tg.property("UnhealthyThresholdCount"), Some(&json!(2)));
        assert_eq!(tg.property("Matcher"), Some(&json!({ "HttpCode": "307" })));
    }

    #[test]
    fn task_runs_arm64_with_reference_capacity() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let outputs = build_compute(&mut graph, &fx.config, network).expect("compute");

        let task = declared(&graph, "TaskDefinition");
        assert_eq!(task.property("Cpu"), Some(&json!("512")));
        assert_eq!(task.property("Memory"), Some(&json!("1024")));
        assert_eq!(task.properties["RuntimePlatform"]["CpuArchitecture"], json!("ARM64"));
        assert_eq!(outputs.revision.fingerprint, outputs.task_definition.revision());
    }

    #[test]
    fn service_and_load_balancer_use_network_tiers() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let public = Value::Array(network.public_subnet_ids());
        let private = Value::Array(network.private_subnet_ids());
        let _ = build_compute(&mut graph, &fx.config, network).expect("compute");

        let lb = declared(&graph, "LoadBalancer");
        assert_eq!(lb.property("Subnets"), Some(&public));
        assert_eq!(lb.property("Scheme"), Some(&json!("internet-facing")));
        let service = declared(&graph, "Service");
        assert_eq!(
            service.properties["NetworkConfiguration"]["AwsvpcConfiguration"]["Subnets"],
            private
        );
    }

    #[test]
    fn unsealed_network_is_an_ordering_error_before_any_resource() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let topology = NetworkTopology::from_config(&fx.config);
        let net_stack = graph.open_stack("VpcStack").expect("open");
        let network = topology.build(&mut graph, net_stack, ()).expect("network");

        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Ordering { .. }), "got: {err}");
        assert_eq!(count(&graph, ResourceKind::Cluster), 0);
        assert_eq!(count(&graph, ResourceKind::Role), 0);
    }

    #[test]
    fn foreign_network_handle_is_rejected() {
        let fx = fixture();
        let mut other = ResourceGraph::new();
        let network = sealed_network(&mut other, &fx.config);

        let mut graph = ResourceGraph::new();
        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Ordering { .. }));
        assert!(graph.is_empty());
    }

    #[test]
    fn invalid_capacity_fails_before_any_resource() {
        let mut fx = fixture();
        fx.config.compute.memory_mib = 768;
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let before = graph.len();
        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Config { .. }));
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn unaccepted_log_retention_fails_before_any_resource() {
        let mut fx = fixture();
        fx.config.compute.log_retention_days = 2;
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let before = graph.len();
        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Config { .. }), "got: {err}");
        assert_eq!(graph.len(), before);
    }

    #[test]
    fn changed_liveness_endpoint_is_an_invariant_violation() {
        let mut fx = fixture();
        fx.config.compute.contract.health_path = "/health".into();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Invariant { .. }), "got: {err}");
    }

    #[test]
    fn missing_build_context_is_a_configuration_error() {
        let mut fx = fixture();
        fx.config.compute.build_context = fx.dir.path().join("missing");
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let err = build_compute(&mut graph, &fx.config, network).unwrap_err();
        assert!(matches!(err, StacklineError::Config { .. }));
        assert_eq!(count(&graph, ResourceKind::Cluster), 0);
    }

    #[test]
    fn unresolved_account_is_substituted_at_deploy_time() {
        let fx = fixture();
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &fx.config);
        let outputs = build_compute(&mut graph, &fx.config, network).expect("compute");
        let uri = outputs.image_uri["Fn::Sub"].as_str().expect("sub");
        assert!(uri.starts_with("${AWS::AccountId}.dkr.ecr.us-east-1.amazonaws.com/"));

        let mut resolved = fixture();
        resolved.config.environment.account = Some("111122223333".into());
        let mut graph = ResourceGraph::new();
        let network = sealed_network(&mut graph, &resolved.config);
        let outputs = build_compute(&mut graph, &resolved.config, network).expect("compute");
        assert!(outputs.image_uri.as_str().is_some_and(|u| u.starts_with("111122223333.")));
    }
}
