//! System-wide constants and defaults.
//!
//! The defaults describe the reference deployment: a two-AZ network and a
//! single ARM64 task serving port 8000, health-checked on `/sse`.

/// Application name used in CLI output and generated names.
pub const APP_NAME: &str = "stackline";

/// Default output directory for the synthesized cloud assembly.
pub const DEFAULT_OUT_DIR: &str = "stackline.out";

/// Default configuration file looked up by the CLI.
pub const DEFAULT_CONFIG_FILE: &str = "stackline.json";

/// SHA-256 digest length in hex characters.
pub const SHA256_HEX_LENGTH: usize = 64;

/// Default deployment region.
pub const DEFAULT_REGION: &str = "us-east-1";

/// Default address block of the virtual network.
pub const DEFAULT_VPC_CIDR: &str = "10.0.0.0/16";

/// Default number of availability zones.
pub const DEFAULT_MAX_AZS: u8 = 2;

/// Default prefix length of every subnet.
pub const DEFAULT_SUBNET_MASK: u8 = 24;

/// Port the packaged application listens on.
pub const DEFAULT_CONTAINER_PORT: u16 = 8000;

/// Liveness endpoint served by the packaged application.
pub const DEFAULT_HEALTH_PATH: &str = "/sse";

/// Status code the application returns on its liveness endpoint.
pub const DEFAULT_HEALTHY_STATUS: u16 = 307;

/// Seconds between two health checks.
pub const DEFAULT_HEALTH_INTERVAL_SECS: u32 = 30;

/// Seconds before a single health check times out.
pub const DEFAULT_HEALTH_TIMEOUT_SECS: u32 = 5;

/// Consecutive successes required to mark a target healthy.
pub const DEFAULT_HEALTHY_THRESHOLD: u32 = 2;

/// Consecutive failures required to mark a target unhealthy.
pub const DEFAULT_UNHEALTHY_THRESHOLD: u32 = 2;

/// Task CPU units.
pub const DEFAULT_TASK_CPU: u32 = 512;

/// Task memory in MiB.
pub const DEFAULT_TASK_MEMORY_MIB: u32 = 1024;

/// Number of running task instances.
pub const DEFAULT_DESIRED_COUNT: u32 = 1;

/// Retention of the container log group, in days.
pub const DEFAULT_LOG_RETENTION_DAYS: u32 = 1;

/// Name of the container cluster.
pub const DEFAULT_CLUSTER_NAME: &str = "mcp-on-ecs-cluster";

/// Name of the container log group.
pub const DEFAULT_LOG_GROUP_NAME: &str = "/ecs/mcp-on-ecs";

/// Prefix of the container log streams.
pub const DEFAULT_LOG_STREAM_PREFIX: &str = "mcp-on-ecs";

/// Repository that receives packaged container assets.
pub const DEFAULT_ASSET_REPOSITORY: &str = "stackline-container-assets";

/// Paths never included in the packaged image.
pub const DEFAULT_BUILD_EXCLUDES: &[&str] = &[
    "cdk.out",
    "infra/cdk.out",
    ".git",
    "node_modules",
    "infra/node_modules",
    "target",
    DEFAULT_OUT_DIR,
];

/// Service principal allowed to assume the task role.
pub const TASK_EXECUTION_PRINCIPAL: &str = "ecs-tasks.amazonaws.com";

/// Name of the network stack in the standard composition.
pub const NETWORK_STACK_NAME: &str = "VpcStack";

/// Name of the compute stack in the standard composition.
pub const COMPUTE_STACK_NAME: &str = "InfraStack";

/// Output carrying the load balancer's public DNS name.
pub const OUTPUT_LOAD_BALANCER_DNS: &str = "LoadBalancerDNS";

/// Output carrying the resolved image URI.
pub const OUTPUT_IMAGE_URI: &str = "ImageURI";

/// Output carrying the network identifier.
pub const OUTPUT_VPC_ID: &str = "VpcId";
