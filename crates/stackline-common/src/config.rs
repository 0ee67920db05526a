//! Configuration model for a Stackline composition.
//!
//! Every section carries `#[serde(default)]`, so a configuration file only
//! needs to name the values it overrides.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants;
use crate::error::{Result, StacklineError};
use crate::types::{CpuArchitecture, Protocol};

/// Root configuration for a composition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct StacklineConfig {
    /// Target account and region.
    pub environment: EnvironmentConfig,
    /// Network topology settings.
    pub network: NetworkConfig,
    /// Compute topology settings.
    pub compute: ComputeConfig,
}

impl StacklineConfig {
    /// Loads a configuration file, choosing the format by extension.
    ///
    /// `.yaml` and `.yml` files are parsed as YAML, anything else as JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        tracing::info!(path = %path.display(), "loading configuration");
        let content = std::fs::read_to_string(path).map_err(|e| StacklineError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let is_yaml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml"));
        let config = if is_yaml {
            serde_yaml::from_str(&content)?
        } else {
            serde_json::from_str(&content)?
        };
        Ok(config)
    }
}

/// Deployment target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Account id; left unresolved in the templates when absent.
    pub account: Option<String>,
    /// Region name.
    pub region: String,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            account: None,
            region: constants::DEFAULT_REGION.to_string(),
        }
    }
}

/// Settings of the isolated virtual network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    /// Address block of the network, e.g. `10.0.0.0/16`.
    pub cidr: String,
    /// Number of availability zones to spread subnets across.
    pub max_azs: u8,
    /// Prefix length of every subnet.
    pub subnet_mask: u8,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            cidr: constants::DEFAULT_VPC_CIDR.to_string(),
            max_azs: constants::DEFAULT_MAX_AZS,
            subnet_mask: constants::DEFAULT_SUBNET_MASK,
        }
    }
}

/// The network contract the packaged application promises to honor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppContract {
    /// TCP port the application listens on.
    pub port: u16,
    /// Liveness endpoint path.
    pub health_path: String,
    /// Status code returned by the liveness endpoint when healthy.
    pub healthy_status: u16,
}

impl Default for AppContract {
    fn default() -> Self {
        Self {
            port: constants::DEFAULT_CONTAINER_PORT,
            health_path: constants::DEFAULT_HEALTH_PATH.to_string(),
            healthy_status: constants::DEFAULT_HEALTHY_STATUS,
        }
    }
}

/// Target group health-check settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthCheckConfig {
    /// Path polled by the load balancer.
    pub path: String,
    /// Seconds between checks.
    pub interval_secs: u32,
    /// Seconds before a check times out.
    pub timeout_secs: u32,
    /// Consecutive successes before a target is healthy.
    pub healthy_threshold: u32,
    /// Consecutive failures before a target is unhealthy.
    pub unhealthy_threshold: u32,
    /// Matcher for healthy response codes (`"307"`, `"200-299"`, `"200,302"`).
    pub healthy_http_codes: String,
}

impl Default for HealthCheckConfig {
    fn default() -> Self {
        Self {
            path: constants::DEFAULT_HEALTH_PATH.to_string(),
            interval_secs: constants::DEFAULT_HEALTH_INTERVAL_SECS,
            timeout_secs: constants::DEFAULT_HEALTH_TIMEOUT_SECS,
            healthy_threshold: constants::DEFAULT_HEALTHY_THRESHOLD,
            unhealthy_threshold: constants::DEFAULT_UNHEALTHY_THRESHOLD,
            healthy_http_codes: constants::DEFAULT_HEALTHY_STATUS.to_string(),
        }
    }
}

/// Settings of the container service and its load balancer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComputeConfig {
    /// Local source tree packaged into the container image.
    pub build_context: PathBuf,
    /// Paths excluded from the packaged image.
    pub exclude: Vec<String>,
    /// Repository receiving the packaged image.
    pub repository: String,
    /// Name of the container cluster.
    pub cluster_name: String,
    /// Name of the container log group.
    pub log_group_name: String,
    /// Prefix of the container log streams.
    pub log_stream_prefix: String,
    /// Log retention in days.
    pub log_retention_days: u32,
    /// Task CPU units.
    pub cpu: u32,
    /// Task memory in MiB.
    pub memory_mib: u32,
    /// Task CPU architecture.
    pub architecture: CpuArchitecture,
    /// Number of running task instances.
    pub desired_count: u32,
    /// Port mapped on the container (container and host side).
    pub container_port: u16,
    /// Port the load balancer listens on.
    pub listener_port: u16,
    /// Listener protocol.
    pub protocol: Protocol,
    /// Contract of the packaged application.
    pub contract: AppContract,
    /// Target group health check.
    pub health_check: HealthCheckConfig,
    /// Whether failed deployments roll back automatically.
    pub rollback: bool,
}

impl Default for ComputeConfig {
    fn default() -> Self {
        Self {
            build_context: PathBuf::from("."),
            exclude: constants::DEFAULT_BUILD_EXCLUDES
                .iter()
                .map(|s| (*s).to_string())
                .collect(),
            repository: constants::DEFAULT_ASSET_REPOSITORY.to_string(),
            cluster_name: constants::DEFAULT_CLUSTER_NAME.to_string(),
            log_group_name: constants::DEFAULT_LOG_GROUP_NAME.to_string(),
            log_stream_prefix: constants::DEFAULT_LOG_STREAM_PREFIX.to_string(),
            log_retention_days: constants::DEFAULT_LOG_RETENTION_DAYS,
            cpu: constants::DEFAULT_TASK_CPU,
            memory_mib: constants::DEFAULT_TASK_MEMORY_MIB,
            architecture: CpuArchitecture::Arm64,
            desired_count: constants::DEFAULT_DESIRED_COUNT,
            container_port: constants::DEFAULT_CONTAINER_PORT,
            listener_port: constants::DEFAULT_CONTAINER_PORT,
            protocol: Protocol::Http,
            contract: AppContract::default(),
            health_check: HealthCheckConfig::default(),
            rollback: true,
        }
    }
}
