//! Task definitions.
//!
//! A task definition is immutable: any change to its rendered form is a
//! new revision. The revision fingerprint is the digest of the rendered
//! properties, so an unchanged image and configuration always yield the
//! same revision.

use serde_json::{Map, Value, json};
use stackline_common::error::{Result, StacklineError};
use stackline_common::types::{CpuArchitecture, Sha256Hash};
use stackline_graph::{ResourceKind, ResourceSpec};
use stackline_image::hash;

use crate::capacity;

/// Name of the single container in the task.
pub const CONTAINER_NAME: &str = "web";

/// Retention periods, in days, a log group accepts.
pub const LOG_RETENTION_DAYS: [u32; 22] = [
    1, 3, 5, 7, 14, 30, 60, 90, 120, 150, 180, 365, 400, 545, 731, 1096, 1827, 2192, 2557, 2922,
    3288, 3653,
];

/// Checks a log retention period against [`LOG_RETENTION_DAYS`].
///
/// # Errors
///
/// Returns a configuration error naming the nearest accepted periods.
pub fn validate_log_retention(days: u32) -> Result<()> {
    if LOG_RETENTION_DAYS.contains(&days) {
        return Ok(());
    }
    let below = LOG_RETENTION_DAYS.iter().rev().find(|&&d| d < days);
    let above = LOG_RETENTION_DAYS.iter().find(|&&d| d > days);
    let nearest: Vec<String> = below.into_iter().chain(above).map(ToString::to_string).collect();
    Err(StacklineError::config(format!(
        "log retention of {days} days is not accepted (nearest: {})",
        nearest.join(", ")
    )))
}

/// Log shipping target of a container.
#[derive(Debug, Clone, PartialEq)]
pub struct LogTarget {
    /// Token or name of the log group.
    pub group: Value,
    /// Region of the log group.
    pub region: String,
    /// Prefix of each stream name.
    pub stream_prefix: String,
}

/// The container run by a task.
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    /// Container name.
    pub name: String,
    /// Image reference.
    pub image: Value,
    /// Port the container listens on; mapped to the same host port.
    pub port: u16,
    /// Where the container's output goes.
    pub logs: LogTarget,
}

impl ContainerSpec {
    fn render(&self) -> Value {
        json!({
            "Name": self.name,
            "Image": self.image,
            "Essential": true,
            "PortMappings": [{
                "ContainerPort": self.port,
                "HostPort": self.port,
                "Protocol": "tcp",
            }],
            "LogConfiguration": {
                "LogDriver": "awslogs",
                "Options": {
                    "awslogs-group": self.logs.group,
                    "awslogs-region": self.logs.region,
                    "awslogs-stream-prefix": self.logs.stream_prefix,
                },
            },
        })
    }
}

/// Declarative specification of one runnable unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskDefinitionSpec {
    /// Family grouping the revisions.
    pub family: String,
    /// CPU units.
    pub cpu: u32,
    /// Memory in MiB.
    pub memory_mib: u32,
    /// CPU architecture.
    pub architecture: CpuArchitecture,
    /// Token of the role used for execution and at runtime.
    pub role_arn: Value,
    /// The single container.
    pub container: ContainerSpec,
}

impl TaskDefinitionSpec {
    /// Checks the capacity profile against the platform table.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an unaccepted CPU/memory pair.
    pub fn validate(&self) -> Result<()> {
        capacity::validate(self.cpu, self.memory_mib, self.architecture)
    }

    /// Returns the host port the container maps.
    #[must_use]
    pub const fn host_port(&self) -> u16 {
        self.container.port
    }

    /// Renders the task definition properties.
    #[must_use]
    pub fn render(&self) -> Map<String, Value> {
        let mut props = Map::new();
        let _ = props.insert("Family".into(), json!(self.family));
        let _ = props.insert("Cpu".into(), json!(self.cpu.to_string()));
        let _ = props.insert("Memory".into(), json!(self.memory_mib.to_string()));
        let _ = props.insert("NetworkMode".into(), json!("awsvpc"));
        let _ = props.insert("RequiresCompatibilities".into(), json!(["FARGATE"]));
        let _ = props.insert(
            "RuntimePlatform".into(),
            json!({
                "CpuArchitecture": self.architecture.as_str(),
                "OperatingSystemFamily": "LINUX",
            }),
        );
        let _ = props.insert("ExecutionRoleArn".into(), self.role_arn.clone());
        let _ = props.insert("TaskRoleArn".into(), self.role_arn.clone());
        let _ = props.insert(
            "ContainerDefinitions".into(),
            json!([self.container.render()]),
        );
        props
    }

    /// Fingerprint of this revision.
    #[must_use]
    pub fn revision(&self) -> Sha256Hash {
        let rendered = Value::Object(self.render()).to_string();
        hash::hash_bytes(rendered.as_bytes())
    }

    /// Builds the resource declaration.
    #[must_use]
    pub fn to_spec(&self, logical_id: &str) -> ResourceSpec {
        self.render()
            .into_iter()
            .fold(
                ResourceSpec::new(logical_id, ResourceKind::TaskDefinition),
                |spec, (key, value)| spec.property(key, value),
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(image: &str) -> TaskDefinitionSpec {
        TaskDefinitionSpec {
            family: "InfraStackTaskDefinition".into(),
            cpu: 512,
            memory_mib: 1024,
            architecture: CpuArchitecture::Arm64,
            role_arn: json!({ "Fn::GetAtt": ["TaskRole", "Arn"] }),
            container: ContainerSpec {
                name: CONTAINER_NAME.into(),
                image: json!(image),
                port: 8000,
                logs: LogTarget {
                    group: json!({ "Ref": "TaskLogGroup" }),
                    region: "us-east-1".into(),
                    stream_prefix: "mcp-on-ecs".into(),
                },
            },
        }
    }

    #[test]
    fn render_describes_arm64_fargate_task() {
        let props = spec("repo:abc").render();
        assert_eq!(props["Cpu"], json!("512"));
        assert_eq!(props["Memory"], json!("1024"));
        assert_eq!(props["RuntimePlatform"]["CpuArchitecture"], json!("ARM64"));
        let container = &props["ContainerDefinitions"][0];
        assert_eq!(container["PortMappings"][0]["ContainerPort"], json!(8000));
        assert_eq!(container["PortMappings"][0]["HostPort"], json!(8000));
        assert_eq!(
            container["LogConfiguration"]["Options"]["awslogs-stream-prefix"],
            json!("mcp-on-ecs")
        );
        assert_eq!(props["ExecutionRoleArn"], props["TaskRoleArn"]);
    }

    #[test]
    fn revision_is_stable_and_tracks_changes() {
        assert_eq!(spec("repo:abc").revision(), spec("repo:abc").revision());
        assert_ne!(spec("repo:abc").revision(), spec("repo:def").revision());

        let mut bigger = spec("repo:abc");
        bigger.memory_mib = 2048;
        assert_ne!(bigger.revision(), spec("repo:abc").revision());
    }

    #[test]
    fn validate_rejects_unaccepted_capacity() {
        let mut task = spec("repo:abc");
        assert!(task.validate().is_ok());
        task.memory_mib = 512;
        assert!(task.validate().is_err());
    }

    #[test]
    fn log_retention_accepts_only_listed_periods() {
        assert!(validate_log_retention(1).is_ok());
        assert!(validate_log_retention(14).is_ok());
        assert!(validate_log_retention(3653).is_ok());
        let msg = validate_log_retention(2).unwrap_err().to_string();
        assert!(msg.contains("nearest: 1, 3"), "got: {msg}");
        assert!(validate_log_retention(0).is_err());
        assert!(validate_log_retention(4000).is_err());
    }
}
