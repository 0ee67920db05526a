//! The identity assumed by running tasks.
//!
//! One role serves as both the execution identity (pulling images, writing
//! logs) and the task identity. Its trust principal is fixed to the task
//! execution service. Policies can only be added, never replaced or
//! removed, so a grant made by one part of the topology cannot be
//! silently dropped by another.

use serde::Serialize;
use serde_json::{Value, json};
use stackline_common::constants;
use stackline_graph::{ResourceKind, ResourceSpec};

/// Managed policy granting log and telemetry access.
pub const LOGS_MANAGED_POLICY: &str = "CloudWatchFullAccess";

/// The platform's standard task execution policy.
pub const TASK_EXECUTION_MANAGED_POLICY: &str = "service-role/AmazonECSTaskExecutionRolePolicy";

/// One allow statement of an inline policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PolicyStatement {
    /// Actions granted.
    pub actions: Vec<String>,
    /// Resources the actions apply to.
    pub resources: Vec<String>,
}

impl PolicyStatement {
    /// Creates an allow statement.
    #[must_use]
    pub fn allow<A, R>(actions: A, resources: R) -> Self
    where
        A: IntoIterator,
        A::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            actions: actions.into_iter().map(Into::into).collect(),
            resources: resources.into_iter().map(Into::into).collect(),
        }
    }

    fn render(&self) -> Value {
        json!({
            "Effect": "Allow",
            "Action": self.actions,
            "Resource": self.resources,
        })
    }
}

/// The shared task identity.
#[derive(Debug, Clone)]
pub struct TaskRole {
    logical_id: String,
    managed_policies: Vec<String>,
    statements: Vec<PolicyStatement>,
}

impl TaskRole {
    /// Creates a role with no policies.
    #[must_use]
    pub fn new(logical_id: impl Into<String>) -> Self {
        Self {
            logical_id: logical_id.into(),
            managed_policies: Vec::new(),
            statements: Vec::new(),
        }
    }

    /// Creates the role every task of the compute topology assumes.
    ///
    /// Grants the log and task-execution managed policies plus unrestricted
    /// registry access.
    #[must_use]
    pub fn standard(logical_id: impl Into<String>) -> Self {
        let mut role = Self::new(logical_id);
        role.add_managed_policy(LOGS_MANAGED_POLICY);
        role.add_managed_policy(TASK_EXECUTION_MANAGED_POLICY);
        role.add_to_policy(PolicyStatement::allow(["ecr:*"], ["*"]));
        role
    }

    /// Returns the logical id of the role.
    #[must_use]
    pub fn logical_id(&self) -> &str {
        &self.logical_id
    }

    /// Returns the service allowed to assume the role.
    #[must_use]
    pub const fn principal(&self) -> &'static str {
        constants::TASK_EXECUTION_PRINCIPAL
    }

    /// Attaches a managed policy; attaching the same policy twice is a no-op.
    pub fn add_managed_policy(&mut self, name: impl Into<String>) {
        let name = name.into();
        if !self.managed_policies.contains(&name) {
            self.managed_policies.push(name);
        }
    }

    /// Appends an inline statement.
    pub fn add_to_policy(&mut self, statement: PolicyStatement) {
        if !self.statements.contains(&statement) {
            self.statements.push(statement);
        }
    }

    /// Returns the attached managed policy names.
    #[must_use]
    pub fn managed_policies(&self) -> &[String] {
        &self.managed_policies
    }

    /// Returns the inline statements.
    #[must_use]
    pub fn statements(&self) -> &[PolicyStatement] {
        &self.statements
    }

    /// Returns whether some statement grants `action` on every resource.
    #[must_use]
    pub fn grants_everywhere(&self, action: &str) -> bool {
        self.statements.iter().any(|s| {
            s.resources.iter().any(|r| r == "*")
                && s.actions.iter().any(|a| action_matches(a, action))
        })
    }

    /// Renders the role as a resource declaration.
    #[must_use]
    pub fn to_spec(&self) -> ResourceSpec {
        let managed: Vec<Value> = self
            .managed_policies
            .iter()
            .map(|name| {
                json!({
                    "Fn::Join": ["", [
                        "arn:",
                        { "Ref": "AWS::Partition" },
                        format!(":iam::aws:policy/{name}"),
                    ]]
                })
            })
            .collect();
        let mut spec = ResourceSpec::new(self.logical_id.clone(), ResourceKind::Role)
            .property(
                "AssumeRolePolicyDocument",
                json!({
                    "Version": "2012-10-17",
                    "Statement": [{
                        "Effect": "Allow",
                        "Principal": { "Service": self.principal() },
                        "Action": "sts:AssumeRole",
                    }],
                }),
            )
            .property("ManagedPolicyArns", managed);
        if !self.statements.is_empty() {
            let statements: Vec<Value> = self.statements.iter().map(PolicyStatement::render).collect();
            spec = spec.property(
                "Policies",
                json!([{
                    "PolicyName": format!("{}DefaultPolicy", self.logical_id),
                    "PolicyDocument": {
                        "Version": "2012-10-17",
                        "Statement": statements,
                    },
                }]),
            );
        }
        spec
    }
}

fn action_matches(pattern: &str, action: &str) -> bool {
    pattern == "*"
        || pattern == action
        || pattern
            .strip_suffix('*')
            .is_some_and(|prefix| action.starts_with(prefix))
}

#[cfg(test)]
mod tests {
    use stackline_graph::ResourceGraph;

    use super::*;

    #[test]
    fn standard_role_carries_registry_logs_and_execution_grants() {
        let role = TaskRole::standard("TaskRole");
        assert_eq!(
            role.managed_policies(),
            &[LOGS_MANAGED_POLICY.to_string(), TASK_EXECUTION_MANAGED_POLICY.to_string()]
        );
        assert!(role.grants_everywhere("ecr:GetAuthorizationToken"));
        assert!(role.grants_everywhere("ecr:BatchGetImage"));
        assert!(!role.grants_everywhere("s3:GetObject"));
    }

    #[test]
    fn policies_are_additive() {
        let mut role = TaskRole::standard("TaskRole");
        role.add_managed_policy(LOGS_MANAGED_POLICY);
        role.add_managed_policy("AmazonSSMReadOnlyAccess");
        role.add_to_policy(PolicyStatement::allow(["s3:GetObject"], ["arn:aws:s3:::bucket/*"]));
        assert_eq!(role.managed_policies().len(), 3);
        assert_eq!(role.statements().len(), 2);
        assert!(role.grants_everywhere("ecr:PutImage"));
    }

    #[test]
    fn trust_principal_is_task_execution_service() {
        let mut graph = ResourceGraph::new();
        let stack = graph.open_stack("S").expect("open");
        let node = graph
            .add_resource(stack, TaskRole::standard("TaskRole").to_spec())
            .expect("role");
        let role = graph.node(&node).expect("declared");
        let principal = &role.properties["AssumeRolePolicyDocument"]["Statement"][0]["Principal"];
        assert_eq!(principal, &json!({ "Service": "ecs-tasks.amazonaws.com" }));
        let arns = role.property("ManagedPolicyArns").and_then(Value::as_array).expect("arns");
        assert_eq!(arns.len(), 2);
        let statement = &role.properties["Policies"][0]["PolicyDocument"]["Statement"][0];
        assert_eq!(statement["Action"], json!(["ecr:*"]));
        assert_eq!(statement["Resource"], json!(["*"]));
    }

    #[test]
    fn action_patterns() {
        assert!(action_matches("ecr:*", "ecr:BatchGetImage"));
        assert!(action_matches("*", "logs:PutLogEvents"));
        assert!(!action_matches("ecr:Get*", "ecr:PutImage"));
    }
}
