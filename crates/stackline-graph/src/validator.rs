//! Static validation of a resource graph before synthesis.
//!
//! Checks for unsealed stacks, dangling references and cycles so that a
//! malformed declaration fails before anything is rendered.

use stackline_common::error::{Result, StacklineError};

use crate::graph::{ResourceGraph, StackState};
use crate::resource::collect_token_targets;

/// Validates a graph for synthesis.
///
/// # Checks performed
///
/// 1. Every live stack is sealed.
/// 2. Every token in a property or output resolves to a declared resource.
/// 3. The graph is acyclic.
///
/// # Errors
///
/// Returns an error naming the offending stack or resource if any check fails.
pub fn validate(graph: &ResourceGraph) -> Result<()> {
    tracing::info!(resources = graph.len(), "validating resource graph");
    check_stacks_sealed(graph)?;
    check_references(graph)?;
    check_outputs(graph)?;
    let _ = graph.deployment_order()?;
    Ok(())
}

fn check_stacks_sealed(graph: &ResourceGraph) -> Result<()> {
    for stack in graph.stacks() {
        if graph.stack_state(stack) != Some(StackState::Sealed) {
            return Err(StacklineError::ordering(format!(
                "stack \"{}\" was never sealed",
                graph.stack_name(stack).unwrap_or_default()
            )));
        }
    }
    Ok(())
}

fn check_references(graph: &ResourceGraph) -> Result<()> {
    for resource in graph.resources() {
        for target in resource.referenced_ids() {
            let resolved = resource
                .target_stack(&target)
                .and_then(|stack| graph.resource(stack, &target));
            if resolved.is_none() {
                return Err(StacklineError::NotFound {
                    kind: "resource",
                    id: format!(
                        "\"{target}\" referenced by {} \"{}\"",
                        resource.kind, resource.logical_id
                    ),
                });
            }
        }
        for dep in &resource.depends_on {
            if graph.resource(resource.stack, dep).is_none() {
                return Err(StacklineError::NotFound {
                    kind: "resource",
                    id: format!("\"{dep}\" required by \"{}\"", resource.logical_id),
                });
            }
        }
    }
    Ok(())
}

fn check_outputs(graph: &ResourceGraph) -> Result<()> {
    for stack in graph.stacks() {
        for output in graph.outputs(stack) {
            let mut targets = Vec::new();
            collect_token_targets(&output.value, &mut targets);
            let missing = targets.iter().find(|t| {
                output
                    .links
                    .get(t.as_str())
                    .and_then(|&owner| graph.resource(owner, t))
                    .is_none()
            });
            if let Some(missing) = missing {
                return Err(StacklineError::NotFound {
                    kind: "resource",
                    id: format!("\"{missing}\" referenced by output \"{}\"", output.name),
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::resource::{ResourceKind, ResourceSpec};

    #[test]
    fn validate_empty_graph_succeeds() {
        assert!(validate(&ResourceGraph::new()).is_ok());
    }

    #[test]
    fn validate_sealed_graph_succeeds() {
        let mut graph = ResourceGraph::new();
        let stack = graph.open_stack("Net").expect("open");
        let vpc = graph
            .add_resource(stack, ResourceSpec::new("Vpc", ResourceKind::Vpc))
            .expect("vpc");
        graph
            .add_output(stack, "VpcId", vpc.reference(), None)
            .expect("output");
        graph.seal_stack(stack).expect("seal");
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn validate_rejects_open_stack() {
        let mut graph = ResourceGraph::new();
        let _ = graph.open_stack("Net").expect("open");
        let msg = validate(&graph).unwrap_err().to_string();
        assert!(msg.contains("never sealed"), "got: {msg}");
    }

    #[test]
    fn validate_ignores_discarded_stack() {
        let mut graph = ResourceGraph::new();
        let stack = graph.open_stack("App").expect("open");
        let _ = graph
            .add_resource(stack, ResourceSpec::new("Cluster", ResourceKind::Cluster))
            .expect("cluster");
        graph.discard_stack(stack).expect("discard");
        assert!(validate(&graph).is_ok());
    }

    #[test]
    fn add_output_rejects_dangling_token() {
        let mut graph = ResourceGraph::new();
        let stack = graph.open_stack("Net").expect("open");
        let result = graph.add_output(stack, "VpcId", json!({ "Ref": "Missing" }), None);
        assert!(matches!(result, Err(StacklineError::NotFound { .. })));
    }
}
