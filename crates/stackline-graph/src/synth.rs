//! Rendering of a resource graph into a cloud assembly.
//!
//! Synthesis is a pure function over the graph: one template per stack,
//! plus a manifest carrying stack order, stack dependencies and assembly
//! metadata such as container image assets. A token that crosses stacks is
//! rewritten into an import of a value the producing stack exports.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{Map, Value, json};
use stackline_common::error::{Result, StacklineError};

use crate::graph::{ResourceGraph, StackId};
use crate::resource::token_target;
use crate::validator;

/// Manifest format version.
pub const ASSEMBLY_VERSION: &str = "1.0.0";

/// A synthesized template of one stack.
#[derive(Debug, Clone)]
pub struct StackTemplate {
    /// Stack name.
    pub name: String,
    /// Rendered template document.
    pub template: Value,
}

impl StackTemplate {
    /// Returns the file name the template is written to.
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("{}.template.json", self.name)
    }
}

/// One stack entry of the manifest.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestStack {
    /// Stack name.
    pub name: String,
    /// Template file relative to the assembly directory.
    pub template_file: String,
    /// Names of the stacks that must be deployed first.
    pub dependencies: Vec<String>,
}

/// Assembly manifest.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    /// Manifest format version.
    pub version: String,
    /// Stacks in deployment order.
    pub stacks: Vec<ManifestStack>,
    /// Metadata resources (image assets), keyed by `<stack>/<logical id>`.
    pub assets: BTreeMap<String, Value>,
}

/// The full synthesis result.
#[derive(Debug, Clone)]
pub struct CloudAssembly {
    /// Templates in deployment order.
    pub stacks: Vec<StackTemplate>,
    /// Assembly manifest.
    pub manifest: Manifest,
}

impl CloudAssembly {
    /// Returns the template of a stack by name.
    #[must_use]
    pub fn stack(&self, name: &str) -> Option<&StackTemplate> {
        self.stacks.iter().find(|s| s.name == name)
    }

    /// Writes every template and the manifest into `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or a file cannot be written.
    pub fn write_to(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        std::fs::create_dir_all(dir).map_err(|e| StacklineError::Io {
            path: dir.to_path_buf(),
            source: e,
        })?;
        let mut written = Vec::with_capacity(self.stacks.len() + 1);
        for stack in &self.stacks {
            let path = dir.join(stack.file_name());
            write_json(&path, &stack.template)?;
            written.push(path);
        }
        let manifest_path = dir.join("manifest.json");
        write_json(&manifest_path, &serde_json::to_value(&self.manifest)?)?;
        written.push(manifest_path);
        tracing::info!(dir = %dir.display(), files = written.len(), "cloud assembly written");
        Ok(written)
    }
}

fn write_json(path: &Path, value: &Value) -> Result<()> {
    let json = serde_json::to_string_pretty(value)?;
    std::fs::write(path, json).map_err(|e| StacklineError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

/// Renders a validated graph into a cloud assembly.
///
/// # Errors
///
/// Returns an error if the graph fails validation.
pub fn synthesize(graph: &ResourceGraph) -> Result<CloudAssembly> {
    validator::validate(graph)?;
    let order = graph.stack_order()?;

    let mut exports: BTreeMap<StackId, BTreeMap<String, Value>> = BTreeMap::new();
    let mut bodies: Vec<(StackId, Map<String, Value>, Map<String, Value>)> = Vec::new();
    let mut assets = BTreeMap::new();

    for &stack in &order {
        let stack_name = graph.stack_name(stack).unwrap_or_default();
        let mut resources = Map::new();
        for resource in graph.resources_in(stack) {
            let properties = rewrite(
                graph,
                stack,
                &resource.links,
                &Value::Object(resource.properties.clone()),
                &mut exports,
            );
            if resource.kind.is_metadata() {
                let _ = assets.insert(format!("{stack_name}/{}", resource.logical_id), properties);
                continue;
            }
            let mut body = Map::new();
            let _ = body.insert("Type".into(), json!(resource.kind.type_name()));
            let _ = body.insert("Properties".into(), properties);
            if !resource.depends_on.is_empty() {
                let _ = body.insert("DependsOn".into(), json!(resource.depends_on));
            }
            let _ = resources.insert(resource.logical_id.clone(), Value::Object(body));
        }

        let mut outputs = Map::new();
        for output in graph.outputs(stack) {
            let mut body = Map::new();
            let _ = body.insert(
                "Value".into(),
                rewrite(graph, stack, &output.links, &output.value, &mut exports),
            );
            if let Some(description) = &output.description {
                let _ = body.insert("Description".into(), json!(description));
            }
            let _ = outputs.insert(output.name.clone(), Value::Object(body));
        }
        bodies.push((stack, sort_map(resources), outputs));
    }

    let mut stacks = Vec::with_capacity(bodies.len());
    let mut manifest_stacks = Vec::with_capacity(bodies.len());
    for (stack, resources, mut outputs) in bodies {
        let name = graph.stack_name(stack).unwrap_or_default().to_string();
        if let Some(stack_exports) = exports.get(&stack) {
            for (export_name, value) in stack_exports {
                let output_id = export_output_id(export_name);
                let _ = outputs.insert(
                    output_id,
                    json!({ "Value": value, "Export": { "Name": export_name } }),
                );
            }
        }
        let template = json!({
            "Description": format!("{name} (synthesized by {})", stackline_common::constants::APP_NAME),
            "Resources": resources,
            "Outputs": outputs,
        });
        let dependencies = graph
            .stack_dependencies(stack)
            .into_iter()
            .filter_map(|d| graph.stack_name(d).map(ToString::to_string))
            .collect();
        let entry = StackTemplate { name, template };
        manifest_stacks.push(ManifestStack {
            name: entry.name.clone(),
            template_file: entry.file_name(),
            dependencies,
        });
        stacks.push(entry);
    }

    tracing::info!(stacks = stacks.len(), assets = assets.len(), "graph synthesized");
    Ok(CloudAssembly {
        stacks,
        manifest: Manifest {
            version: ASSEMBLY_VERSION.to_string(),
            stacks: manifest_stacks,
            assets,
        },
    })
}

/// Rewrites tokens of `value` as seen from `stack`.
///
/// `links` maps each token target to the stack it resolved to.
fn rewrite(
    graph: &ResourceGraph,
    stack: StackId,
    links: &BTreeMap<String, StackId>,
    value: &Value,
    exports: &mut BTreeMap<StackId, BTreeMap<String, Value>>,
) -> Value {
    if let Some(target) = token_target(value) {
        if let Some(&producer) = links.get(target).filter(|&&owner| owner != stack) {
            let producer_name = graph.stack_name(producer).unwrap_or_default();
            let export_name = export_name(producer_name, value);
            let _ = exports
                .entry(producer)
                .or_default()
                .insert(export_name.clone(), value.clone());
            return json!({ "Fn::ImportValue": export_name });
        }
        return value.clone();
    }
    match value {
        Value::Array(items) => Value::Array(
            items
                .iter()
                .map(|v| rewrite(graph, stack, links, v, exports))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), rewrite(graph, stack, links, v, exports)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Builds the export name for a cross-stack token.
fn export_name(producer: &str, token: &Value) -> String {
    let mut parts = Vec::new();
    if let Some(id) = token.get("Ref").and_then(Value::as_str) {
        parts.push(id.to_string());
        parts.push("Ref".to_string());
    } else if let Some(Value::Array(items)) = token.get("Fn::GetAtt") {
        parts.extend(items.iter().filter_map(Value::as_str).map(ToString::to_string));
    }
    let suffix: String = parts
        .concat()
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .collect();
    format!("{producer}:ExportsOutput{suffix}")
}

fn export_output_id(export_name: &str) -> String {
    export_name
        .rsplit(':')
        .next()
        .unwrap_or(export_name)
        .to_string()
}

fn sort_map(map: Map<String, Value>) -> Map<String, Value> {
    let sorted: BTreeMap<String, Value> = map.into_iter().collect();
    sorted.into_iter().collect()
}
