//! Resource graph management using `petgraph`.
//!
//! Resources are grouped into stacks. A stack is open while a topology
//! declares into it and sealed once the topology completes; sealed stacks
//! never change again. Edges point from a dependency to its dependent, so a
//! topological sort yields dependencies first. An edge may only cross
//! stacks when it points from an open stack into a sealed one, which keeps
//! stack dependencies one-way.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use petgraph::stable_graph::{NodeIndex, StableGraph};
use serde_json::Value;
use stackline_common::error::{Result, StacklineError};

use crate::resource::{NodeRef, Resource, ResourceSpec, collect_token_targets};

static NEXT_GRAPH_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identifier of a [`ResourceGraph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GraphId(u64);

impl fmt::Display for GraphId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "graph-{}", self.0)
    }
}

/// Identifier of a stack within one graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StackId(usize);

impl StackId {
    /// Returns the position of the stack in declaration order.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

/// Lifecycle state of a stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackState {
    /// Resources are still being declared.
    Open,
    /// Construction completed; the stack is immutable.
    Sealed,
    /// Construction failed and every resource was removed.
    Discarded,
}

impl fmt::Display for StackState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Sealed => write!(f, "sealed"),
            Self::Discarded => write!(f, "discarded"),
        }
    }
}

/// A named value a stack exposes to its consumers.
#[derive(Debug, Clone)]
pub struct Output {
    /// Output name, unique within the stack.
    pub name: String,
    /// Literal or token value.
    pub value: Value,
    /// Optional human-readable description.
    pub description: Option<String>,
    pub(crate) links: BTreeMap<String, StackId>,
}

#[derive(Debug)]
struct StackRecord {
    name: String,
    state: StackState,
    outputs: Vec<Output>,
}

/// A directed acyclic graph of typed resources, grouped into stacks.
///
/// Logical ids are unique within a stack. Two stacks may declare the same
/// id, so several consumers built from one template can share a producer.
#[derive(Debug)]
pub struct ResourceGraph {
    id: GraphId,
    graph: StableGraph<Resource, ()>,
    stacks: Vec<StackRecord>,
    index: HashMap<(StackId, String), NodeIndex>,
}

impl ResourceGraph {
    /// Creates an empty graph with a fresh identity.
    #[must_use]
    pub fn new() -> Self {
        Self {
            id: GraphId(NEXT_GRAPH_ID.fetch_add(1, Ordering::Relaxed)),
            graph: StableGraph::new(),
            stacks: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Returns the identity of this graph.
    #[must_use]
    pub const fn id(&self) -> GraphId {
        self.id
    }

    /// Opens a new stack for declaration.
    ///
    /// # Errors
    ///
    /// Returns an error if a live stack already uses the name.
    pub fn open_stack(&mut self, name: impl Into<String>) -> Result<StackId> {
        let name = name.into();
        if self
            .stacks
            .iter()
            .any(|s| s.name == name && s.state != StackState::Discarded)
        {
            return Err(StacklineError::Duplicate { kind: "stack", id: name });
        }
        let id = StackId(self.stacks.len());
        tracing::debug!(stack = %name, "stack opened");
        self.stacks.push(StackRecord {
            name,
            state: StackState::Open,
            outputs: Vec::new(),
        });
        Ok(id)
    }

    /// Seals an open stack, making it immutable and referenceable.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is unknown or not open.
    pub fn seal_stack(&mut self, stack: StackId) -> Result<()> {
        let count = self.resources_in(stack).count();
        let record = self.open_record_mut(stack)?;
        record.state = StackState::Sealed;
        tracing::info!(stack = %record.name, resources = count, "stack sealed");
        Ok(())
    }

    /// Removes every resource and output of an open stack.
    ///
    /// Used when a topology fails half-way so that no partial declaration
    /// stays in the graph.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is unknown or not open.
    pub fn discard_stack(&mut self, stack: StackId) -> Result<()> {
        let _ = self.open_record(stack)?;
        let doomed: Vec<NodeIndex> = self
            .graph
            .node_indices()
            .filter(|&idx| self.graph[idx].stack == stack)
            .collect();
        for idx in &doomed {
            if let Some(resource) = self.graph.remove_node(*idx) {
                let _ = self.index.remove(&(stack, resource.logical_id));
            }
        }
        let record = self.open_record_mut(stack)?;
        record.state = StackState::Discarded;
        record.outputs.clear();
        tracing::warn!(stack = %record.name, removed = doomed.len(), "stack discarded");
        Ok(())
    }

    /// Returns the state of a stack, if it exists.
    #[must_use]
    pub fn stack_state(&self, stack: StackId) -> Option<StackState> {
        self.stacks.get(stack.0).map(|s| s.state)
    }

    /// Returns the name of a stack, if it exists.
    #[must_use]
    pub fn stack_name(&self, stack: StackId) -> Option<&str> {
        self.stacks.get(stack.0).map(|s| s.name.as_str())
    }

    /// Looks up a live stack by name.
    #[must_use]
    pub fn find_stack(&self, name: &str) -> Option<StackId> {
        self.stacks
            .iter()
            .position(|s| s.name == name && s.state != StackState::Discarded)
            .map(StackId)
    }

    /// Returns every stack that is not discarded, in declaration order.
    pub fn stacks(&self) -> impl Iterator<Item = StackId> + '_ {
        self.stacks
            .iter()
            .enumerate()
            .filter(|(_, s)| s.state != StackState::Discarded)
            .map(|(i, _)| StackId(i))
    }

    /// Checks that `stack` of graph `graph` has completed construction.
    ///
    /// This is the ordering check applied to handles flowing from one
    /// topology into another.
    ///
    /// # Errors
    ///
    /// Returns [`StacklineError::Ordering`] if the handle belongs to another
    /// graph or its stack is not sealed.
    pub fn require_sealed(&self, graph: GraphId, stack: StackId) -> Result<()> {
        if graph != self.id {
            return Err(StacklineError::ordering(format!(
                "handle belongs to {graph}, not to {}",
                self.id
            )));
        }
        match self.stack_state(stack) {
            Some(StackState::Sealed) => Ok(()),
            Some(state) => Err(StacklineError::ordering(format!(
                "stack \"{}\" is {state}, dependents require a sealed stack",
                self.stacks[stack.0].name
            ))),
            None => Err(StacklineError::ordering(format!(
                "stack #{} does not exist in {}",
                stack.0, self.id
            ))),
        }
    }

    /// Declares a resource in an open stack.
    ///
    /// Every token in the properties and every explicit dependency becomes
    /// an edge. Tokens must point at resources that already exist. A token
    /// resolves to the declaring stack first; otherwise exactly one other
    /// live stack must declare the id, or exactly one of the stacks named by
    /// the explicit dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is not open, the logical id is taken in
    /// the stack, a token or dependency cannot be resolved, or a cross-stack
    /// edge points at a stack that is not sealed.
    pub fn add_resource(&mut self, stack: StackId, spec: ResourceSpec) -> Result<NodeRef> {
        let _ = self.open_record(stack)?;
        if self.index.contains_key(&(stack, spec.logical_id.clone())) {
            return Err(StacklineError::Duplicate {
                kind: "logical id",
                id: format!("{} in stack \"{}\"", spec.logical_id, self.stacks[stack.0].name),
            });
        }

        let hinted: BTreeSet<StackId> = spec.depends_on.iter().map(|d| d.stack).collect();
        let mut targets = Vec::new();
        for value in spec.properties.values() {
            collect_token_targets(value, &mut targets);
        }
        let mut dependencies: BTreeSet<NodeIndex> = BTreeSet::new();
        let mut links = BTreeMap::new();
        for target in &targets {
            let idx = self.resolve_token(stack, target, &spec.logical_id, &hinted)?;
            self.check_edge(stack, idx, &spec.logical_id)?;
            let _ = links.insert(target.clone(), self.graph[idx].stack);
            let _ = dependencies.insert(idx);
        }
        let mut depends_on = Vec::new();
        for dep in &spec.depends_on {
            let idx = self.resolve_node(dep)?;
            self.check_edge(stack, idx, &spec.logical_id)?;
            if dep.stack == stack && !depends_on.contains(&dep.logical_id) {
                depends_on.push(dep.logical_id.clone());
            }
            let _ = dependencies.insert(idx);
        }

        let resource = Resource {
            logical_id: spec.logical_id.clone(),
            kind: spec.kind,
            stack,
            properties: spec.properties,
            depends_on,
            links,
        };
        let index = self.graph.add_node(resource);
        for dep in dependencies {
            let _ = self.graph.add_edge(dep, index, ());
        }
        let _ = self.index.insert((stack, spec.logical_id.clone()), index);
        tracing::debug!(id = %spec.logical_id, kind = %spec.kind, "resource declared");

        Ok(NodeRef {
            graph: self.id,
            stack,
            index,
            logical_id: spec.logical_id,
            kind: spec.kind,
        })
    }

    /// Adds an explicit edge: `dependent` depends on `dependency`.
    ///
    /// # Errors
    ///
    /// Returns an error if either node is unknown, the dependent's stack is
    /// not open, or the edge would cross into an unsealed stack.
    pub fn add_dependency(&mut self, dependent: &NodeRef, dependency: &NodeRef) -> Result<()> {
        let to = self.resolve_node(dependent)?;
        let from = self.resolve_node(dependency)?;
        let _ = self.open_record(dependent.stack)?;
        self.check_edge(dependent.stack, from, &dependent.logical_id)?;
        if self.graph.find_edge(from, to).is_none() {
            let _ = self.graph.add_edge(from, to, ());
        }
        let resource = &mut self.graph[to];
        if dependency.stack == dependent.stack
            && !resource.depends_on.contains(&dependency.logical_id)
        {
            resource.depends_on.push(dependency.logical_id.clone());
        }
        Ok(())
    }

    /// Declares an output of an open stack.
    ///
    /// Tokens in the value resolve the way resource tokens do.
    ///
    /// # Errors
    ///
    /// Returns an error if the stack is not open, the name is taken, or the
    /// value references an unknown resource.
    pub fn add_output(
        &mut self,
        stack: StackId,
        name: impl Into<String>,
        value: Value,
        description: Option<String>,
    ) -> Result<()> {
        let name = name.into();
        let mut targets = Vec::new();
        collect_token_targets(&value, &mut targets);
        let mut links = BTreeMap::new();
        for target in &targets {
            let idx = self.resolve_token(stack, target, &name, &BTreeSet::new())?;
            let _ = links.insert(target.clone(), self.graph[idx].stack);
        }
        let record = self.open_record_mut(stack)?;
        if record.outputs.iter().any(|o| o.name == name) {
            return Err(StacklineError::Duplicate { kind: "output", id: name });
        }
        record.outputs.push(Output {
            name,
            value,
            description,
            links,
        });
        Ok(())
    }

    /// Returns the outputs of a stack in declaration order.
    #[must_use]
    pub fn outputs(&self, stack: StackId) -> &[Output] {
        self.stacks
            .get(stack.0)
            .map_or(&[][..], |s| s.outputs.as_slice())
    }

    /// Looks up a resource by stack and logical id.
    #[must_use]
    pub fn resource(&self, stack: StackId, logical_id: &str) -> Option<&Resource> {
        self.index
            .get(&(stack, logical_id.to_string()))
            .map(|&idx| &self.graph[idx])
    }

    /// Returns the resource a handle points at, if it belongs to this graph.
    #[must_use]
    pub fn node(&self, node: &NodeRef) -> Option<&Resource> {
        self.resolve_node(node).ok().map(|idx| &self.graph[idx])
    }

    /// Returns every resource in the graph, in no particular order.
    pub fn resources(&self) -> impl Iterator<Item = &Resource> + '_ {
        self.graph.node_weights()
    }

    /// Returns the resources owned by one stack.
    pub fn resources_in(&self, stack: StackId) -> impl Iterator<Item = &Resource> + '_ {
        self.graph.node_weights().filter(move |r| r.stack == stack)
    }

    /// Returns the number of declared resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Returns `true` if no resource has been declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Returns the resources a resource directly depends on.
    #[must_use]
    pub fn dependencies_of(&self, stack: StackId, logical_id: &str) -> Vec<&Resource> {
        self.index
            .get(&(stack, logical_id.to_string()))
            .map_or_else(Vec::new, |&idx| {
                self.graph
                    .neighbors_directed(idx, petgraph::Direction::Incoming)
                    .map(|n| &self.graph[n])
                    .collect()
            })
    }

    /// Returns the stacks `stack` depends on through cross-stack edges.
    #[must_use]
    pub fn stack_dependencies(&self, stack: StackId) -> Vec<StackId> {
        let deps: BTreeSet<StackId> = self
            .graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .filter(|&(from, to)| {
                self.graph[to].stack == stack && self.graph[from].stack != stack
            })
            .map(|(from, _)| self.graph[from].stack)
            .collect();
        deps.into_iter().collect()
    }

    /// Returns live stacks ordered so that dependencies come first.
    ///
    /// # Errors
    ///
    /// Returns an error if stack dependencies form a cycle.
    pub fn stack_order(&self) -> Result<Vec<StackId>> {
        let mut stack_graph = petgraph::Graph::<StackId, ()>::new();
        let mut nodes = HashMap::new();
        for stack in self.stacks() {
            let _ = nodes.insert(stack, stack_graph.add_node(stack));
        }
        for stack in self.stacks() {
            for dep in self.stack_dependencies(stack) {
                if let (Some(&from), Some(&to)) = (nodes.get(&dep), nodes.get(&stack)) {
                    let _ = stack_graph.add_edge(from, to, ());
                }
            }
        }
        match petgraph::algo::toposort(&stack_graph, None) {
            Ok(indices) => Ok(indices.into_iter().map(|i| stack_graph[i]).collect()),
            Err(_cycle) => Err(StacklineError::config(
                "cyclic dependency detected between stacks",
            )),
        }
    }

    /// Returns every resource in creation order.
    ///
    /// Stacks are visited in [`Self::stack_order`]; inside a stack the
    /// order is topological.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn deployment_order(&self) -> Result<Vec<&Resource>> {
        let sorted = match petgraph::algo::toposort(&self.graph, None) {
            Ok(indices) => indices,
            Err(cycle) => {
                let id = &self.graph[cycle.node_id()].logical_id;
                return Err(StacklineError::config(format!(
                    "cyclic dependency detected at resource \"{id}\""
                )));
            }
        };
        let mut ordered = Vec::with_capacity(sorted.len());
        for stack in self.stack_order()? {
            ordered.extend(
                sorted
                    .iter()
                    .map(|&idx| &self.graph[idx])
                    .filter(|r| r.stack == stack),
            );
        }
        Ok(ordered)
    }

    /// Returns every resource in destruction order: dependents first.
    ///
    /// # Errors
    ///
    /// Returns an error if the graph contains cycles.
    pub fn teardown_order(&self) -> Result<Vec<&Resource>> {
        let mut order = self.deployment_order()?;
        order.reverse();
        Ok(order)
    }

    fn open_record(&self, stack: StackId) -> Result<&StackRecord> {
        let record = self.stacks.get(stack.0).ok_or_else(|| StacklineError::NotFound {
            kind: "stack",
            id: format!("#{}", stack.0),
        })?;
        if record.state != StackState::Open {
            return Err(StacklineError::ordering(format!(
                "stack \"{}\" is {}, only open stacks accept declarations",
                record.name, record.state
            )));
        }
        Ok(record)
    }

    fn open_record_mut(&mut self, stack: StackId) -> Result<&mut StackRecord> {
        let _ = self.open_record(stack)?;
        Ok(&mut self.stacks[stack.0])
    }

    fn resolve_token(
        &self,
        stack: StackId,
        target: &str,
        referrer: &str,
        hinted: &BTreeSet<StackId>,
    ) -> Result<NodeIndex> {
        let key = |s: StackId| (s, target.to_string());
        if let Some(&idx) = self.index.get(&key(stack)) {
            return Ok(idx);
        }
        let candidates: Vec<(StackId, NodeIndex)> = self
            .stacks()
            .filter(|&s| s != stack)
            .filter_map(|s| self.index.get(&key(s)).map(|&idx| (s, idx)))
            .collect();
        if let [(_, idx)] = candidates.as_slice() {
            return Ok(*idx);
        }
        if candidates.is_empty() {
            return Err(StacklineError::NotFound {
                kind: "resource",
                id: format!("\"{target}\" referenced by \"{referrer}\""),
            });
        }
        let narrowed: Vec<NodeIndex> = candidates
            .iter()
            .filter(|(s, _)| hinted.contains(s))
            .map(|&(_, idx)| idx)
            .collect();
        if let [idx] = narrowed.as_slice() {
            return Ok(*idx);
        }
        let owners: Vec<&str> = candidates
            .iter()
            .map(|&(s, _)| self.stacks[s.0].name.as_str())
            .collect();
        Err(StacklineError::config(format!(
            "\"{referrer}\" references \"{target}\", which stacks {owners:?} all declare; \
             add an explicit dependency on the intended one"
        )))
    }

    fn resolve_node(&self, node: &NodeRef) -> Result<NodeIndex> {
        if node.graph != self.id {
            return Err(StacklineError::ordering(format!(
                "resource \"{}\" belongs to {}, not to {}",
                node.logical_id, node.graph, self.id
            )));
        }
        match self.graph.node_weight(node.index) {
            Some(r) if r.logical_id == node.logical_id && r.stack == node.stack => Ok(node.index),
            _ => Err(StacklineError::NotFound {
                kind: "resource",
                id: node.logical_id.clone(),
            }),
        }
    }

    fn check_edge(
        &self,
        dependent_stack: StackId,
        dependency: NodeIndex,
        referrer: &str,
    ) -> Result<()> {
        let dep_stack = self.graph[dependency].stack;
        if dep_stack == dependent_stack {
            return Ok(());
        }
        if self.stack_state(dep_stack) != Some(StackState::Sealed) {
            return Err(StacklineError::ordering(format!(
                "\"{referrer}\" depends on \"{}\" in stack \"{}\", which is not sealed",
                self.graph[dependency].logical_id, self.stacks[dep_stack.0].name
            )));
        }
        Ok(())
    }
}

impl Default for ResourceGraph {
    fn default() -> Self {
        Self::new()
    }
}
