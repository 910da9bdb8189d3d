//! Flow graph model
//!
//! Nodes, edges and flows live in one arena ([`FlowSet`]) and refer to each
//! other by index. The set is built once by [`crate::FlowSetBuilder`] and is
//! immutable afterwards, so it can be shared across sessions behind an `Arc`.

use crate::action::Action;
use indexmap::IndexSet;
use pathwise_core::{Condition, FactId, Subject};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::error;

macro_rules! index_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub u32);

        impl $name {
            /// Get the raw index
            pub fn raw(&self) -> u32 {
                self.0
            }

            pub(crate) fn index(&self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, ":{}"), self.0)
            }
        }
    };
}

index_id!(
    /// Index of a flow in its [`FlowSet`]
    FlowId,
    "flow"
);
index_id!(
    /// Index of a node in its [`FlowSet`]
    NodeId,
    "node"
);
index_id!(
    /// Index of an edge in its [`FlowSet`]
    EdgeId,
    "edge"
);
index_id!(
    /// Index of a start rule in its [`FlowSet`]
    RuleId,
    "rule"
);

/// What a node does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Entry into a flow; never has incoming edges
    Start,
    /// Named exit of a flow; never has outgoing edges
    End,
    /// Runs an action while active
    Action(Action),
    /// Calls the named start node of another flow and is the return point of that call
    Composed { flow: String, start: String },
    /// Checkpoint marker
    Snapshot,
    /// Documentation only
    Comment(String),
}

/// A node of a flow
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) id: NodeId,
    pub(crate) flow: FlowId,
    pub(crate) name: String,
    pub(crate) kind: NodeKind,
    pub(crate) incoming: Vec<EdgeId>,
    pub(crate) outgoing: Vec<EdgeId>,
}

impl Node {
    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn incoming(&self) -> &[EdgeId] {
        &self.incoming
    }

    pub fn outgoing(&self) -> &[EdgeId] {
        &self.outgoing
    }

    pub fn is_start(&self) -> bool {
        matches!(self.kind, NodeKind::Start)
    }

    pub fn is_end(&self) -> bool {
        matches!(self.kind, NodeKind::End)
    }

    pub fn is_snapshot(&self) -> bool {
        matches!(self.kind, NodeKind::Snapshot)
    }

    pub fn is_composed(&self) -> bool {
        matches!(self.kind, NodeKind::Composed { .. })
    }

    pub fn action(&self) -> Option<&Action> {
        match &self.kind {
            NodeKind::Action(action) => Some(action),
            _ => None,
        }
    }

    /// The (flow, start node) a composed node calls
    pub fn call(&self) -> Option<(&str, &str)> {
        match &self.kind {
            NodeKind::Composed { flow, start } => Some((flow.as_str(), start.as_str())),
            _ => None,
        }
    }

    /// Facts this node writes
    pub fn backward_objects(&self) -> Vec<FactId> {
        self.action().map(Action::backward_objects).unwrap_or_default()
    }

    /// Facts this node reads outside of edge guards
    pub fn forward_objects(&self) -> Vec<FactId> {
        self.action().map(Action::forward_objects).unwrap_or_default()
    }
}

/// A guarded, directed edge inside one flow
#[derive(Debug, Clone)]
pub struct Edge {
    pub(crate) id: EdgeId,
    pub(crate) flow: FlowId,
    pub(crate) source: NodeId,
    pub(crate) target: NodeId,
    pub(crate) guard: Condition,
}

impl Edge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn flow(&self) -> FlowId {
        self.flow
    }

    pub fn source(&self) -> NodeId {
        self.source
    }

    pub fn target(&self) -> NodeId {
        self.target
    }

    pub fn guard(&self) -> &Condition {
        &self.guard
    }

    /// Whether this edge, leaving a composed node, is taken when the callee ends at `exit`
    ///
    /// Only an exit-reached guard names an exit; any other guard accepts every exit.
    pub fn accepts_exit(&self, exit: &str) -> bool {
        match &self.guard {
            Condition::ExitReached { exit: name, .. } => name == exit,
            _ => true,
        }
    }
}

/// A named flow chart
#[derive(Debug, Clone)]
pub struct Flow {
    pub(crate) id: FlowId,
    pub(crate) name: String,
    pub(crate) autostart: bool,
    pub(crate) nodes: Vec<NodeId>,
    pub(crate) edges: Vec<EdgeId>,
}

impl Flow {
    pub fn id(&self) -> FlowId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the flow starts on session init
    pub fn is_autostart(&self) -> bool {
        self.autostart
    }

    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }
}

/// Starts a flow run at a start node while its condition holds
#[derive(Debug, Clone)]
pub struct StartRule {
    pub(crate) id: RuleId,
    pub(crate) start: NodeId,
    pub(crate) condition: Condition,
}

impl StartRule {
    pub fn id(&self) -> RuleId {
        self.id
    }

    pub fn start(&self) -> NodeId {
        self.start
    }

    pub fn condition(&self) -> &Condition {
        &self.condition
    }
}

/// All flows of a knowledge base, with lookup indices
///
/// Accessors taking an id index the arena directly; ids are only handed out
/// by the builder of this set.
#[derive(Debug, Clone, Default)]
pub struct FlowSet {
    pub(crate) flows: Vec<Flow>,
    pub(crate) nodes: Vec<Node>,
    pub(crate) edges: Vec<Edge>,
    pub(crate) rules: Vec<StartRule>,
    pub(crate) flow_index: HashMap<String, FlowId>,
    /// Guard subject -> edges reading it
    pub(crate) edges_by_subject: HashMap<Subject, Vec<EdgeId>>,
    /// Rule subject -> start rules reading it
    pub(crate) rules_by_subject: HashMap<Subject, Vec<RuleId>>,
    /// Fact -> nodes whose action reads it
    pub(crate) readers: HashMap<FactId, Vec<NodeId>>,
    /// Fact -> nodes whose action writes it
    pub(crate) derivers: HashMap<FactId, Vec<NodeId>>,
    /// Called flow name -> composed nodes calling it
    pub(crate) callers: HashMap<String, Vec<NodeId>>,
}

impl FlowSet {
    pub fn flow(&self, id: FlowId) -> &Flow {
        &self.flows[id.index()]
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.index()]
    }

    pub fn edge(&self, id: EdgeId) -> &Edge {
        &self.edges[id.index()]
    }

    pub fn rule(&self, id: RuleId) -> &StartRule {
        &self.rules[id.index()]
    }

    pub fn flows(&self) -> impl Iterator<Item = &Flow> {
        self.flows.iter()
    }

    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.iter()
    }

    pub fn rules(&self) -> impl Iterator<Item = &StartRule> {
        self.rules.iter()
    }

    /// Name of the flow owning a node
    pub fn flow_name(&self, node: NodeId) -> &str {
        &self.flow(self.node(node).flow).name
    }

    /// Find a flow by name; a missing flow is logged
    pub fn find_flow(&self, name: &str) -> Option<&Flow> {
        match self.flow_index.get(name) {
            Some(id) => Some(self.flow(*id)),
            None => {
                error!(flow = name, "flow not found");
                None
            }
        }
    }

    /// Find any node of a flow by name
    pub fn find_node(&self, flow: &str, name: &str) -> Option<NodeId> {
        let flow = self.find_flow(flow)?;
        flow.nodes
            .iter()
            .copied()
            .find(|id| self.node(*id).name == name)
    }

    /// Find a start node; a missing node is logged
    pub fn find_start_node(&self, flow: &str, name: &str) -> Option<NodeId> {
        let found = self
            .find_flow(flow)?
            .nodes
            .iter()
            .copied()
            .find(|id| self.node(*id).is_start() && self.node(*id).name == name);
        if found.is_none() {
            error!(flow, start = name, "start node not found");
        }
        found
    }

    /// Find an end node; a missing node is logged
    pub fn find_exit_node(&self, flow: &str, name: &str) -> Option<NodeId> {
        let found = self
            .find_flow(flow)?
            .nodes
            .iter()
            .copied()
            .find(|id| self.node(*id).is_end() && self.node(*id).name == name);
        if found.is_none() {
            error!(flow, exit = name, "exit node not found");
        }
        found
    }

    pub fn start_nodes(&self, flow: FlowId) -> impl Iterator<Item = NodeId> + '_ {
        self.flow(flow)
            .nodes
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_start())
    }

    pub fn exit_nodes(&self, flow: FlowId) -> impl Iterator<Item = NodeId> + '_ {
        self.flow(flow)
            .nodes
            .iter()
            .copied()
            .filter(|id| self.node(*id).is_end())
    }

    /// The start node a composed node calls
    pub fn called_start(&self, composed: NodeId) -> Option<NodeId> {
        let (flow, start) = self.node(composed).call()?;
        self.find_start_node(flow, start)
    }

    /// The flow a composed node calls
    pub fn called_flow(&self, composed: NodeId) -> Option<FlowId> {
        let (flow, _) = self.node(composed).call()?;
        self.find_flow(flow).map(Flow::id)
    }

    /// Composed nodes calling any start node of the named flow
    pub fn callers_of_flow(&self, flow: &str) -> &[NodeId] {
        self.callers.get(flow).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Composed nodes calling exactly this start node
    pub fn calling_nodes(&self, start: NodeId) -> Vec<NodeId> {
        let node = self.node(start);
        self.callers_of_flow(self.flow_name(start))
            .iter()
            .copied()
            .filter(|caller| {
                self.node(*caller)
                    .call()
                    .is_some_and(|(_, called)| called == node.name)
            })
            .collect()
    }

    /// Start nodes of every autostart flow
    pub fn autostart_nodes(&self) -> Vec<NodeId> {
        self.flows
            .iter()
            .filter(|flow| flow.autostart)
            .flat_map(|flow| self.start_nodes(flow.id))
            .collect()
    }

    /// Edges whose guard reads the subject
    pub fn edges_for(&self, subject: &Subject) -> &[EdgeId] {
        self.edges_by_subject
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Start rules whose condition reads the subject
    pub fn rules_for(&self, subject: &Subject) -> &[RuleId] {
        self.rules_by_subject
            .get(subject)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Nodes whose action reads the fact
    pub fn readers_of(&self, fact: &FactId) -> &[NodeId] {
        self.readers.get(fact).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes whose action writes the fact
    pub fn derivers_of(&self, fact: &FactId) -> &[NodeId] {
        self.derivers.get(fact).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Nodes reachable from `from` along outgoing edges, `from` included
    pub fn reachable_nodes(&self, from: NodeId) -> IndexSet<NodeId> {
        let mut seen = IndexSet::new();
        let mut stack = vec![from];
        while let Some(node) = stack.pop() {
            if !seen.insert(node) {
                continue;
            }
            for edge in &self.node(node).outgoing {
                stack.push(self.edge(*edge).target);
            }
        }
        seen
    }

    /// Whether a path leads from one node to another in the same flow
    ///
    /// A node is connected to itself only through a cycle.
    pub fn are_connected(&self, from: NodeId, to: NodeId) -> bool {
        if self.node(from).flow != self.node(to).flow {
            return false;
        }
        let mut seen = IndexSet::new();
        let mut stack: Vec<NodeId> = self.successors(from).collect();
        while let Some(node) = stack.pop() {
            if node == to {
                return true;
            }
            if seen.insert(node) {
                stack.extend(self.successors(node));
            }
        }
        false
    }

    fn successors(&self, node: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.node(node)
            .outgoing
            .iter()
            .map(|edge| self.edge(*edge).target)
    }
}
