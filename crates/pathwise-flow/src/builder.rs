//! Construction of flow sets
//!
//! Loaders create flows, nodes and edges through [`FlowSetBuilder`]. The
//! lookup indices (guard subjects, readers, derivers, callers) are filled in
//! as elements are added, and [`FlowSetBuilder::build`] checks that every
//! sub-flow call resolves before the set is frozen.

use crate::action::Action;
use crate::error::{Error, Result};
use crate::graph::{Edge, EdgeId, Flow, FlowId, FlowSet, Node, NodeId, NodeKind, RuleId, StartRule};
use pathwise_core::Condition;

/// Builder for an immutable [`FlowSet`]
///
/// # Example
///
/// ```
/// use pathwise_core::Condition;
/// use pathwise_flow::FlowSetBuilder;
///
/// let mut builder = FlowSetBuilder::new();
/// let flow = builder.create_flow("main").unwrap();
/// builder.set_autostart(flow, true).unwrap();
/// let start = builder.create_start_node(flow, "start").unwrap();
/// let end = builder.create_end_node(flow, "done").unwrap();
/// builder.create_edge(start, end, Condition::known("age")).unwrap();
///
/// let set = builder.build().unwrap();
/// assert_eq!(set.autostart_nodes(), vec![start]);
/// ```
#[derive(Debug, Default)]
pub struct FlowSetBuilder {
    set: FlowSet,
}

impl FlowSetBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty flow
    pub fn create_flow(&mut self, name: impl Into<String>) -> Result<FlowId> {
        let name = name.into();
        if self.set.flow_index.contains_key(&name) {
            return Err(Error::DuplicateFlow(name));
        }
        let id = FlowId(next_index(self.set.flows.len()));
        self.set.flow_index.insert(name.clone(), id);
        self.set.flows.push(Flow {
            id,
            name,
            autostart: false,
            nodes: Vec::new(),
            edges: Vec::new(),
        });
        Ok(id)
    }

    /// Mark a flow to be started on session init
    pub fn set_autostart(&mut self, flow: FlowId, autostart: bool) -> Result<()> {
        self.flow_mut(flow)?.autostart = autostart;
        Ok(())
    }

    pub fn create_start_node(&mut self, flow: FlowId, name: impl Into<String>) -> Result<NodeId> {
        self.create_node(flow, name.into(), NodeKind::Start)
    }

    pub fn create_end_node(&mut self, flow: FlowId, name: impl Into<String>) -> Result<NodeId> {
        self.create_node(flow, name.into(), NodeKind::End)
    }

    pub fn create_action_node(
        &mut self,
        flow: FlowId,
        name: impl Into<String>,
        action: Action,
    ) -> Result<NodeId> {
        self.create_node(flow, name.into(), NodeKind::Action(action))
    }

    /// Create a node calling `start` of `called_flow`
    ///
    /// The callee may be created later; it is resolved by [`Self::build`].
    pub fn create_composed_node(
        &mut self,
        flow: FlowId,
        name: impl Into<String>,
        called_flow: impl Into<String>,
        called_start: impl Into<String>,
    ) -> Result<NodeId> {
        let kind = NodeKind::Composed {
            flow: called_flow.into(),
            start: called_start.into(),
        };
        self.create_node(flow, name.into(), kind)
    }

    pub fn create_snapshot_node(&mut self, flow: FlowId, name: impl Into<String>) -> Result<NodeId> {
        self.create_node(flow, name.into(), NodeKind::Snapshot)
    }

    pub fn create_comment_node(&mut self, flow: FlowId, text: impl Into<String>) -> Result<NodeId> {
        let text = text.into();
        self.create_node(flow, String::new(), NodeKind::Comment(text))
    }

    /// Connect two nodes of the same flow
    pub fn create_edge(&mut self, from: NodeId, to: NodeId, guard: Condition) -> Result<EdgeId> {
        let source = self.node(from)?;
        let target = self.node(to)?;
        if source.flow != target.flow {
            return Err(Error::CrossFlowEdge { from, to });
        }
        if source.is_end() {
            return Err(Error::OutgoingEdgeOnEnd(from));
        }
        if target.is_start() {
            return Err(Error::IncomingEdgeOnStart(to));
        }
        let flow = source.flow;
        let id = EdgeId(next_index(self.set.edges.len()));
        for subject in guard.subjects() {
            self.set.edges_by_subject.entry(subject).or_default().push(id);
        }
        self.set.edges.push(Edge {
            id,
            flow,
            source: from,
            target: to,
            guard,
        });
        self.set.nodes[from.index()].outgoing.push(id);
        self.set.nodes[to.index()].incoming.push(id);
        self.set.flows[flow.index()].edges.push(id);
        Ok(id)
    }

    /// Start a flow run at `start` whenever `condition` becomes true
    pub fn create_start_rule(&mut self, start: NodeId, condition: Condition) -> Result<RuleId> {
        if !self.node(start)?.is_start() {
            return Err(Error::NotAStartNode(start));
        }
        let id = RuleId(next_index(self.set.rules.len()));
        for subject in condition.subjects() {
            self.set.rules_by_subject.entry(subject).or_default().push(id);
        }
        self.set.rules.push(StartRule {
            id,
            start,
            condition,
        });
        Ok(id)
    }

    /// Check sub-flow calls and freeze the set
    pub fn build(self) -> Result<FlowSet> {
        for node in &self.set.nodes {
            let Some((flow, start)) = node.call() else {
                continue;
            };
            let resolved = self.set.flow_index.get(flow).is_some_and(|id| {
                self.set.flows[id.index()].nodes.iter().any(|n| {
                    let callee = &self.set.nodes[n.index()];
                    callee.is_start() && callee.name == start
                })
            });
            if !resolved {
                return Err(Error::UnresolvedCall {
                    caller: node.id,
                    flow: flow.to_string(),
                    start: start.to_string(),
                });
            }
        }
        Ok(self.set)
    }

    fn create_node(&mut self, flow: FlowId, name: String, kind: NodeKind) -> Result<NodeId> {
        let is_comment = matches!(kind, NodeKind::Comment(_));
        let owner = self.set.flows.get(flow.index()).ok_or(Error::UnknownFlow(flow))?;
        let duplicate = !is_comment
            && owner
                .nodes
                .iter()
                .any(|n| self.set.nodes[n.index()].name == name);
        if duplicate {
            return Err(Error::DuplicateNode {
                flow: self.set.flows[flow.index()].name.clone(),
                name,
            });
        }

        let id = NodeId(next_index(self.set.nodes.len()));
        if let NodeKind::Action(action) = &kind {
            for fact in action.forward_objects() {
                self.set.readers.entry(fact).or_default().push(id);
            }
            for fact in action.backward_objects() {
                self.set.derivers.entry(fact).or_default().push(id);
            }
        }
        if let NodeKind::Composed { flow: called, .. } = &kind {
            self.set.callers.entry(called.clone()).or_default().push(id);
        }
        self.set.nodes.push(Node {
            id,
            flow,
            name,
            kind,
            incoming: Vec::new(),
            outgoing: Vec::new(),
        });
        self.set.flows[flow.index()].nodes.push(id);
        Ok(id)
    }

    fn flow_mut(&mut self, flow: FlowId) -> Result<&mut Flow> {
        self.set
            .flows
            .get_mut(flow.index())
            .ok_or(Error::UnknownFlow(flow))
    }

    fn node(&self, node: NodeId) -> Result<&Node> {
        self.set
            .nodes
            .get(node.index())
            .ok_or(Error::UnknownNode(node))
    }
}

fn next_index(len: usize) -> u32 {
    u32::try_from(len).unwrap_or(u32::MAX)
}
