//! Derivation sources
//!
//! Which facts and flows may influence a derived fact. The walk starts at
//! every node deriving the fact and goes backward: from a start node up into
//! its calling composed nodes, from a composed node left through an exit edge
//! down into the matching exits of the callee, otherwise along incoming edges,
//! collecting their guard subjects. Facts read by the actions of visited nodes
//! are collected too.
//!
//! The active variant only follows fired edges and active nodes. Facts frozen
//! by a checkpoint no longer have active sources.

use crate::graph::{EdgeId, FlowSet, NodeId, NodeKind};
use crate::state::FlowState;
use indexmap::IndexSet;
use pathwise_core::{FactId, Subject};

/// Subjects whose change could influence `fact` in any session
pub fn potential_derivation_sources(kb: &FlowSet, fact: &FactId) -> IndexSet<Subject> {
    sources(kb, None, fact)
}

/// Subjects that took part in deriving the current value of `fact`
pub fn active_derivation_sources(kb: &FlowSet, state: &FlowState, fact: &FactId) -> IndexSet<Subject> {
    sources(kb, Some(state), fact)
}

fn sources(kb: &FlowSet, state: Option<&FlowState>, fact: &FactId) -> IndexSet<Subject> {
    let node_active = |node: NodeId| state.is_none_or(|s| s.is_active_node(node));
    let edge_active = |edge: EdgeId| state.is_none_or(|s| s.is_active_edge(edge));

    let mut result = IndexSet::new();
    let mut visited: IndexSet<(NodeId, Option<EdgeId>)> = IndexSet::new();
    let mut stack: Vec<(NodeId, Option<EdgeId>)> =
        kb.derivers_of(fact).iter().map(|node| (*node, None)).collect();

    while let Some((node, via)) = stack.pop() {
        if !visited.insert((node, via)) || !node_active(node) {
            continue;
        }
        let node_def = kb.node(node);
        match (node_def.kind(), via) {
            (NodeKind::Start, _) => {
                for caller in kb.calling_nodes(node) {
                    let entered = state.is_none()
                        || kb.node(caller).incoming().iter().any(|e| edge_active(*e));
                    if entered {
                        stack.push((caller, None));
                    }
                }
            }
            (NodeKind::Composed { .. }, Some(edge)) => {
                let Some(callee) = kb.called_flow(node) else {
                    continue;
                };
                for exit in kb.exit_nodes(callee) {
                    if kb.edge(edge).accepts_exit(kb.node(exit).name()) {
                        stack.push((exit, None));
                    }
                }
            }
            _ => {
                for &edge in node_def.incoming() {
                    if !edge_active(edge) {
                        continue;
                    }
                    stack.push((kb.edge(edge).source(), Some(edge)));
                    result.extend(kb.edge(edge).guard().subjects());
                }
            }
        }
        result.extend(node_def.forward_objects().into_iter().map(Subject::Fact));
    }
    result
}
