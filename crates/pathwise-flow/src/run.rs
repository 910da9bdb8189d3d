//! Flow runs
//!
//! A flow run is one live region of the flow graph in a session. It owns the
//! supports of its active nodes, the edges that fired, the roots it resumes
//! from, and the checkpoint nodes it must never take again.

use crate::graph::{EdgeId, NodeId};
use crate::support::Support;
use indexmap::{IndexMap, IndexSet};
use pathwise_core::SourceId;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

/// Session-unique flow run identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl RunId {
    /// Get the raw ID value
    pub fn raw(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run:{}", self.0)
    }
}

/// Activation state of one flow run
#[derive(Debug, Clone)]
pub struct FlowRun {
    id: RunId,
    /// Active nodes and their supports; never holds an empty list
    supports: IndexMap<NodeId, Vec<Support>>,
    activated: IndexSet<EdgeId>,
    roots: Vec<NodeId>,
    blocked: IndexSet<NodeId>,
}

impl FlowRun {
    pub(crate) fn new(id: RunId) -> Self {
        Self {
            id,
            supports: IndexMap::new(),
            activated: IndexSet::new(),
            roots: Vec::new(),
            blocked: IndexSet::new(),
        }
    }

    pub fn id(&self) -> RunId {
        self.id
    }

    pub fn is_active(&self, node: NodeId) -> bool {
        self.supports.contains_key(&node)
    }

    /// Whether the edge fired in this run
    pub fn is_activated(&self, edge: EdgeId) -> bool {
        self.activated.contains(&edge)
    }

    pub fn supports(&self, node: NodeId) -> &[Support] {
        self.supports.get(&node).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Active nodes in activation order
    pub fn active_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.supports.keys().copied()
    }

    pub fn activated_edges(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.activated.iter().copied()
    }

    /// Nodes this run was started from or resumes at
    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    /// Checkpoint nodes this run never takes again
    pub fn blocked(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.blocked.iter().copied()
    }

    pub fn is_blocked(&self, node: NodeId) -> bool {
        self.blocked.contains(&node)
    }

    /// No node is active
    pub fn is_empty(&self) -> bool {
        self.supports.is_empty()
    }

    /// Source under which a node of this run contributes facts
    pub fn source_id(&self, node: NodeId) -> SourceId {
        SourceId::new(self.id.0, node.raw())
    }

    /// Add a support; returns true if the node became active
    pub(crate) fn add_support(&mut self, node: NodeId, support: Support) -> bool {
        let supports = self.supports.entry(node).or_default();
        if supports.contains(&support) {
            warn!(node = %node, run = %self.id, support = %support, "support already present");
            return false;
        }
        supports.push(support);
        if let Support::Edge(edge) = support {
            self.activated.insert(edge);
        }
        supports.len() == 1
    }

    /// Remove a support; returns true if the node became inactive
    pub(crate) fn remove_support(&mut self, node: NodeId, support: Support) -> bool {
        let Some(supports) = self.supports.get_mut(&node) else {
            return false;
        };
        let Some(index) = supports.iter().position(|s| *s == support) else {
            return false;
        };
        supports.remove(index);
        if let Support::Edge(edge) = support {
            self.activated.shift_remove(&edge);
        }
        if supports.is_empty() {
            self.supports.shift_remove(&node);
            true
        } else {
            false
        }
    }

    pub(crate) fn add_root(&mut self, node: NodeId) {
        if !self.roots.contains(&node) {
            self.roots.push(node);
        }
    }

    /// Make `node` an active root without entering it
    ///
    /// Used for runs resumed after a checkpoint, whose roots were already
    /// entered in the retired runs.
    pub(crate) fn seed_root(&mut self, node: NodeId) {
        self.add_root(node);
        let supports = self.supports.entry(node).or_default();
        if !supports.contains(&Support::Root) {
            supports.push(Support::Root);
        }
    }

    pub(crate) fn block(&mut self, node: NodeId) {
        self.blocked.insert(node);
    }

    pub(crate) fn inherit_blocked(&mut self, other: &FlowRun) {
        self.blocked.extend(other.blocked.iter().copied());
    }
}
