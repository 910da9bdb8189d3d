//! Reasons for a node to be active

use crate::graph::{EdgeId, NodeId, RuleId};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a node is active in a flow run
///
/// A node is active exactly while it holds at least one support.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Support {
    /// Entry point of the run (explicit start, or resume point after a checkpoint)
    Root,
    /// The edge fired
    Edge(EdgeId),
    /// A composed node vouches for the start node it calls
    Call(NodeId),
    /// A start rule holds
    Rule(RuleId),
}

impl fmt::Display for Support {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Support::Root => write!(f, "root"),
            Support::Edge(edge) => write!(f, "{}", edge),
            Support::Call(node) => write!(f, "call from {}", node),
            Support::Rule(rule) => write!(f, "{}", rule),
        }
    }
}
