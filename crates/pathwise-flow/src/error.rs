//! Error types for pathwise-flow

use crate::graph::{FlowId, NodeId};
use thiserror::Error;

/// Result type for pathwise-flow operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in pathwise-flow
#[derive(Debug, Error)]
pub enum Error {
    /// A flow with this name was already created
    #[error("flow {0:?} already exists")]
    DuplicateFlow(String),

    /// Start, end, action, composed and snapshot nodes need unique names per flow
    #[error("node {name:?} already exists in flow {flow:?}")]
    DuplicateNode { flow: String, name: String },

    /// Flow id not handed out by this builder
    #[error("{0} does not exist")]
    UnknownFlow(FlowId),

    /// Node id not handed out by this builder
    #[error("{0} does not exist")]
    UnknownNode(NodeId),

    #[error("start node {0} cannot have incoming edges")]
    IncomingEdgeOnStart(NodeId),

    #[error("end node {0} cannot have outgoing edges")]
    OutgoingEdgeOnEnd(NodeId),

    #[error("edge from {from} to {to} crosses flows")]
    CrossFlowEdge { from: NodeId, to: NodeId },

    /// A composed node calls a flow or start node that does not exist
    #[error("{caller} calls unknown start node {start:?} of flow {flow:?}")]
    UnresolvedCall {
        caller: NodeId,
        flow: String,
        start: String,
    },

    #[error("{0} is not a start node")]
    NotAStartNode(NodeId),

    /// Propagation kept producing changes past the configured round limit
    #[error("propagation did not settle after {0} rounds")]
    PropagationDiverged(usize),

    /// Configuration could not be parsed
    #[error("invalid configuration: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Core error
    #[error("core error: {0}")]
    Core(#[from] pathwise_core::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Error>();
    }

    #[test]
    fn test_config_error_converts() {
        let parsed = ron::from_str::<u32>("(");
        let error: Error = parsed.unwrap_err().into();
        assert!(matches!(error, Error::Config(_)));
    }
}
