//! Per-session flow state
//!
//! Holds the live flow runs of a session, the checkpoint nodes entered during
//! the current batch, the undefined edges and the suspected solutions.

use crate::graph::{EdgeId, FlowSet, NodeId};
use crate::run::{FlowRun, RunId};
use indexmap::{IndexMap, IndexSet};
use pathwise_core::{EvalContext, FactId, FactStore, Subject, Value};

/// Something the propagation has to look at
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum Trigger {
    /// A fact changed, or a flow entered or left one of its exits
    Subject(Subject),
    /// Recheck the outgoing edges of a node in every run
    Node(NodeId),
}

/// Live flow state of one session
#[derive(Debug, Default)]
pub struct FlowState {
    runs: IndexMap<RunId, FlowRun>,
    next_run: u64,
    /// Checkpoint nodes entered since the last checkpoint pass
    entered: IndexSet<NodeId>,
    undefined_edges: IndexSet<EdgeId>,
    suspected: IndexSet<FactId>,
    /// Triggers raised by the engine itself, handled in the next round
    pending: Vec<Trigger>,
    latest_snapshot_time: Option<u64>,
}

impl FlowState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live flow runs in creation order
    pub fn runs(&self) -> impl Iterator<Item = &FlowRun> {
        self.runs.values()
    }

    pub fn run(&self, id: RunId) -> Option<&FlowRun> {
        self.runs.get(&id)
    }

    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Whether the node is active in any run
    pub fn is_active_node(&self, node: NodeId) -> bool {
        self.runs.values().any(|run| run.is_active(node))
    }

    /// Whether the edge fired in any run
    pub fn is_active_edge(&self, edge: EdgeId) -> bool {
        self.runs.values().any(|run| run.is_activated(edge))
    }

    /// Active nodes over all runs, without duplicates
    pub fn active_nodes(&self) -> IndexSet<NodeId> {
        self.runs.values().flat_map(FlowRun::active_nodes).collect()
    }

    /// Edges of active nodes whose guard has no answer yet
    pub fn undefined_edges(&self) -> &IndexSet<EdgeId> {
        &self.undefined_edges
    }

    /// Solutions reachable through undefined edges
    pub fn suspected_solutions(&self) -> &IndexSet<FactId> {
        &self.suspected
    }

    /// Propagation time of the most recent checkpoint
    pub fn latest_snapshot_time(&self) -> Option<u64> {
        self.latest_snapshot_time
    }

    pub(crate) fn run_mut(&mut self, id: RunId) -> Option<&mut FlowRun> {
        self.runs.get_mut(&id)
    }

    pub(crate) fn run_ids(&self) -> Vec<RunId> {
        self.runs.keys().copied().collect()
    }

    /// A fresh run that is not live yet
    pub(crate) fn allocate_run(&mut self) -> FlowRun {
        self.next_run += 1;
        FlowRun::new(RunId(self.next_run))
    }

    pub(crate) fn insert_run(&mut self, run: FlowRun) -> RunId {
        let id = run.id();
        self.runs.insert(id, run);
        id
    }

    /// Allocate a run and make it live
    pub(crate) fn create_run(&mut self) -> RunId {
        let run = self.allocate_run();
        self.insert_run(run)
    }

    pub(crate) fn remove_run(&mut self, id: RunId) -> Option<FlowRun> {
        self.runs.shift_remove(&id)
    }

    /// Drop runs without active nodes
    pub(crate) fn sweep_empty_runs(&mut self) -> Vec<RunId> {
        let empty: Vec<RunId> = self
            .runs
            .values()
            .filter(|run| run.is_empty())
            .map(FlowRun::id)
            .collect();
        for id in &empty {
            self.runs.shift_remove(id);
        }
        empty
    }

    pub(crate) fn mark_entered(&mut self, node: NodeId) {
        self.entered.insert(node);
    }

    /// Entered checkpoints that are still active and unblocked in some run
    pub(crate) fn take_entered(&mut self) -> Vec<NodeId> {
        let entered = std::mem::take(&mut self.entered);
        entered
            .into_iter()
            .filter(|node| {
                self.runs
                    .values()
                    .any(|run| run.is_active(*node) && !run.is_blocked(*node))
            })
            .collect()
    }

    pub(crate) fn snapshot_done(&mut self, time: u64) {
        self.latest_snapshot_time = Some(time);
    }

    pub(crate) fn set_undefined(&mut self, edge: EdgeId, undefined: bool) {
        if undefined {
            self.undefined_edges.insert(edge);
        } else {
            self.undefined_edges.shift_remove(&edge);
        }
    }

    pub(crate) fn clear_undefined(&mut self) {
        self.undefined_edges.clear();
    }

    pub(crate) fn replace_suspected(&mut self, solutions: IndexSet<FactId>) -> IndexSet<FactId> {
        std::mem::replace(&mut self.suspected, solutions)
    }

    pub(crate) fn push_pending(&mut self, trigger: Trigger) {
        if !self.pending.contains(&trigger) {
            self.pending.push(trigger);
        }
    }

    pub(crate) fn take_pending(&mut self) -> Vec<Trigger> {
        std::mem::take(&mut self.pending)
    }
}

/// Evaluation context over a session: facts from the store, exits from the flow state
pub(crate) struct SessionView<'a, S: ?Sized> {
    pub(crate) kb: &'a FlowSet,
    pub(crate) state: &'a FlowState,
    pub(crate) store: &'a S,
}

impl<S: FactStore + ?Sized> EvalContext for SessionView<'_, S> {
    fn value(&self, fact: &FactId) -> Option<&Value> {
        self.store.value(fact)
    }

    fn is_exit_reached(&self, flow: &str, exit: &str) -> bool {
        self.kb
            .find_exit_node(flow, exit)
            .is_some_and(|node| self.state.is_active_node(node))
    }

    fn is_flow_processed(&self, flow: &str) -> bool {
        let Some(flow) = self.kb.find_flow(flow) else {
            return false;
        };
        self.kb
            .exit_nodes(flow.id())
            .any(|node| self.state.is_active_node(node))
    }
}
