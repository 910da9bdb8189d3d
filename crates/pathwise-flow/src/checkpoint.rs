//! Checkpoint engine
//!
//! Runs once per settled batch. For every checkpoint node entered during the
//! batch, the runs in which it is active are frozen: the facts of their
//! active nodes are persisted as snapshot facts, their derivations are
//! withdrawn, and the runs are replaced by one new run per checkpoint. The new
//! run is rooted at the checkpoint plus the callers it still returns into, and
//! never takes the checkpoint again.
//!
//! The walk that finds those callers only follows edges that actually fired:
//!
//! ```text
//!   outer:  start ──▶ C ──(exit reached)──▶ …
//!                     │ calls
//!   inner:  start ──▶ S ──▶ end
//! ```
//!
//! Walking back from `S` reaches the inner start, then `C` through the call,
//! then the outer start. `C` has no fired outgoing edge, so execution is
//! still inside it and it becomes a root of the new run.

use crate::graph::{EdgeId, FlowSet, NodeId, NodeKind};
use crate::propagation::Propagator;
use crate::run::{FlowRun, RunId};
use crate::state::Trigger;
use indexmap::IndexSet;
use pathwise_core::{FactStore, Source};
use tracing::debug;

/// Nodes and fired edges leading to a checkpoint within one run
#[derive(Debug, Default)]
struct Region {
    nodes: IndexSet<NodeId>,
    edges: IndexSet<EdgeId>,
    /// Composed nodes met on the way, innermost call first
    composed: IndexSet<NodeId>,
}

impl Region {
    /// Whether the node has a fired incoming edge inside the region
    fn has_incoming_activation(&self, kb: &FlowSet, node: NodeId) -> bool {
        kb.node(node)
            .incoming()
            .iter()
            .any(|edge| self.edges.contains(edge))
    }

    /// Whether execution has not left the node yet
    fn still_inside(&self, kb: &FlowSet, node: NodeId) -> bool {
        !self.nodes.contains(&node)
            || !kb
                .node(node)
                .outgoing()
                .iter()
                .any(|edge| self.edges.contains(edge))
    }
}

/// Collect the region of `run` that led to `target`
fn walk_back(kb: &FlowSet, run: &FlowRun, target: NodeId) -> Region {
    let mut region = Region::default();
    let mut visited: IndexSet<(NodeId, Option<EdgeId>)> = IndexSet::new();
    let mut stack: Vec<(NodeId, Option<EdgeId>)> = vec![(target, None)];

    while let Some((node, via)) = stack.pop() {
        if !visited.insert((node, via)) {
            continue;
        }
        if let Some(edge) = via {
            region.edges.insert(edge);
        }
        region.nodes.insert(node);
        let node_def = kb.node(node);

        match (node_def.kind(), via) {
            (NodeKind::Start, _) => {
                // up into the composed nodes that called this start
                for caller in kb.calling_nodes(node) {
                    let entered = kb
                        .node(caller)
                        .incoming()
                        .iter()
                        .any(|edge| run.is_activated(*edge));
                    if run.is_active(caller) && entered {
                        stack.push((caller, None));
                    }
                }
            }
            (NodeKind::Composed { flow, .. }, Some(edge)) => {
                region.composed.insert(node);
                // down into the exits the edge left the call through
                let Some(callee) = kb.find_flow(flow) else {
                    continue;
                };
                for exit in kb.exit_nodes(callee.id()) {
                    if run.is_active(exit) && kb.edge(edge).accepts_exit(kb.node(exit).name()) {
                        stack.push((exit, None));
                    }
                }
            }
            (kind, _) => {
                if matches!(kind, NodeKind::Composed { .. }) {
                    region.composed.insert(node);
                }
                for &edge in node_def.incoming() {
                    if run.is_activated(edge) {
                        stack.push((kb.edge(edge).source(), Some(edge)));
                    }
                }
            }
        }
    }
    region
}

/// Composed nodes the execution returns into after leaving `child`'s flow
fn parents(kb: &FlowSet, run: &FlowRun, region: &Region, child: NodeId) -> IndexSet<NodeId> {
    let mut result = IndexSet::new();
    let mut seen = IndexSet::new();
    let mut stack = vec![child];

    while let Some(child) = stack.pop() {
        if !seen.insert(child) {
            continue;
        }
        let flow = kb.flow_name(child);
        let callers: Vec<NodeId> = region
            .composed
            .iter()
            .copied()
            .filter(|node| calls_flow(kb, *node, flow))
            .collect();
        let callers = if callers.is_empty() {
            // the call may have been resumed from an earlier checkpoint
            run.roots()
                .iter()
                .copied()
                .filter(|node| calls_flow(kb, *node, flow))
                .collect()
        } else {
            callers
        };
        for caller in callers {
            result.insert(caller);
            stack.push(caller);
        }
    }
    result
}

fn calls_flow(kb: &FlowSet, node: NodeId, flow: &str) -> bool {
    kb.node(node).call().is_some_and(|(called, _)| called == flow)
}

/// Build the run that continues after `checkpoint`
fn continuation(kb: &FlowSet, mut run: FlowRun, checkpoint: NodeId, contributing: &[&FlowRun]) -> FlowRun {
    run.seed_root(checkpoint);
    run.block(checkpoint);
    for old in contributing.iter().filter(|old| old.is_active(checkpoint)) {
        run.inherit_blocked(old);
        let region = walk_back(kb, old, checkpoint);
        for parent in parents(kb, old, &region, checkpoint) {
            if region.has_incoming_activation(kb, parent) || region.still_inside(kb, parent) {
                run.seed_root(parent);
            }
        }
    }
    run
}

impl<S: FactStore + ?Sized> Propagator<'_, '_, S> {
    /// Process the checkpoints entered in the settled batch
    ///
    /// Returns false when no checkpoint was entered, true when runs were
    /// replaced and propagation has to resume at the checkpoints.
    pub(crate) fn post_propagate(&mut self) -> bool {
        let entered = self.state.take_entered();
        if entered.is_empty() {
            return false;
        }
        let kb = self.kb;
        let time = self.store.propagation_time();
        self.store.set_time_of_no_return(time);
        self.state.snapshot_done(time);

        let contributing: Vec<RunId> = self
            .state
            .runs()
            .filter(|run| entered.iter().any(|node| run.is_active(*node)))
            .map(FlowRun::id)
            .collect();
        debug!(checkpoints = entered.len(), runs = contributing.len(), "taking checkpoint");

        // new runs first, from the runs as they were
        let mut continuations = Vec::with_capacity(entered.len());
        for &checkpoint in &entered {
            let fresh = self.state.allocate_run();
            let old: Vec<&FlowRun> = contributing
                .iter()
                .filter_map(|id| self.state.run(*id))
                .collect();
            continuations.push(continuation(kb, fresh, checkpoint, &old));
        }

        // persist before any retraction
        for &id in &contributing {
            let Some(run) = self.state.run(id) else {
                continue;
            };
            for node in run.active_nodes() {
                if let Some(action) = kb.node(node).action() {
                    action.take_snapshot(&mut *self.store, Source::Derived(run.source_id(node)));
                }
            }
        }
        for &id in &contributing {
            let Some(run) = self.state.remove_run(id) else {
                continue;
            };
            for node in run.active_nodes() {
                match kb.node(node).kind() {
                    NodeKind::Action(action) => {
                        action.retract(&mut *self.store, Source::Derived(run.source_id(node)));
                        self.notify_written(node);
                    }
                    NodeKind::End => self.exit_changed(node),
                    _ => {}
                }
            }
            debug!(run = %id, "run retired");
        }

        for run in continuations {
            let id = self.state.insert_run(run);
            debug!(run = %id, "run resumed");
        }
        self.rebuild_undefined_edges();
        for checkpoint in entered {
            self.state.push_pending(Trigger::Node(checkpoint));
        }
        true
    }
}
