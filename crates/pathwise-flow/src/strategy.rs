//! Interview-strategy support
//!
//! Looks ahead from the undefined edges of a session: which nodes may still
//! become active, which solutions they would rate, and which questions decide
//! between those solutions.

use crate::graph::{EdgeId, FlowSet, NodeId, NodeKind};
use crate::state::FlowState;
use indexmap::{IndexMap, IndexSet};
use pathwise_core::{CondResult, EvalContext, FactId, Subject};

/// Node -> nodes it was reached from during the look-ahead
pub(crate) type Predecessors = IndexMap<NodeId, IndexSet<NodeId>>;

/// Nodes that may still become active, starting from `open`
///
/// Active nodes are never entered again, called flows are entered at their
/// start node, and leaving a flow returns into the composed nodes of the runs
/// that called it. In precise mode edges whose guard is already false are not
/// followed.
pub(crate) fn find_potential_nodes<C: EvalContext + ?Sized>(
    kb: &FlowSet,
    state: &FlowState,
    ctx: &C,
    mut open: IndexSet<NodeId>,
    precise: bool,
    mut traversal: Option<&mut Predecessors>,
) -> IndexSet<NodeId> {
    let mut closed = IndexSet::new();
    let mut record = |from: NodeId, to: NodeId| {
        if let Some(map) = traversal.as_deref_mut() {
            map.entry(to).or_default().insert(from);
        }
    };

    while let Some(node) = open.shift_remove_index(0) {
        closed.insert(node);
        let node_def = kb.node(node);

        match node_def.kind() {
            NodeKind::Composed { .. } => {
                if let Some(start) = kb.called_start(node) {
                    record(node, start);
                    if !closed.contains(&start) && !state.is_active_node(start) {
                        open.insert(start);
                    }
                }
            }
            NodeKind::End => {
                let flow = kb.flow_name(node);
                let callers: IndexSet<NodeId> = state
                    .runs()
                    .flat_map(|run| run.roots().iter().copied().chain(run.active_nodes()))
                    .filter(|caller| {
                        kb.node(*caller)
                            .call()
                            .is_some_and(|(called, _)| called == flow)
                    })
                    .collect();
                for caller in callers {
                    record(node, caller);
                    if !closed.contains(&caller) {
                        open.insert(caller);
                    }
                }
                continue;
            }
            _ => {}
        }

        for &edge in node_def.outgoing() {
            let next = kb.edge(edge).target();
            record(node, next);
            if closed.contains(&next) || state.is_active_node(next) {
                continue;
            }
            if precise && !open.contains(&next) {
                let guard = kb.edge(edge).guard();
                if CondResult::from(guard.eval(ctx)) == CondResult::False {
                    continue;
                }
            }
            open.insert(next);
        }
    }
    closed
}

/// Look-ahead over the open paths of one session
pub(crate) struct OpenPaths<'a> {
    kb: &'a FlowSet,
    state: &'a FlowState,
    predecessors: Predecessors,
}

impl<'a> OpenPaths<'a> {
    pub(crate) fn new<C: EvalContext + ?Sized>(
        kb: &'a FlowSet,
        state: &'a FlowState,
        ctx: &C,
        precise: bool,
    ) -> Self {
        let starts = targets_of(kb, state.undefined_edges());
        let mut predecessors = Predecessors::new();
        find_potential_nodes(kb, state, ctx, starts, precise, Some(&mut predecessors));
        Self {
            kb,
            state,
            predecessors,
        }
    }

    /// Questions whose answer decides whether the given solutions are reached
    pub(crate) fn discriminating_questions(&self, solutions: &[FactId]) -> IndexSet<FactId> {
        let targets = self.deriving_nodes(solutions);
        self.edges_towards(targets)
            .into_iter()
            .flat_map(|edge| self.kb.edge(edge).guard().subjects())
            .filter_map(|subject| match subject {
                Subject::Fact(fact) => Some(fact),
                Subject::Flow(_) => None,
            })
            .collect()
    }

    /// Entropy of the split the questions induce on the solutions, in bits
    ///
    /// Solutions are grouped by the open edges on their paths that read one of
    /// the questions. Every solution weighs the same.
    pub(crate) fn information_gain(&self, questions: &IndexSet<FactId>, solutions: &[FactId]) -> f64 {
        let suspected = self.state.suspected_solutions();
        if !solutions.iter().any(|s| suspected.contains(s)) {
            return 0.0;
        }
        let mut pots: IndexMap<Vec<EdgeId>, f64> = IndexMap::new();
        let mut undiscriminated = 0.0;
        let mut total = 0.0;
        for solution in solutions {
            let weight = 1.0;
            total += weight;
            let mut edges: Vec<EdgeId> = self
                .open_conditions(solution)
                .into_iter()
                .filter(|edge| {
                    self.kb
                        .edge(*edge)
                        .guard()
                        .subjects()
                        .iter()
                        .any(|subject| subject.as_fact().is_some_and(|f| questions.contains(f)))
                })
                .collect();
            if edges.is_empty() {
                undiscriminated += weight;
            } else {
                edges.sort();
                *pots.entry(edges).or_insert(0.0) += weight;
            }
        }
        pots.values()
            .map(|weight| {
                let p = (weight + undiscriminated) / total;
                -p * p.log2()
            })
            .sum()
    }

    fn open_conditions(&self, solution: &FactId) -> IndexSet<EdgeId> {
        if !self.state.suspected_solutions().contains(solution) {
            return IndexSet::new();
        }
        let targets = self.kb.derivers_of(solution).iter().copied().collect();
        self.edges_towards(targets)
    }

    fn deriving_nodes(&self, solutions: &[FactId]) -> IndexSet<NodeId> {
        let suspected = self.state.suspected_solutions();
        solutions
            .iter()
            .filter(|solution| suspected.contains(*solution))
            .flat_map(|solution| self.kb.derivers_of(solution).iter().copied())
            .collect()
    }

    /// Edges the look-ahead may take on its way to the targets
    fn edges_towards(&self, targets: IndexSet<NodeId>) -> IndexSet<EdgeId> {
        let mut traversed = IndexSet::new();
        let mut stack: Vec<NodeId> = targets.into_iter().collect();
        while let Some(node) = stack.pop() {
            if !traversed.insert(node) {
                continue;
            }
            if let Some(preds) = self.predecessors.get(&node) {
                stack.extend(preds.iter().copied());
            }
        }
        let undefined = self.state.undefined_edges();
        traversed
            .iter()
            .flat_map(|node| self.kb.node(*node).incoming().iter().copied())
            .filter(|edge| {
                undefined.contains(edge) || traversed.contains(&self.kb.edge(*edge).source())
            })
            .collect()
    }
}

/// Target nodes of a set of edges
pub(crate) fn targets_of(kb: &FlowSet, edges: &IndexSet<EdgeId>) -> IndexSet<NodeId> {
    edges.iter().map(|edge| kb.edge(*edge).target()).collect()
}
