//! Propagation driver
//!
//! Reacts to changed facts and flow exits. Every changed subject is looked up
//! in the reverse guard index; the source nodes of the affected edges are
//! rechecked in every flow run. Adding the first support to a node enters it,
//! removing the last one leaves it, and either way its outgoing edges are
//! rechecked right away. Checkpoint nodes are the exception: entering them
//! only records them for the checkpoint pass at the end of the batch.
//!
//! Facts written by actions are not propagated here. They come back through
//! the fact store's change list in the session's next round.

use crate::action::Action;
use crate::config::{FlowConfig, SuggestMode};
use crate::graph::{EdgeId, FlowSet, NodeId, NodeKind, RuleId};
use crate::run::RunId;
use crate::state::{FlowState, SessionView, Trigger};
use crate::strategy;
use crate::support::Support;
use indexmap::IndexSet;
use pathwise_core::{
    CondResult, Condition, ConditionCache, Fact, FactId, FactStore, Rating, Source, SourceId,
    Subject,
};
use tracing::{error, trace};

/// Borrowed session parts for one propagation round
pub(crate) struct Propagator<'a, 'k, S: FactStore + ?Sized> {
    pub(crate) kb: &'k FlowSet,
    pub(crate) state: &'a mut FlowState,
    pub(crate) store: &'a mut S,
    pub(crate) cache: &'a mut ConditionCache<'k>,
    pub(crate) config: &'a FlowConfig,
}

impl<'a, 'k, S: FactStore + ?Sized> Propagator<'a, 'k, S> {
    /// Process a batch of triggers, and everything they raise, to a fixpoint
    pub(crate) fn propagate(&mut self, triggers: Vec<Trigger>) {
        let mut batch = triggers;
        while !batch.is_empty() {
            self.handle_batch(&batch);
            batch = self.state.take_pending();
        }
        for run in self.state.sweep_empty_runs() {
            trace!(run = %run, "flow run finished");
        }
        if self.config.tracks_open_paths() {
            self.update_suspected_solutions();
        }
    }

    fn handle_batch(&mut self, triggers: &[Trigger]) {
        let kb = self.kb;
        for trigger in triggers {
            if let Trigger::Subject(subject) = trigger {
                self.cache.notify_change(subject);
            }
        }

        let mut nodes = IndexSet::new();
        for trigger in triggers {
            match trigger {
                Trigger::Subject(subject) => {
                    nodes.extend(kb.edges_for(subject).iter().map(|e| kb.edge(*e).source()));
                }
                Trigger::Node(node) => {
                    nodes.insert(*node);
                }
            }
        }
        for node in nodes {
            for run in self.state.run_ids() {
                self.check_successors(node, run);
            }
        }

        for trigger in triggers {
            let Trigger::Subject(subject) = trigger else {
                continue;
            };
            if let Subject::Fact(fact) = subject {
                for node in kb.readers_of(fact) {
                    for run in self.state.run_ids() {
                        self.update(*node, run);
                    }
                }
            }
            for rule in kb.rules_for(subject) {
                self.check_rule(*rule);
            }
        }
    }

    /// Start a new flow run at a start node
    pub(crate) fn start(&mut self, start: NodeId) -> RunId {
        let run = self.state.create_run();
        if let Some(flow_run) = self.state.run_mut(run) {
            flow_run.add_root(start);
        }
        trace!(node = %start, run = %run, "starting flow");
        self.add_support(start, Support::Root, run);
        run
    }

    /// Start or stop the runs held by a start rule
    pub(crate) fn check_rule(&mut self, rule: RuleId) {
        let kb = self.kb;
        let rule_def = kb.rule(rule);
        let holds = self.eval(rule_def.condition()) == CondResult::True;
        let support = Support::Rule(rule);
        let holders: Vec<RunId> = self
            .state
            .runs()
            .filter(|run| run.supports(rule_def.start()).contains(&support))
            .map(|run| run.id())
            .collect();
        if holds && holders.is_empty() {
            let run = self.state.create_run();
            if let Some(flow_run) = self.state.run_mut(run) {
                flow_run.add_root(rule_def.start());
            }
            self.add_support(rule_def.start(), support, run);
        } else if !holds {
            for run in holders {
                self.remove_support(rule_def.start(), support, run);
            }
        }
    }

    /// Add a support; enters the node on its first support
    pub(crate) fn add_support(&mut self, node: NodeId, support: Support, run: RunId) {
        let valid = self.is_valid(support, node, run);
        debug_assert!(valid, "invalid support {} for {} in {}", support, node, run);
        if !valid {
            error!(node = %node, run = %run, support = %support, "refusing invalid support");
            return;
        }
        let Some(flow_run) = self.state.run_mut(run) else {
            return;
        };
        if !flow_run.add_support(node, support) {
            return;
        }
        // an unblocked checkpoint continues in the checkpoint pass
        let deferred = self.kb.node(node).is_snapshot() && !flow_run.is_blocked(node);
        trace!(node = %node, run = %run, support = %support, "node entered");
        self.enter(node, run);
        if !deferred {
            self.check_successors(node, run);
        }
    }

    /// Remove a support; leaves the node when its last support is gone
    pub(crate) fn remove_support(&mut self, node: NodeId, support: Support, run: RunId) {
        let Some(flow_run) = self.state.run_mut(run) else {
            return;
        };
        if !flow_run.remove_support(node, support) {
            return;
        }
        trace!(node = %node, run = %run, "node left");
        self.leave(node, run);
        self.check_successors(node, run);
    }

    /// Recheck the outgoing edges of a node in one run
    pub(crate) fn check_successors(&mut self, node: NodeId, run: RunId) {
        let kb = self.kb;
        if self.is_active(node, run) {
            self.add_undefined_edges(node);
        } else {
            self.remove_undefined_edges(node);
        }
        for &edge in kb.node(node).outgoing() {
            let target = kb.edge(edge).target();
            let activated = self
                .state
                .run(run)
                .is_some_and(|flow_run| flow_run.is_activated(edge));
            // entering a successor may have left this node through a cycle
            if self.is_active(node, run) {
                let holds = self.eval_edge(edge);
                if !activated && holds {
                    self.add_support(target, Support::Edge(edge), run);
                } else if activated && !holds {
                    self.remove_support(target, Support::Edge(edge), run);
                }
            } else if activated {
                self.remove_support(target, Support::Edge(edge), run);
            }
        }
    }

    /// Re-run the action of a backward-dependent node
    fn update(&mut self, node: NodeId, run: RunId) {
        if !self.is_active(node, run) {
            return;
        }
        let Some(action) = self.kb.node(node).action() else {
            return;
        };
        let source = self.source(node, run);
        action.execute(&mut *self.store, source);
        self.notify_written(node);
        self.add_undefined_edges(node);
    }

    fn enter(&mut self, node: NodeId, run: RunId) {
        let kb = self.kb;
        match kb.node(node).kind() {
            NodeKind::Action(action) => {
                let source = self.source(node, run);
                action.execute(&mut *self.store, source);
                self.notify_written(node);
            }
            NodeKind::Composed { .. } => {
                if let Some(start) = kb.called_start(node) {
                    self.add_support(start, Support::Call(node), run);
                }
            }
            NodeKind::End => self.exit_changed(node),
            NodeKind::Snapshot => {
                let blocked = self
                    .state
                    .run(run)
                    .is_some_and(|flow_run| flow_run.is_blocked(node));
                if !blocked {
                    self.state.mark_entered(node);
                }
            }
            NodeKind::Start | NodeKind::Comment(_) => {}
        }
    }

    fn leave(&mut self, node: NodeId, run: RunId) {
        let kb = self.kb;
        match kb.node(node).kind() {
            NodeKind::Action(action) => {
                let source = self.source(node, run);
                action.retract(&mut *self.store, source);
                self.notify_written(node);
            }
            NodeKind::Composed { .. } => {
                if let Some(start) = kb.called_start(node) {
                    self.remove_support(start, Support::Call(node), run);
                }
            }
            NodeKind::End => self.exit_changed(node),
            NodeKind::Start | NodeKind::Snapshot | NodeKind::Comment(_) => {}
        }
    }

    /// An exit node was entered or left: guards on its flow must be rechecked
    pub(crate) fn exit_changed(&mut self, node: NodeId) {
        let subject = Subject::Flow(self.kb.flow_name(node).to_string());
        self.cache.notify_change(&subject);
        self.state.push_pending(Trigger::Subject(subject));
    }

    /// Facts written by a node may have changed; drop stale guard results now
    pub(crate) fn notify_written(&mut self, node: NodeId) {
        for fact in self.kb.node(node).backward_objects() {
            self.cache.notify_change(&Subject::Fact(fact));
        }
    }

    fn is_valid(&mut self, support: Support, node: NodeId, run: RunId) -> bool {
        let kb = self.kb;
        match support {
            Support::Root => true,
            Support::Edge(edge) => {
                let edge_def = kb.edge(edge);
                edge_def.target() == node
                    && self.is_active(edge_def.source(), run)
                    && self.eval_edge(edge)
            }
            Support::Call(caller) => {
                self.is_active(caller, run) && kb.called_start(caller) == Some(node)
            }
            Support::Rule(rule) => {
                kb.rule(rule).start() == node
                    && self.eval(kb.rule(rule).condition()) == CondResult::True
            }
        }
    }

    fn is_active(&self, node: NodeId, run: RunId) -> bool {
        self.state
            .run(run)
            .is_some_and(|flow_run| flow_run.is_active(node))
    }

    fn source(&self, node: NodeId, run: RunId) -> Source {
        Source::Derived(SourceId::new(run.raw(), node.raw()))
    }

    fn eval_edge(&mut self, edge: EdgeId) -> bool {
        let kb = self.kb;
        self.eval(kb.edge(edge).guard()) == CondResult::True
    }

    pub(crate) fn eval(&mut self, condition: &'k Condition) -> CondResult {
        let view = SessionView {
            kb: self.kb,
            state: &*self.state,
            store: &*self.store,
        };
        self.cache.result(condition, &view)
    }

    // === Open paths ===

    /// Track the outgoing edges of an active node whose guard is still undefined
    ///
    /// A node asking its questions again keeps every outgoing edge open,
    /// answered or not.
    pub(crate) fn add_undefined_edges(&mut self, node: NodeId) {
        if !self.config.tracks_open_paths() {
            return;
        }
        let kb = self.kb;
        let repeated = kb
            .node(node)
            .action()
            .is_some_and(Action::is_repeated_indication);
        for &edge in kb.node(node).outgoing() {
            let undefined =
                repeated || self.eval(kb.edge(edge).guard()) == CondResult::Undefined;
            self.state.set_undefined(edge, undefined);
        }
    }

    fn remove_undefined_edges(&mut self, node: NodeId) {
        if !self.config.tracks_open_paths() || self.state.is_active_node(node) {
            return;
        }
        for &edge in self.kb.node(node).outgoing() {
            self.state.set_undefined(edge, false);
        }
    }

    /// Rebuild the undefined edges from the active nodes of every run
    pub(crate) fn rebuild_undefined_edges(&mut self) {
        if !self.config.tracks_open_paths() {
            return;
        }
        self.state.clear_undefined();
        for node in self.state.active_nodes() {
            self.add_undefined_edges(node);
        }
    }

    /// Suggest every solution that may still be reached, withdraw the others
    fn update_suspected_solutions(&mut self) {
        let precise = self.config.suggest_mode() == SuggestMode::Precise;
        let starts: IndexSet<NodeId> = self
            .state
            .undefined_edges()
            .iter()
            .map(|edge| self.kb.edge(*edge).target())
            .collect();
        let view = SessionView {
            kb: self.kb,
            state: &*self.state,
            store: &*self.store,
        };
        let nodes = strategy::find_potential_nodes(self.kb, &*self.state, &view, starts, precise, None);
        let solutions: IndexSet<FactId> = nodes
            .iter()
            .filter_map(|node| self.kb.node(*node).action()?.positive_solution().cloned())
            .collect();

        let previous = self.state.replace_suspected(solutions.clone());
        for solution in previous.difference(&solutions) {
            self.store.remove_fact(solution, &Source::Suggest);
        }
        for solution in solutions.difference(&previous) {
            self.store
                .add_fact(Fact::new(solution.clone(), Rating::Suggested, Source::Suggest));
        }
    }
}
