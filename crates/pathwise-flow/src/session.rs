//! Session - one consultation over a shared flow set
//!
//! A session owns its fact store and flow state; the flow set is shared
//! read-only between sessions. Changes are bracketed by [`Session::open`] and
//! [`Session::commit`]; only the outermost commit propagates.
//!
//! ## Commit loop
//!
//! ```text
//! changed facts + pending triggers ──▶ propagate ──┐
//!          ▲                                       │
//!          └───────────── next round ◀─────────────┘
//!                 nothing left? ──▶ checkpoint pass ──▶ resumed runs? ──▶ next round
//! ```

use crate::config::{FlowConfig, SuggestMode};
use crate::error::{Error, Result};
use crate::explain;
use crate::graph::{EdgeId, FlowSet, NodeId};
use crate::propagation::Propagator;
use crate::run::{FlowRun, RunId};
use crate::state::{FlowState, SessionView, Trigger};
use crate::strategy::OpenPaths;
use indexmap::IndexSet;
use pathwise_core::{
    Blackboard, ConditionCache, Fact, FactId, FactStore, Formula, Source, Subject, Value,
};
use std::sync::Arc;
use tracing::{debug, warn};

/// A consultation driving the flows of a [`FlowSet`]
///
/// ```
/// use pathwise_core::{Condition, Rating, Value};
/// use pathwise_flow::{Action, FlowConfig, FlowSetBuilder, Session};
/// use std::sync::Arc;
///
/// let mut builder = FlowSetBuilder::new();
/// let flow = builder.create_flow("triage").unwrap();
/// builder.set_autostart(flow, true).unwrap();
/// let start = builder.create_start_node(flow, "start").unwrap();
/// let flu = builder
///     .create_action_node(flow, "flu", Action::rate("flu", Rating::Established))
///     .unwrap();
/// builder
///     .create_edge(start, flu, Condition::choice("fever", "high"))
///     .unwrap();
///
/// let mut session = Session::new(Arc::new(builder.build().unwrap()), FlowConfig::default()).unwrap();
/// assert!(!session.is_active_node(flu));
///
/// session.set_value("fever", Value::choice("high")).unwrap();
/// assert!(session.is_active_node(flu));
/// assert_eq!(session.value(&"flu".into()), Some(&Value::Rating(Rating::Established)));
/// ```
#[derive(Debug)]
pub struct Session<S: FactStore = Blackboard> {
    kb: Arc<FlowSet>,
    store: S,
    state: FlowState,
    config: FlowConfig,
    /// Nesting depth of open transactions
    depth: usize,
}

impl Session<Blackboard> {
    /// Create a session with an empty blackboard and start its autostart flows
    pub fn new(kb: Arc<FlowSet>, config: FlowConfig) -> Result<Self> {
        Self::with_store(kb, Blackboard::new(), config)
    }
}

impl<S: FactStore> Session<S> {
    /// Create a session over an existing fact store
    ///
    /// Autostart flows are started and every start rule is checked before
    /// the session is returned.
    pub fn with_store(kb: Arc<FlowSet>, store: S, config: FlowConfig) -> Result<Self> {
        let mut session = Self {
            kb,
            store,
            state: FlowState::new(),
            config,
            depth: 0,
        };
        session.init()?;
        Ok(session)
    }

    fn init(&mut self) -> Result<()> {
        self.open();
        let kb = Arc::clone(&self.kb);
        let mut cache = ConditionCache::retractable();
        let mut propagator = self.propagator(&kb, &mut cache);
        for start in kb.autostart_nodes() {
            propagator.start(start);
        }
        for rule in kb.rules() {
            propagator.check_rule(rule.id());
        }
        propagator.propagate(Vec::new());
        self.commit()
    }

    fn propagator<'a, 'k>(
        &'a mut self,
        kb: &'k FlowSet,
        cache: &'a mut ConditionCache<'k>,
    ) -> Propagator<'a, 'k, S> {
        Propagator {
            kb,
            state: &mut self.state,
            store: &mut self.store,
            cache,
            config: &self.config,
        }
    }

    // === Transactions ===

    /// Open a propagation transaction
    ///
    /// The outermost open starts a new propagation time.
    pub fn open(&mut self) {
        if self.depth == 0 {
            self.store.advance_time();
        }
        self.depth += 1;
    }

    /// Close a transaction; the outermost commit propagates to a fixpoint
    ///
    /// Returns [`Error::PropagationDiverged`] when a batch needs more rounds
    /// than [`FlowConfig::max_rounds`]. The session stays usable, but is not
    /// settled.
    pub fn commit(&mut self) -> Result<()> {
        if self.depth == 0 {
            warn!("commit without open transaction");
            return Ok(());
        }
        self.depth -= 1;
        if self.depth > 0 {
            return Ok(());
        }

        let kb = Arc::clone(&self.kb);
        let max_rounds = self.config.max_rounds();
        let mut cache = ConditionCache::retractable();
        let mut rounds = 0;
        loop {
            let mut triggers: Vec<Trigger> = self
                .store
                .take_changes()
                .into_iter()
                .map(|fact| Trigger::Subject(Subject::Fact(fact)))
                .collect();
            triggers.extend(self.state.take_pending());

            let mut propagator = self.propagator(&kb, &mut cache);
            if triggers.is_empty() {
                if propagator.post_propagate() {
                    continue;
                }
                break;
            }
            rounds += 1;
            if rounds > max_rounds {
                return Err(Error::PropagationDiverged(max_rounds));
            }
            debug!(round = rounds, triggers = triggers.len(), "propagating");
            propagator.propagate(triggers);
        }
        Ok(())
    }

    /// Whether a transaction is open
    pub fn in_transaction(&self) -> bool {
        self.depth > 0
    }

    // === Facts ===

    /// Answer a question as the user
    pub fn set_value(&mut self, fact: impl Into<FactId>, value: impl Into<Value>) -> Result<()> {
        self.open();
        self.store.add_fact(Fact::new(fact, value, Source::User));
        self.commit()
    }

    /// Answer a question with "unknown"
    pub fn set_unknown(&mut self, fact: impl Into<FactId>) -> Result<()> {
        self.set_value(fact, Value::Unknown)
    }

    /// Withdraw the user's answer
    pub fn retract_value(&mut self, fact: impl Into<FactId>) -> Result<()> {
        self.open();
        self.store.remove_fact(&fact.into(), &Source::User);
        self.commit()
    }

    /// Current merged value of a fact
    pub fn value(&self, fact: &FactId) -> Option<&Value> {
        self.store.value(fact)
    }

    /// Evaluate a formula against the current facts and flow states
    pub fn compute(&self, formula: &Formula) -> Result<f64> {
        let view = SessionView {
            kb: &self.kb,
            state: &self.state,
            store: &self.store,
        };
        Ok(formula.eval(&view)?)
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Direct store access; changes propagate at the next outermost commit
    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Changes before this time can no longer be undone
    pub fn time_of_no_return(&self) -> u64 {
        self.store.time_of_no_return()
    }

    // === Flows ===

    /// Start a new run at a start node
    ///
    /// Returns `None` if the flow or start node does not exist.
    pub fn start_flow(&mut self, flow: &str, start: &str) -> Result<Option<RunId>> {
        let Some(node) = self.kb.find_start_node(flow, start) else {
            return Ok(None);
        };
        self.open();
        let kb = Arc::clone(&self.kb);
        let mut cache = ConditionCache::retractable();
        let mut propagator = self.propagator(&kb, &mut cache);
        let run = propagator.start(node);
        propagator.propagate(Vec::new());
        self.commit()?;
        Ok(Some(run))
    }

    pub fn kb(&self) -> &FlowSet {
        &self.kb
    }

    pub fn config(&self) -> &FlowConfig {
        &self.config
    }

    /// Live flow runs in creation order
    pub fn runs(&self) -> impl Iterator<Item = &FlowRun> {
        self.state.runs()
    }

    pub fn flow_state(&self) -> &FlowState {
        &self.state
    }

    /// Whether the node is active in any run
    pub fn is_active_node(&self, node: NodeId) -> bool {
        self.state.is_active_node(node)
    }

    /// Whether the edge fired in any run
    pub fn is_active_edge(&self, edge: EdgeId) -> bool {
        self.state.is_active_edge(edge)
    }

    /// Edges of active nodes whose guard has no answer yet
    ///
    /// Empty unless the suggest mode tracks open paths.
    pub fn undefined_edges(&self) -> &IndexSet<EdgeId> {
        self.state.undefined_edges()
    }

    // === Interview strategy ===

    /// Solutions that may still be rated positively
    pub fn suspected_solutions(&self) -> &IndexSet<FactId> {
        self.state.suspected_solutions()
    }

    /// Questions on the open paths leading to the given solutions
    pub fn discriminating_questions(&self, solutions: &[FactId]) -> IndexSet<FactId> {
        self.open_paths().discriminating_questions(solutions)
    }

    /// Information gain of asking `questions` for telling `solutions` apart
    pub fn information_gain(&self, questions: &IndexSet<FactId>, solutions: &[FactId]) -> f64 {
        self.open_paths().information_gain(questions, solutions)
    }

    fn open_paths(&self) -> OpenPaths<'_> {
        let view = SessionView {
            kb: &self.kb,
            state: &self.state,
            store: &self.store,
        };
        let precise = self.config.suggest_mode() == SuggestMode::Precise;
        OpenPaths::new(&self.kb, &self.state, &view, precise)
    }

    // === Explanation ===

    /// Subjects whose change could influence `fact`
    pub fn potential_derivation_sources(&self, fact: &FactId) -> IndexSet<Subject> {
        explain::potential_derivation_sources(&self.kb, fact)
    }

    /// Subjects that took part in deriving the current value of `fact`
    pub fn active_derivation_sources(&self, fact: &FactId) -> IndexSet<Subject> {
        explain::active_derivation_sources(&self.kb, &self.state, fact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::Action;
    use crate::builder::FlowSetBuilder;
    use crate::support::Support;
    use pathwise_core::{Condition, EvalContext, Rating};

    fn session(kb: FlowSet) -> Session {
        Session::new(Arc::new(kb), FlowConfig::default()).unwrap()
    }

    /// start -> a -(x = 1)-> b -(true)-> end
    fn linear() -> (FlowSet, [NodeId; 4]) {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("linear").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let a = b
            .create_action_node(f, "a", Action::indicate(["x_form"]))
            .unwrap();
        let node_b = b
            .create_action_node(f, "b", Action::rate("done", Rating::Established))
            .unwrap();
        let end = b.create_end_node(f, "end").unwrap();
        b.create_edge(start, a, Condition::True).unwrap();
        b.create_edge(a, node_b, Condition::equal("x", 1)).unwrap();
        b.create_edge(node_b, end, Condition::True).unwrap();
        (b.build().unwrap(), [start, a, node_b, end])
    }

    #[test]
    fn test_linear_flow() {
        let (kb, [start, a, b, end]) = linear();
        let mut session = session(kb);
        assert!(session.is_active_node(start));
        assert!(session.is_active_node(a));
        assert!(!session.is_active_node(b));
        assert!(!session.is_active_node(end));

        session.set_value("x", 1).unwrap();
        assert!(session.is_active_node(b));
        assert!(session.is_active_node(end));
        assert_eq!(
            session.value(&"done".into()),
            Some(&Value::Rating(Rating::Established))
        );

        session.set_value("x", 2).unwrap();
        assert!(session.is_active_node(a));
        assert!(!session.is_active_node(b));
        assert!(!session.is_active_node(end));
        assert_eq!(session.value(&"done".into()), None);
    }

    #[test]
    fn test_supports_match_activity() {
        let (kb, nodes) = linear();
        let mut session = session(kb);
        session.set_value("x", 1).unwrap();
        for run in session.runs() {
            for node in nodes {
                assert_eq!(run.is_active(node), !run.supports(node).is_empty());
            }
        }
        assert_eq!(session.runs().count(), 1);
    }

    #[test]
    fn test_retracting_answer_deactivates() {
        let (kb, [_, a, b, _]) = linear();
        let mut session = session(kb);
        session.set_value("x", 1).unwrap();
        session.retract_value("x").unwrap();
        assert!(session.is_active_node(a));
        assert!(!session.is_active_node(b));

        session.set_unknown("x").unwrap();
        assert!(!session.is_active_node(b));
    }

    #[test]
    fn test_nested_transactions_propagate_once() {
        let (kb, [_, _, b, _]) = linear();
        let mut session = session(kb);
        session.open();
        session.store_mut().set_user_value("x", 1);
        assert!(session.in_transaction());
        session.set_value("y", 3).unwrap();
        // still inside the outer transaction
        assert!(!session.is_active_node(b));
        session.commit().unwrap();
        assert!(session.is_active_node(b));
        assert!(!session.in_transaction());
    }

    /// outer: start -> c (calls inner) -(inner ended)-> done
    /// inner: start -> snap -> end
    fn checkpointed() -> (FlowSet, [NodeId; 5]) {
        let mut b = FlowSetBuilder::new();
        let outer = b.create_flow("outer").unwrap();
        let inner = b.create_flow("inner").unwrap();
        b.set_autostart(outer, true).unwrap();
        let o_start = b.create_start_node(outer, "start").unwrap();
        let c = b.create_composed_node(outer, "c", "inner", "start").unwrap();
        let done = b.create_end_node(outer, "done").unwrap();
        b.create_edge(o_start, c, Condition::True).unwrap();
        b.create_edge(c, done, Condition::exit_reached("inner", "end"))
            .unwrap();

        let i_start = b.create_start_node(inner, "start").unwrap();
        let snap = b.create_snapshot_node(inner, "snap").unwrap();
        let end = b.create_end_node(inner, "end").unwrap();
        b.create_edge(i_start, snap, Condition::True).unwrap();
        b.create_edge(snap, end, Condition::True).unwrap();
        (b.build().unwrap(), [o_start, c, i_start, snap, done])
    }

    #[test]
    fn test_checkpoint_replaces_run() {
        let (kb, [o_start, c, i_start, snap, done]) = checkpointed();
        let session = session(kb);

        assert_eq!(session.runs().count(), 1);
        let run = session.runs().next().unwrap();
        assert_ne!(run.id(), RunId(1));
        assert_eq!(run.roots(), &[snap, c]);
        assert!(run.is_blocked(snap));

        // still inside the call, and the call returned through the inner end
        assert!(session.is_active_node(c));
        assert!(session.is_active_node(done));
        assert!(!session.is_active_node(o_start));
        assert!(!session.is_active_node(i_start));
        assert_eq!(run.supports(c), &[Support::Root]);

        assert!(session.flow_state().latest_snapshot_time().is_some());
        assert!(!session.store().is_reversible_to(0));
    }

    /// start -> s1 -> rate -(next = yes)-> s2 -(back = yes)-> s1
    fn looping() -> (FlowSet, [NodeId; 3]) {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("loop").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let s1 = b.create_snapshot_node(f, "s1").unwrap();
        let rate = b
            .create_action_node(f, "rate", Action::rate("flu", Rating::Suggested))
            .unwrap();
        let s2 = b.create_snapshot_node(f, "s2").unwrap();
        b.create_edge(start, s1, Condition::True).unwrap();
        b.create_edge(s1, rate, Condition::True).unwrap();
        b.create_edge(rate, s2, Condition::choice("next", "yes"))
            .unwrap();
        b.create_edge(s2, s1, Condition::choice("back", "yes"))
            .unwrap();
        (b.build().unwrap(), [s1, rate, s2])
    }

    #[test]
    fn test_blocked_checkpoint_is_not_taken_again() {
        let (kb, [s1, rate, s2]) = looping();
        let mut session = session(kb);
        assert!(session.is_active_node(rate));
        let first = session.flow_state().latest_snapshot_time();

        session.set_value("next", Value::choice("yes")).unwrap();
        let second = session.flow_state().latest_snapshot_time();
        assert_ne!(first, second);
        // frozen by the checkpoint
        assert!(!session.is_active_node(rate));
        assert_eq!(
            session.value(&"flu".into()),
            Some(&Value::Rating(Rating::Suggested))
        );
        let run = session.runs().next().unwrap();
        assert!(run.is_blocked(s1));
        assert!(run.is_blocked(s2));
        let lineage = run.id();

        session.set_value("back", Value::choice("yes")).unwrap();
        assert_eq!(session.flow_state().latest_snapshot_time(), second);
        assert_eq!(session.runs().count(), 1);
        let run = session.runs().next().unwrap();
        assert_eq!(run.id(), lineage);
        assert!(run.is_active(s1));
        // a blocked checkpoint passes straight through
        assert!(session.is_active_node(rate));
    }

    /// outer: start -> c (calls inner) -(inner ended)-> done; c -(inner processed)-> handled
    /// inner: start -> snap -(finish known)-> end
    fn waiting_inside_call() -> (FlowSet, [NodeId; 5]) {
        let mut b = FlowSetBuilder::new();
        let outer = b.create_flow("outer").unwrap();
        let inner = b.create_flow("inner").unwrap();
        b.set_autostart(outer, true).unwrap();
        let o_start = b.create_start_node(outer, "start").unwrap();
        let c = b.create_composed_node(outer, "c", "inner", "start").unwrap();
        let done = b.create_end_node(outer, "done").unwrap();
        let handled = b
            .create_action_node(outer, "handled", Action::rate("handled", Rating::Established))
            .unwrap();
        b.create_edge(o_start, c, Condition::True).unwrap();
        b.create_edge(c, done, Condition::exit_reached("inner", "end"))
            .unwrap();
        b.create_edge(
            c,
            handled,
            Condition::FlowProcessed {
                flow: "inner".into(),
            },
        )
        .unwrap();

        let i_start = b.create_start_node(inner, "start").unwrap();
        let snap = b.create_snapshot_node(inner, "snap").unwrap();
        let end = b.create_end_node(inner, "end").unwrap();
        b.create_edge(i_start, snap, Condition::True).unwrap();
        b.create_edge(snap, end, Condition::known("finish")).unwrap();
        (b.build().unwrap(), [c, i_start, snap, done, handled])
    }

    #[test]
    fn test_resumed_caller_takes_exit_edges() {
        let (kb, [c, i_start, snap, done, handled]) = waiting_inside_call();
        let mut session = session(kb);

        let run = session.runs().next().unwrap();
        let lineage = run.id();
        assert_eq!(run.roots(), &[snap, c]);
        assert!(session.is_active_node(c));
        assert!(!session.is_active_node(i_start));
        assert!(!session.is_active_node(done));
        assert!(!session.is_active_node(handled));

        session.set_value("finish", true).unwrap();
        assert_eq!(session.runs().count(), 1);
        let run = session.runs().next().unwrap();
        assert_eq!(run.id(), lineage);
        assert!(run.is_active(done));
        assert!(run.is_active(handled));
        assert_eq!(
            session.value(&"handled".into()),
            Some(&Value::Rating(Rating::Established))
        );
    }

    /// start -> pa -(go)-> shared -> tail
    /// start -(route = b)-> pb -(go)-> shared
    /// a start rule on (route = b) starts a second run at start
    fn two_lineages() -> (FlowSet, [NodeId; 4]) {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("ward").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let pa = b.create_snapshot_node(f, "pa").unwrap();
        let pb = b.create_snapshot_node(f, "pb").unwrap();
        let shared = b.create_snapshot_node(f, "shared").unwrap();
        let tail = b
            .create_action_node(f, "tail", Action::rate("admitted", Rating::Established))
            .unwrap();
        b.create_edge(start, pa, Condition::True).unwrap();
        b.create_edge(start, pb, Condition::choice("route", "b"))
            .unwrap();
        b.create_edge(pa, shared, Condition::known("go")).unwrap();
        b.create_edge(pb, shared, Condition::known("go")).unwrap();
        b.create_edge(shared, tail, Condition::True).unwrap();
        b.create_start_rule(start, Condition::choice("route", "b"))
            .unwrap();
        (b.build().unwrap(), [pa, pb, shared, tail])
    }

    #[test]
    fn test_contributing_runs_merge_into_one() {
        let (kb, [pa, pb, shared, tail]) = two_lineages();
        let mut session = session(kb);
        assert_eq!(session.runs().count(), 1);
        assert!(session.runs().all(|run| run.is_blocked(pa)));

        // the rule run takes pa and pb in one batch: one continuation per checkpoint
        session.set_value("route", Value::choice("b")).unwrap();
        let runs: Vec<&FlowRun> = session.runs().collect();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].roots(), &[pa]);
        assert_eq!(runs[0].blocked().collect::<Vec<_>>(), vec![pa]);
        assert_eq!(runs[1].roots(), &[pb]);
        assert_eq!(runs[1].blocked().collect::<Vec<_>>(), vec![pb]);
        let old: Vec<RunId> = runs.iter().map(|run| run.id()).collect();
        let before = session.flow_state().latest_snapshot_time();

        // both lineages reach shared in the same batch
        session.set_value("go", true).unwrap();
        assert_eq!(session.runs().count(), 1);
        for id in old {
            assert!(session.flow_state().run(id).is_none());
        }
        let run = session.runs().next().unwrap();
        assert_eq!(run.roots(), &[shared]);
        let blocked: IndexSet<NodeId> = run.blocked().collect();
        assert_eq!(blocked.len(), 3);
        assert!(blocked.contains(&pa) && blocked.contains(&pb) && blocked.contains(&shared));
        assert!(run.is_active(tail));

        let after = session.flow_state().latest_snapshot_time();
        assert_ne!(after, before);
        assert_eq!(after, Some(session.store().propagation_time()));
    }

    /// Blackboard that counts derived contributions added and withdrawn
    #[derive(Debug, Default)]
    struct Counting {
        inner: Blackboard,
        adds: usize,
        removes: usize,
    }

    impl EvalContext for Counting {
        fn value(&self, fact: &FactId) -> Option<&Value> {
            self.inner.value(fact)
        }
    }

    impl FactStore for Counting {
        fn fact(&self, id: &FactId, source: &Source) -> Option<&Fact> {
            self.inner.fact(id, source)
        }

        fn facts(&self, id: &FactId) -> &[Fact] {
            self.inner.facts(id)
        }

        fn add_fact(&mut self, fact: Fact) {
            if matches!(fact.source, Source::Derived(_)) {
                self.adds += 1;
            }
            self.inner.add_fact(fact);
        }

        fn remove_fact(&mut self, id: &FactId, source: &Source) -> Option<Fact> {
            let removed = self.inner.remove_fact(id, source);
            if removed.is_some() && matches!(source, Source::Derived(_)) {
                self.removes += 1;
            }
            removed
        }

        fn take_changes(&mut self) -> Vec<FactId> {
            self.inner.take_changes()
        }

        fn propagation_time(&self) -> u64 {
            self.inner.propagation_time()
        }

        fn advance_time(&mut self) -> u64 {
            self.inner.advance_time()
        }

        fn time_of_no_return(&self) -> u64 {
            self.inner.time_of_no_return()
        }

        fn set_time_of_no_return(&mut self, time: u64) {
            self.inner.set_time_of_no_return(time);
        }
    }

    #[test]
    fn test_enter_and_leave_once() {
        // start -(x known)-> count; start -(y known)-> count
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("count").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let count = b
            .create_action_node(f, "count", Action::set("seen", true))
            .unwrap();
        b.create_edge(start, count, Condition::known("x")).unwrap();
        b.create_edge(start, count, Condition::known("y")).unwrap();
        let mut session = Session::with_store(
            Arc::new(b.build().unwrap()),
            Counting::default(),
            FlowConfig::default(),
        )
        .unwrap();
        assert_eq!(session.store().adds, 0);

        session.set_value("x", 1).unwrap();
        session.set_value("y", 1).unwrap();
        let run = session.runs().next().unwrap();
        assert_eq!(run.supports(count).len(), 2);
        assert_eq!(session.store().adds, 1);

        session.retract_value("x").unwrap();
        assert!(session.is_active_node(count));
        assert_eq!(session.store().removes, 0);

        session.retract_value("y").unwrap();
        assert!(!session.is_active_node(count));
        assert_eq!(session.value(&"seen".into()), None);
        assert_eq!((session.store().adds, session.store().removes), (1, 1));
    }

    #[test]
    fn test_formula_node_follows_inputs() {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("bmi").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let double = b
            .create_action_node(
                f,
                "double",
                Action::formula(
                    "doubled",
                    Formula::Mul(Box::new(Formula::fact("weight")), Box::new(Formula::Lit(2.0))),
                ),
            )
            .unwrap();
        b.create_edge(start, double, Condition::True).unwrap();
        let mut session = session(b.build().unwrap());

        // active, but nothing to compute yet
        assert!(session.is_active_node(double));
        assert_eq!(session.value(&"doubled".into()), None);

        session.set_value("weight", 40).unwrap();
        assert_eq!(session.value(&"doubled".into()), Some(&Value::Float(80.0)));
        session.set_value("weight", 50).unwrap();
        assert_eq!(session.value(&"doubled".into()), Some(&Value::Float(100.0)));
    }

    #[test]
    fn test_compute() {
        let (kb, _) = linear();
        let mut session = session(kb);
        let formula = Formula::Div(Box::new(Formula::fact("x")), Box::new(Formula::Lit(4.0)));
        assert!(matches!(
            session.compute(&formula),
            Err(Error::Core(pathwise_core::Error::NoValue(_)))
        ));
        session.set_value("x", 2).unwrap();
        assert_eq!(session.compute(&formula).unwrap(), 0.5);
    }

    #[test]
    fn test_start_rule() {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("urgent").unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let alarm = b
            .create_action_node(f, "alarm", Action::rate("emergency", Rating::Established))
            .unwrap();
        b.create_edge(start, alarm, Condition::True).unwrap();
        b.create_start_rule(start, Condition::choice("pain", "severe"))
            .unwrap();
        let mut session = session(b.build().unwrap());
        assert_eq!(session.runs().count(), 0);

        session.set_value("pain", Value::choice("severe")).unwrap();
        assert!(session.is_active_node(alarm));
        assert_eq!(session.runs().count(), 1);

        session.set_value("pain", Value::choice("mild")).unwrap();
        assert!(!session.is_active_node(alarm));
        assert_eq!(session.runs().count(), 0);
    }

    #[test]
    fn test_start_flow_by_name() {
        let (mut kb, [_, a, _, _]) = linear();
        kb.flows[0].autostart = false;
        let mut session = session(kb);
        assert!(!session.is_active_node(a));

        let run = session.start_flow("linear", "start").unwrap();
        assert!(run.is_some());
        assert!(session.is_active_node(a));
        assert_eq!(session.start_flow("linear", "missing").unwrap(), None);
    }

    #[test]
    fn test_user_value_beats_derivation() {
        let (kb, _) = linear();
        let mut session = session(kb);
        session.set_value("done", Rating::Excluded).unwrap();
        session.set_value("x", 1).unwrap();
        assert_eq!(
            session.value(&"done".into()),
            Some(&Value::Rating(Rating::Excluded))
        );
    }

    /// start -> ask -(fever = yes)-> flu; ask -(fever = no)-> cold
    fn triage(mode: SuggestMode) -> Session {
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("triage").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let ask = b
            .create_action_node(f, "ask", Action::indicate(["symptoms"]))
            .unwrap();
        let flu = b
            .create_action_node(f, "flu", Action::rate("flu", Rating::Established))
            .unwrap();
        let cold = b
            .create_action_node(f, "cold", Action::rate("cold", Rating::Established))
            .unwrap();
        b.create_edge(start, ask, Condition::True).unwrap();
        b.create_edge(ask, flu, Condition::choice("fever", "yes")).unwrap();
        b.create_edge(ask, cold, Condition::choice("fever", "no")).unwrap();
        Session::new(
            Arc::new(b.build().unwrap()),
            FlowConfig::with_suggest_mode(mode),
        )
        .unwrap()
    }

    #[test]
    fn test_suggest_mode_tracks_open_paths() {
        let mut session = triage(SuggestMode::Suggest);
        assert_eq!(session.undefined_edges().len(), 2);
        assert_eq!(session.suspected_solutions().len(), 2);
        assert_eq!(
            session.value(&"flu".into()),
            Some(&Value::Rating(Rating::Suggested))
        );

        let both = [FactId::new("flu"), FactId::new("cold")];
        let questions = session.discriminating_questions(&both);
        assert_eq!(questions.iter().collect::<Vec<_>>(), vec![&FactId::new("fever")]);
        let fever: IndexSet<FactId> = questions;
        assert!((session.information_gain(&fever, &both) - 1.0).abs() < 1e-9);

        session.set_value("fever", Value::choice("yes")).unwrap();
        assert!(session.undefined_edges().is_empty());
        assert!(session.suspected_solutions().is_empty());
        assert_eq!(
            session.value(&"flu".into()),
            Some(&Value::Rating(Rating::Established))
        );
        assert_eq!(session.value(&"cold".into()), None);
    }

    #[test]
    fn test_ignore_mode_tracks_nothing() {
        let session = triage(SuggestMode::Ignore);
        assert!(session.undefined_edges().is_empty());
        assert!(session.suspected_solutions().is_empty());
        assert_eq!(session.value(&"flu".into()), None);
    }

    #[test]
    fn test_explanations() {
        let mut session = triage(SuggestMode::Ignore);
        let flu = FactId::new("flu");
        assert!(session
            .potential_derivation_sources(&flu)
            .contains(&Subject::fact("fever")));
        assert!(session.active_derivation_sources(&flu).is_empty());

        session.set_value("fever", Value::choice("yes")).unwrap();
        assert!(session
            .active_derivation_sources(&flu)
            .contains(&Subject::fact("fever")));
    }

    #[test]
    fn test_divergence_is_reported() {
        // start -> seed -> snap -(go)-> spin; spin keeps incrementing the frozen seed
        let mut b = FlowSetBuilder::new();
        let f = b.create_flow("spin").unwrap();
        b.set_autostart(f, true).unwrap();
        let start = b.create_start_node(f, "start").unwrap();
        let seed = b
            .create_action_node(f, "seed", Action::set("counter", 0))
            .unwrap();
        let snap = b.create_snapshot_node(f, "snap").unwrap();
        let spin = b
            .create_action_node(
                f,
                "spin",
                Action::formula(
                    "counter",
                    Formula::Add(Box::new(Formula::fact("counter")), Box::new(Formula::Lit(1.0))),
                ),
            )
            .unwrap();
        b.create_edge(start, seed, Condition::True).unwrap();
        b.create_edge(seed, snap, Condition::True).unwrap();
        b.create_edge(snap, spin, Condition::known("go")).unwrap();
        let mut config = FlowConfig::default();
        config.set_max_rounds(20);
        let mut session = Session::new(Arc::new(b.build().unwrap()), config).unwrap();
        assert_eq!(session.value(&"counter".into()), Some(&Value::Int(0)));

        let result = session.set_value("go", true);
        assert!(matches!(result, Err(Error::PropagationDiverged(20))));
    }
}
