//! Fact store
//!
//! [`FactStore`] is what the flow engine needs from the session's fact
//! storage. [`Blackboard`] is the in-memory implementation.

use crate::condition::EvalContext;
use crate::fact::{merge_facts, Fact, Source};
use crate::identity::FactId;
use crate::value::Value;
use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Storage of facts for one session
pub trait FactStore: EvalContext {
    /// The contribution of one source, if any
    fn fact(&self, id: &FactId, source: &Source) -> Option<&Fact>;

    /// All contributions for a fact, in merge order
    fn facts(&self, id: &FactId) -> &[Fact];

    /// Add or replace the contribution of `fact.source`
    fn add_fact(&mut self, fact: Fact);

    /// Withdraw the contribution of a source
    fn remove_fact(&mut self, id: &FactId, source: &Source) -> Option<Fact>;

    /// Facts whose merged value changed since the last call, in change order
    fn take_changes(&mut self) -> Vec<FactId>;

    /// Current propagation time
    fn propagation_time(&self) -> u64;

    /// Start a new propagation and return its time
    fn advance_time(&mut self) -> u64;

    /// Changes before this time can no longer be undone
    fn time_of_no_return(&self) -> u64;

    /// Raise the time of no return; lowering it is ignored
    fn set_time_of_no_return(&mut self, time: u64);
}

/// In-memory fact store
///
/// Contributions are kept per fact in arrival order, except that user
/// contributions go first. The merged value is recomputed with
/// [`merge_facts`] and a change is recorded only when it actually differs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Blackboard {
    facts: IndexMap<FactId, Vec<Fact>>,
    merged: IndexMap<FactId, Value>,
    changes: IndexSet<FactId>,
    time: u64,
    time_of_no_return: u64,
}

impl Blackboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a user answer
    pub fn set_user_value(&mut self, id: impl Into<FactId>, value: impl Into<Value>) {
        self.add_fact(Fact::new(id, value, Source::User));
    }

    /// Withdraw a user answer
    pub fn remove_user_value(&mut self, id: &FactId) -> Option<Fact> {
        self.remove_fact(id, &Source::User)
    }

    /// Facts that currently have a value
    pub fn valued_facts(&self) -> impl Iterator<Item = (&FactId, &Value)> {
        self.merged.iter()
    }

    /// Whether a state recorded at `time` could still be restored
    pub fn is_reversible_to(&self, time: u64) -> bool {
        time >= self.time_of_no_return
    }

    fn remerge(&mut self, id: &FactId) {
        let winner = self
            .facts
            .get(id)
            .and_then(|facts| merge_facts(facts))
            .map(|fact| fact.value.clone());
        let previous = match winner {
            Some(value) => self.merged.insert(id.clone(), value),
            None => self.merged.shift_remove(id),
        };
        if previous.as_ref() != self.merged.get(id) {
            self.changes.insert(id.clone());
        }
    }
}

impl EvalContext for Blackboard {
    fn value(&self, fact: &FactId) -> Option<&Value> {
        self.merged.get(fact)
    }
}

impl FactStore for Blackboard {
    fn fact(&self, id: &FactId, source: &Source) -> Option<&Fact> {
        self.facts.get(id)?.iter().find(|f| f.source == *source)
    }

    fn facts(&self, id: &FactId) -> &[Fact] {
        self.facts.get(id).map(Vec::as_slice).unwrap_or(&[])
    }

    fn add_fact(&mut self, fact: Fact) {
        let id = fact.id.clone();
        let entries = self.facts.entry(id.clone()).or_default();
        if let Some(existing) = entries.iter_mut().find(|f| f.source == fact.source) {
            *existing = fact;
        } else if fact.source == Source::User {
            entries.insert(0, fact);
        } else {
            entries.push(fact);
        }
        self.remerge(&id);
    }

    fn remove_fact(&mut self, id: &FactId, source: &Source) -> Option<Fact> {
        let entries = self.facts.get_mut(id)?;
        let index = entries.iter().position(|f| f.source == *source)?;
        let removed = entries.remove(index);
        if entries.is_empty() {
            self.facts.shift_remove(id);
        }
        self.remerge(id);
        Some(removed)
    }

    fn take_changes(&mut self) -> Vec<FactId> {
        std::mem::take(&mut self.changes).into_iter().collect()
    }

    fn propagation_time(&self) -> u64 {
        self.time
    }

    fn advance_time(&mut self) -> u64 {
        self.time += 1;
        self.time
    }

    fn time_of_no_return(&self) -> u64 {
        self.time_of_no_return
    }

    fn set_time_of_no_return(&mut self, time: u64) {
        self.time_of_no_return = self.time_of_no_return.max(time);
    }
}
