//! Memoized condition results
//!
//! Entries are keyed by condition identity (address), so the conditions must
//! outlive the cache. The knowledge base owning the conditions is immutable,
//! which makes this safe for a whole propagation batch.
//!
//! A retractable cache also records which subjects each evaluation consulted.
//! [`ConditionCache::notify_change`] then drops exactly the entries that read
//! the changed subject. Recorded subjects only ever grow: a condition that
//! later reads fewer facts keeps its old dependencies.

use crate::condition::{Condition, EvalContext, EvalSignal};
use crate::identity::{FactId, Subject};
use crate::value::Value;
use indexmap::IndexSet;
use std::cell::RefCell;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

/// Cached evaluation outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CondResult {
    True,
    False,
    /// Some referenced fact has no value yet
    Undefined,
    /// Some referenced fact was answered unknown
    Unknown,
}

impl From<std::result::Result<bool, EvalSignal>> for CondResult {
    fn from(result: std::result::Result<bool, EvalSignal>) -> Self {
        match result {
            Ok(true) => CondResult::True,
            Ok(false) => CondResult::False,
            Err(EvalSignal::NoAnswer) => CondResult::Undefined,
            Err(EvalSignal::UnknownValue) => CondResult::Unknown,
        }
    }
}

/// Identity key for a borrowed condition
#[derive(Debug, Clone, Copy)]
struct ByAddress<'c>(&'c Condition);

impl PartialEq for ByAddress<'_> {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self.0, other.0)
    }
}

impl Eq for ByAddress<'_> {}

impl Hash for ByAddress<'_> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self.0, state);
    }
}

/// Memo of condition results for one session
#[derive(Debug, Default)]
pub struct ConditionCache<'c> {
    results: HashMap<ByAddress<'c>, CondResult>,
    /// Present only for retractable caches
    dependencies: Option<HashMap<Subject, IndexSet<ByAddress<'c>>>>,
}

impl<'c> ConditionCache<'c> {
    /// A cache that is valid only while nothing changes
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            dependencies: None,
        }
    }

    /// A cache that tracks consulted subjects for selective invalidation
    pub fn retractable() -> Self {
        Self {
            results: HashMap::new(),
            dependencies: Some(HashMap::new()),
        }
    }

    pub fn is_retractable(&self) -> bool {
        self.dependencies.is_some()
    }

    /// Evaluate a condition, or return the memoized result
    pub fn result<C: EvalContext + ?Sized>(&mut self, cond: &'c Condition, ctx: &C) -> CondResult {
        let key = ByAddress(cond);
        if let Some(result) = self.results.get(&key) {
            return *result;
        }
        let result = match self.dependencies.as_mut() {
            Some(dependencies) => {
                let recorder = Recording::new(ctx);
                let result = CondResult::from(cond.eval(&recorder));
                for subject in recorder.into_consulted() {
                    dependencies.entry(subject).or_default().insert(key);
                }
                result
            }
            None => CondResult::from(cond.eval(ctx)),
        };
        self.results.insert(key, result);
        result
    }

    pub fn is_true<C: EvalContext + ?Sized>(&mut self, cond: &'c Condition, ctx: &C) -> bool {
        self.result(cond, ctx) == CondResult::True
    }

    pub fn is_false<C: EvalContext + ?Sized>(&mut self, cond: &'c Condition, ctx: &C) -> bool {
        self.result(cond, ctx) == CondResult::False
    }

    pub fn is_undefined<C: EvalContext + ?Sized>(&mut self, cond: &'c Condition, ctx: &C) -> bool {
        self.result(cond, ctx) == CondResult::Undefined
    }

    /// Drop the entries that consulted the subject
    ///
    /// A non-retractable cache cannot tell which entries are affected and is
    /// cleared completely.
    pub fn notify_change(&mut self, subject: &Subject) {
        match self.dependencies.as_ref() {
            Some(dependencies) => {
                if let Some(dependants) = dependencies.get(subject) {
                    for key in dependants {
                        self.results.remove(key);
                    }
                }
            }
            None => self.results.clear(),
        }
    }

    pub fn notify_changes<'s>(&mut self, subjects: impl IntoIterator<Item = &'s Subject>) {
        for subject in subjects {
            self.notify_change(subject);
        }
    }

    /// Forget every result and every recorded dependency
    pub fn clear(&mut self) {
        self.results.clear();
        if let Some(dependencies) = self.dependencies.as_mut() {
            dependencies.clear();
        }
    }

    /// Number of memoized results
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Context wrapper that records every subject read through it
struct Recording<'a, C: ?Sized> {
    inner: &'a C,
    consulted: RefCell<IndexSet<Subject>>,
}

impl<'a, C: EvalContext + ?Sized> Recording<'a, C> {
    fn new(inner: &'a C) -> Self {
        Self {
            inner,
            consulted: RefCell::new(IndexSet::new()),
        }
    }

    fn into_consulted(self) -> IndexSet<Subject> {
        self.consulted.into_inner()
    }
}

impl<C: EvalContext + ?Sized> EvalContext for Recording<'_, C> {
    fn value(&self, fact: &FactId) -> Option<&Value> {
        self.consulted.borrow_mut().insert(Subject::Fact(fact.clone()));
        self.inner.value(fact)
    }

    fn is_exit_reached(&self, flow: &str, exit: &str) -> bool {
        self.consulted
            .borrow_mut()
            .insert(Subject::Flow(flow.to_string()));
        self.inner.is_exit_reached(flow, exit)
    }

    fn is_flow_processed(&self, flow: &str) -> bool {
        self.consulted
            .borrow_mut()
            .insert(Subject::Flow(flow.to_string()));
        self.inner.is_flow_processed(flow)
    }
}
