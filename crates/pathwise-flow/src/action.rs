//! Actions run by action nodes
//!
//! An action derives facts when its node is entered and withdraws them when
//! the node is left. Every fact is contributed under the node's own
//! [`Source`], so the same node active in two flow runs contributes twice.

use pathwise_core::{Fact, FactId, FactStore, Formula, Indication, Rating, Source, Value};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Value written by a [`Action::SetValue`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Assignment {
    Value(Value),
    Formula(Formula),
}

/// A derivation performed while a node is active
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Action {
    /// Derive a value for a fact
    SetValue { fact: FactId, value: Assignment },
    /// Mark questions as to be asked (or not asked, for contra-indication)
    Indicate {
        facts: Vec<FactId>,
        indication: Indication,
    },
    /// Rate a solution
    Rate { solution: FactId, rating: Rating },
}

impl Action {
    pub fn set(fact: impl Into<FactId>, value: impl Into<Value>) -> Self {
        Action::SetValue {
            fact: fact.into(),
            value: Assignment::Value(value.into()),
        }
    }

    pub fn formula(fact: impl Into<FactId>, formula: Formula) -> Self {
        Action::SetValue {
            fact: fact.into(),
            value: Assignment::Formula(formula),
        }
    }

    pub fn indicate(facts: impl IntoIterator<Item = impl Into<FactId>>) -> Self {
        Action::Indicate {
            facts: facts.into_iter().map(Into::into).collect(),
            indication: Indication::Indicated,
        }
    }

    /// Ask the questions again, even if they were answered already
    pub fn indicate_repeated(facts: impl IntoIterator<Item = impl Into<FactId>>) -> Self {
        Action::Indicate {
            facts: facts.into_iter().map(Into::into).collect(),
            indication: Indication::RepeatedIndicated,
        }
    }

    pub fn rate(solution: impl Into<FactId>, rating: Rating) -> Self {
        Action::Rate {
            solution: solution.into(),
            rating,
        }
    }

    /// Facts this action writes
    pub fn backward_objects(&self) -> Vec<FactId> {
        match self {
            Action::SetValue { fact, .. } => vec![fact.clone()],
            Action::Indicate { facts, .. } => facts.clone(),
            Action::Rate { solution, .. } => vec![solution.clone()],
        }
    }

    /// Facts this action reads
    pub fn forward_objects(&self) -> Vec<FactId> {
        match self {
            Action::SetValue {
                value: Assignment::Formula(formula),
                ..
            } => formula.facts(),
            _ => Vec::new(),
        }
    }

    /// Solution rated positively by this action, if any
    pub fn positive_solution(&self) -> Option<&FactId> {
        match self {
            Action::Rate { solution, rating } if rating.is_positive() => Some(solution),
            _ => None,
        }
    }

    /// Whether this action asks its questions again
    pub fn is_repeated_indication(&self) -> bool {
        matches!(
            self,
            Action::Indicate {
                indication: Indication::RepeatedIndicated,
                ..
            }
        )
    }

    /// Derive this action's facts
    pub(crate) fn execute<S: FactStore + ?Sized>(&self, store: &mut S, source: Source) {
        match self {
            Action::SetValue { fact, value } => match value {
                Assignment::Value(value) => {
                    store.add_fact(Fact::new(fact.clone(), value.clone(), source));
                }
                Assignment::Formula(formula) => match formula.eval(&*store) {
                    Ok(number) => store.add_fact(Fact::new(fact.clone(), number, source)),
                    Err(error) => {
                        debug!(fact = %fact, error = %error, "formula not computable");
                        store.remove_fact(fact, &source);
                    }
                },
            },
            Action::Indicate { facts, indication } => {
                for fact in facts {
                    store.add_fact(Fact::new(fact.clone(), *indication, source));
                }
            }
            Action::Rate { solution, rating } => {
                store.add_fact(Fact::new(solution.clone(), *rating, source));
            }
        }
    }

    /// Withdraw every fact this action derived under `source`
    pub(crate) fn retract<S: FactStore + ?Sized>(&self, store: &mut S, source: Source) {
        for fact in self.backward_objects() {
            store.remove_fact(&fact, &source);
        }
    }

    /// Persist the facts derived under `source` as snapshot facts
    pub(crate) fn take_snapshot<S: FactStore + ?Sized>(&self, store: &mut S, source: Source) {
        for id in self.backward_objects() {
            let Some(value) = store.fact(&id, &source).map(|f| f.value.clone()) else {
                continue;
            };
            store.add_fact(Fact::new(id, value, Source::Snapshot));
        }
    }
}
