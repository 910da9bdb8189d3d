//! Facts, their sources, and the merge policy applied when several sources
//! contribute a value for the same fact

use crate::identity::{FactId, SourceId};
use crate::value::{Indication, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Who contributed a fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Source {
    /// Entered by the user
    User,
    /// Derived by a flow node in a flow run
    Derived(SourceId),
    /// Proposed by the interview strategy for solutions that are still reachable
    Suggest,
    /// Frozen by a checkpoint
    Snapshot,
}

impl Source {
    /// Normal sources win every merge against suggest and snapshot sources
    pub fn is_normal(&self) -> bool {
        matches!(self, Source::User | Source::Derived(_))
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::User => write!(f, "user"),
            Source::Derived(id) => write!(f, "derived({})", id),
            Source::Suggest => write!(f, "suggest"),
            Source::Snapshot => write!(f, "snapshot"),
        }
    }
}

/// A value for a fact, as contributed by one source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fact {
    pub id: FactId,
    pub value: Value,
    pub source: Source,
}

impl Fact {
    pub fn new(id: impl Into<FactId>, value: impl Into<Value>, source: Source) -> Self {
        Self {
            id: id.into(),
            value: value.into(),
            source,
        }
    }
}

/// Pick the winning contribution for one fact
///
/// The first normal fact wins outright. Without one, the first suggested
/// fact wins, and only then the first snapshot fact. Indication facts are
/// merged by [`merge_indication_facts`].
pub fn merge_facts(facts: &[Fact]) -> Option<&Fact> {
    let first = facts.first()?;
    if matches!(first.value, Value::Indication(_)) {
        return merge_indication_facts(facts);
    }
    let mut suggested = None;
    let mut snapshot = None;
    for fact in facts {
        match fact.source {
            Source::Suggest => {
                suggested.get_or_insert(fact);
            }
            Source::Snapshot => {
                snapshot.get_or_insert(fact);
            }
            _ => return Some(fact),
        }
    }
    suggested.or(snapshot)
}

/// Merge indication facts
///
/// A contra-indication wins immediately. Otherwise the most specific
/// indication state wins, the earliest one among equals.
pub fn merge_indication_facts(facts: &[Fact]) -> Option<&Fact> {
    let mut best: Option<(&Fact, Indication)> = None;
    for fact in facts {
        let Some(state) = fact.value.as_indication() else {
            continue;
        };
        if state.is_contra_indicated() {
            return Some(fact);
        }
        match best {
            Some((_, current)) if current >= state => {}
            _ => best = Some((fact, state)),
        }
    }
    best.map(|(fact, _)| fact)
}
