//! # pathwise-core
//!
//! Facts and conditions for the pathwise inference engine.
//!
//! ## Overview
//!
//! - **Values**: answers, ratings and indication states ([`Value`])
//! - **Facts**: a value contributed by a [`Source`], merged per fact with [`merge_facts`]
//! - **Blackboard**: in-memory [`FactStore`] with change tracking
//! - **Conditions**: tri-state evaluation with [`EvalSignal`] for missing and unknown answers
//! - **Cache**: memoized condition results with selective invalidation
//! - **Formulas**: numeric expressions for derived values

pub mod blackboard;
pub mod cache;
pub mod condition;
pub mod error;
pub mod fact;
pub mod formula;
pub mod identity;
pub mod value;

pub use blackboard::{Blackboard, FactStore};
pub use cache::{CondResult, ConditionCache};
pub use condition::{Condition, EvalContext, EvalResult, EvalSignal};
pub use error::{Error, Result};
pub use fact::{merge_facts, merge_indication_facts, Fact, Source};
pub use formula::Formula;
pub use identity::{FactId, SourceId, Subject};
pub use value::{Indication, Rating, Value};
