//! Tri-state condition evaluation
//!
//! A condition evaluates to `true` or `false`, or raises one of two signals:
//! [`EvalSignal::NoAnswer`] when a referenced fact has no value yet, and
//! [`EvalSignal::UnknownValue`] when it was explicitly answered unknown.
//! Signals are part of the evaluation contract, not errors.
//!
//! Composite precedence (left to right over the terms):
//! - `And`: the first `false` wins and discards earlier signals; otherwise
//!   `NoAnswer` beats `UnknownValue`, which beats `true`.
//! - `Or`: the first `true` wins; otherwise `NoAnswer` beats `UnknownValue`,
//!   which beats `false`.
//! - `MofN`: counts `true` terms and fails as soon as `max` is exceeded.
//!   `UnknownValue` counts as not-true and is never raised.
//! - `Not`: inverts definite results, passes signals through.

use crate::identity::{FactId, Subject};
use crate::value::{Rating, Value};
use serde::{Deserialize, Serialize};

/// Non-boolean evaluation outcome
///
/// Ordered by precedence: `NoAnswer` dominates `UnknownValue`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum EvalSignal {
    /// A referenced fact was answered unknown
    UnknownValue,
    /// A referenced fact has no value yet
    NoAnswer,
}

/// Result of evaluating a condition
pub type EvalResult = std::result::Result<bool, EvalSignal>;

/// Read access to everything a condition may consult
pub trait EvalContext {
    /// Current merged value of a fact, `None` when nothing was contributed
    fn value(&self, fact: &FactId) -> Option<&Value>;

    /// Whether the named exit node of a flow is active in any flow run
    fn is_exit_reached(&self, _flow: &str, _exit: &str) -> bool {
        false
    }

    /// Whether any exit node of a flow is active in any flow run
    fn is_flow_processed(&self, _flow: &str) -> bool {
        false
    }
}

/// A boolean expression over facts and flow states
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Condition {
    // === Constants ===
    True,
    False,

    // === Terminals ===
    /// Fact equals the value; for multiple choice answers, the value is contained
    Equal(FactId, Value),
    /// Fact has a value other than unknown
    Known(FactId),
    /// Fact was answered unknown
    Unknown(FactId),
    /// Fact has any value, unknown included
    Answered(FactId),
    NumEqual(FactId, f64),
    NumLess(FactId, f64),
    NumLessEqual(FactId, f64),
    NumGreater(FactId, f64),
    NumGreaterEqual(FactId, f64),
    /// Numeric value within the closed interval
    NumIn { fact: FactId, low: f64, high: f64 },
    /// Any of the listed choices is selected
    AnyOf(FactId, Vec<String>),
    /// Solution carries exactly this rating (unrated counts as unclear)
    Rated(FactId, Rating),
    /// The named exit node of a flow is active
    ExitReached { flow: String, exit: String },
    /// Some exit node of a flow is active
    FlowProcessed { flow: String },

    // === Composites ===
    And(Vec<Condition>),
    Or(Vec<Condition>),
    /// Between `min` and `max` terms are true
    MofN {
        min: i32,
        max: i32,
        terms: Vec<Condition>,
    },
    Not(Box<Condition>),
}

impl Condition {
    pub fn equal(fact: impl Into<FactId>, value: impl Into<Value>) -> Self {
        Condition::Equal(fact.into(), value.into())
    }

    pub fn choice(fact: impl Into<FactId>, choice: impl Into<String>) -> Self {
        Condition::Equal(fact.into(), Value::Choice(choice.into()))
    }

    pub fn known(fact: impl Into<FactId>) -> Self {
        Condition::Known(fact.into())
    }

    pub fn exit_reached(flow: impl Into<String>, exit: impl Into<String>) -> Self {
        Condition::ExitReached {
            flow: flow.into(),
            exit: exit.into(),
        }
    }

    pub fn negate(cond: Condition) -> Self {
        Condition::Not(Box::new(cond))
    }

    /// Build an M-of-N condition; a negative `min` becomes 0 and `max` is capped at the term count
    pub fn m_of_n(min: i32, max: i32, terms: Vec<Condition>) -> Self {
        let len = i32::try_from(terms.len()).unwrap_or(i32::MAX);
        Condition::MofN {
            min: min.max(0),
            max: max.min(len),
            terms,
        }
    }

    /// Evaluate against the given context
    pub fn eval<C: EvalContext + ?Sized>(&self, ctx: &C) -> EvalResult {
        match self {
            Condition::True => Ok(true),
            Condition::False => Ok(false),

            Condition::Equal(fact, expected) => {
                if expected.is_unknown() {
                    return answered(ctx, fact).map(Value::is_unknown);
                }
                let actual = known(ctx, fact)?;
                match (actual, expected) {
                    (Value::Choices(_), Value::Choice(c)) => Ok(actual.has_choice(c)),
                    _ => Ok(actual == expected),
                }
            }
            Condition::Known(fact) => Ok(!answered(ctx, fact)?.is_unknown()),
            Condition::Unknown(fact) => Ok(answered(ctx, fact)?.is_unknown()),
            Condition::Answered(fact) => Ok(ctx.value(fact).is_some()),

            Condition::NumEqual(fact, n) => numeric(ctx, fact, |v| v == *n),
            Condition::NumLess(fact, n) => numeric(ctx, fact, |v| v < *n),
            Condition::NumLessEqual(fact, n) => numeric(ctx, fact, |v| v <= *n),
            Condition::NumGreater(fact, n) => numeric(ctx, fact, |v| v > *n),
            Condition::NumGreaterEqual(fact, n) => numeric(ctx, fact, |v| v >= *n),
            Condition::NumIn { fact, low, high } => {
                numeric(ctx, fact, |v| *low <= v && v <= *high)
            }

            Condition::AnyOf(fact, choices) => {
                let actual = known(ctx, fact)?;
                Ok(choices.iter().any(|c| actual.has_choice(c)))
            }
            Condition::Rated(fact, rating) => {
                let actual = ctx
                    .value(fact)
                    .and_then(Value::as_rating)
                    .unwrap_or(Rating::Unclear);
                Ok(actual == *rating)
            }
            Condition::ExitReached { flow, exit } => Ok(ctx.is_exit_reached(flow, exit)),
            Condition::FlowProcessed { flow } => Ok(ctx.is_flow_processed(flow)),

            Condition::And(terms) => {
                let mut signal = None;
                for term in terms {
                    match term.eval(ctx) {
                        Ok(false) => return Ok(false),
                        Ok(true) => {}
                        Err(s) => signal = signal.max(Some(s)),
                    }
                }
                signal.map_or(Ok(true), Err)
            }
            Condition::Or(terms) => {
                let mut signal = None;
                for term in terms {
                    match term.eval(ctx) {
                        Ok(true) => return Ok(true),
                        Ok(false) => {}
                        Err(s) => signal = signal.max(Some(s)),
                    }
                }
                signal.map_or(Ok(false), Err)
            }
            Condition::MofN { min, max, terms } => {
                let (min, max) = mofn_bounds(*min, *max, terms.len());
                let mut count = 0;
                let mut no_answer = false;
                for term in terms {
                    match term.eval(ctx) {
                        Ok(true) => {
                            count += 1;
                            if count > max {
                                return Ok(false);
                            }
                        }
                        Ok(false) | Err(EvalSignal::UnknownValue) => {}
                        Err(EvalSignal::NoAnswer) => no_answer = true,
                    }
                }
                if count >= min {
                    Ok(true)
                } else if no_answer {
                    Err(EvalSignal::NoAnswer)
                } else {
                    Ok(false)
                }
            }
            Condition::Not(inner) => inner.eval(ctx).map(|b| !b),
        }
    }

    /// The facts and flows this condition reads, without duplicates
    pub fn subjects(&self) -> Vec<Subject> {
        let mut out = Vec::new();
        self.collect_subjects(&mut out);
        out
    }

    fn collect_subjects(&self, out: &mut Vec<Subject>) {
        let subject = match self {
            Condition::True | Condition::False => return,
            Condition::Equal(fact, _)
            | Condition::Known(fact)
            | Condition::Unknown(fact)
            | Condition::Answered(fact)
            | Condition::NumEqual(fact, _)
            | Condition::NumLess(fact, _)
            | Condition::NumLessEqual(fact, _)
            | Condition::NumGreater(fact, _)
            | Condition::NumGreaterEqual(fact, _)
            | Condition::NumIn { fact, .. }
            | Condition::AnyOf(fact, _)
            | Condition::Rated(fact, _) => Subject::Fact(fact.clone()),
            Condition::ExitReached { flow, .. } | Condition::FlowProcessed { flow } => {
                Subject::Flow(flow.clone())
            }
            Condition::And(terms) | Condition::Or(terms) | Condition::MofN { terms, .. } => {
                for term in terms {
                    term.collect_subjects(out);
                }
                return;
            }
            Condition::Not(inner) => return inner.collect_subjects(out),
        };
        if !out.contains(&subject) {
            out.push(subject);
        }
    }

    /// Whether this condition reads the given subject
    pub fn references(&self, subject: &Subject) -> bool {
        self.subjects().contains(subject)
    }
}

fn mofn_bounds(min: i32, max: i32, len: usize) -> (usize, usize) {
    let min = usize::try_from(min).unwrap_or(0);
    let max = usize::try_from(max).unwrap_or(0).min(len);
    (min, max)
}

/// Any value, unknown included
fn answered<'v, C: EvalContext + ?Sized>(
    ctx: &'v C,
    fact: &FactId,
) -> std::result::Result<&'v Value, EvalSignal> {
    ctx.value(fact).ok_or(EvalSignal::NoAnswer)
}

/// A value other than unknown
fn known<'v, C: EvalContext + ?Sized>(
    ctx: &'v C,
    fact: &FactId,
) -> std::result::Result<&'v Value, EvalSignal> {
    match answered(ctx, fact)? {
        Value::Unknown => Err(EvalSignal::UnknownValue),
        value => Ok(value),
    }
}

fn numeric<C: EvalContext + ?Sized>(
    ctx: &C,
    fact: &FactId,
    test: impl FnOnce(f64) -> bool,
) -> EvalResult {
    Ok(known(ctx, fact)?.as_float().is_some_and(test))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct Facts(HashMap<FactId, Value>);

    impl Facts {
        fn with(mut self, id: &str, value: impl Into<Value>) -> Self {
            self.0.insert(FactId::new(id), value.into());
            self
        }
    }

    impl EvalContext for Facts {
        fn value(&self, fact: &FactId) -> Option<&Value> {
            self.0.get(fact)
        }
    }

    fn facts() -> Facts {
        Facts::default()
            .with("yes", true)
            .with("no", false)
            .with("unknown", Value::Unknown)
            .with("temp", 38.5)
    }

    // "yes" is answered true, so this is the true term; "absent" raises NoAnswer
    fn t() -> Condition {
        Condition::equal("yes", true)
    }
    fn f() -> Condition {
        Condition::equal("no", true)
    }
    fn no_answer() -> Condition {
        Condition::equal("absent", true)
    }
    fn unknown() -> Condition {
        Condition::equal("unknown", true)
    }

    #[test]
    fn test_terminal_signals() {
        let ctx = facts();
        assert_eq!(t().eval(&ctx), Ok(true));
        assert_eq!(f().eval(&ctx), Ok(false));
        assert_eq!(no_answer().eval(&ctx), Err(EvalSignal::NoAnswer));
        assert_eq!(unknown().eval(&ctx), Err(EvalSignal::UnknownValue));
    }

    #[test]
    fn test_known_and_unknown() {
        let ctx = facts();
        assert_eq!(Condition::known("yes").eval(&ctx), Ok(true));
        assert_eq!(Condition::known("unknown").eval(&ctx), Ok(false));
        assert_eq!(Condition::known("absent").eval(&ctx), Err(EvalSignal::NoAnswer));

        assert_eq!(Condition::Unknown("unknown".into()).eval(&ctx), Ok(true));
        assert_eq!(Condition::Unknown("yes".into()).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::Unknown("absent".into()).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );

        assert_eq!(Condition::Answered("unknown".into()).eval(&ctx), Ok(true));
        assert_eq!(Condition::Answered("absent".into()).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::equal("unknown", Value::Unknown).eval(&ctx),
            Ok(true)
        );
    }

    #[test]
    fn test_and_precedence() {
        let ctx = facts();
        assert_eq!(Condition::And(vec![f(), no_answer()]).eval(&ctx), Ok(false));
        assert_eq!(Condition::And(vec![no_answer(), f()]).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::And(vec![no_answer(), unknown()]).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(
            Condition::And(vec![unknown(), no_answer()]).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(
            Condition::And(vec![unknown(), t()]).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
        assert_eq!(Condition::And(vec![t(), t()]).eval(&ctx), Ok(true));
        assert_eq!(Condition::And(vec![]).eval(&ctx), Ok(true));
    }

    #[test]
    fn test_or_precedence() {
        let ctx = facts();
        assert_eq!(Condition::Or(vec![no_answer(), t()]).eval(&ctx), Ok(true));
        assert_eq!(
            Condition::Or(vec![unknown(), no_answer(), f()]).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(
            Condition::Or(vec![f(), unknown()]).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
        assert_eq!(Condition::Or(vec![f(), f()]).eval(&ctx), Ok(false));
        assert_eq!(Condition::Or(vec![]).eval(&ctx), Ok(false));
    }

    #[test]
    fn test_all_unanswered_and_all_unknown() {
        let ctx = facts();
        let both_absent = vec![no_answer(), Condition::known("other")];
        assert_eq!(
            Condition::And(both_absent.clone()).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(Condition::Or(both_absent).eval(&ctx), Err(EvalSignal::NoAnswer));

        let both_unknown = vec![unknown(), Condition::NumLess("unknown".into(), 3.0)];
        assert_eq!(
            Condition::And(both_unknown.clone()).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
        assert_eq!(
            Condition::Or(both_unknown).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
    }

    #[test]
    fn test_mofn_swallows_unknown() {
        let ctx = facts();
        let cond = Condition::m_of_n(1, 1, vec![unknown(), unknown()]);
        assert_eq!(cond.eval(&ctx), Ok(false));
    }

    #[test]
    fn test_mofn_counts() {
        let ctx = facts();
        assert_eq!(Condition::m_of_n(1, 2, vec![t(), f()]).eval(&ctx), Ok(true));
        assert_eq!(Condition::m_of_n(1, 1, vec![t(), t()]).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::m_of_n(2, 2, vec![t(), no_answer()]).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(Condition::m_of_n(2, 2, vec![t(), f()]).eval(&ctx), Ok(false));
    }

    #[test]
    fn test_mofn_bounds_are_clamped() {
        let cond = Condition::m_of_n(-1, 5, vec![f(), f()]);
        assert_eq!(
            cond,
            Condition::MofN {
                min: 0,
                max: 2,
                terms: vec![f(), f()]
            }
        );
        assert_eq!(cond.eval(&facts()), Ok(true));
    }

    #[test]
    fn test_not_passes_signals() {
        let ctx = facts();
        assert_eq!(Condition::negate(t()).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::negate(no_answer()).eval(&ctx),
            Err(EvalSignal::NoAnswer)
        );
        assert_eq!(
            Condition::negate(unknown()).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
    }

    #[test]
    fn test_numeric() {
        let ctx = facts();
        assert_eq!(Condition::NumGreater("temp".into(), 38.0).eval(&ctx), Ok(true));
        assert_eq!(Condition::NumLessEqual("temp".into(), 38.0).eval(&ctx), Ok(false));
        let range = Condition::NumIn {
            fact: "temp".into(),
            low: 36.0,
            high: 38.5,
        };
        assert_eq!(range.eval(&ctx), Ok(true));
        assert_eq!(Condition::NumLess("yes".into(), 1.0).eval(&ctx), Ok(false));
        assert_eq!(
            Condition::NumLess("unknown".into(), 1.0).eval(&ctx),
            Err(EvalSignal::UnknownValue)
        );
    }

    #[test]
    fn test_choices() {
        let ctx = Facts::default()
            .with("color", Value::Choices(vec!["red".into(), "green".into()]))
            .with("size", Value::Choice("small".into()));
        assert_eq!(Condition::choice("color", "green").eval(&ctx), Ok(true));
        assert_eq!(Condition::choice("size", "large").eval(&ctx), Ok(false));
        let any = Condition::AnyOf("size".into(), vec!["large".into(), "small".into()]);
        assert_eq!(any.eval(&ctx), Ok(true));
    }

    #[test]
    fn test_rated_defaults_to_unclear() {
        let ctx = Facts::default().with("flu", Rating::Established);
        assert_eq!(Condition::Rated("flu".into(), Rating::Established).eval(&ctx), Ok(true));
        assert_eq!(Condition::Rated("cold".into(), Rating::Unclear).eval(&ctx), Ok(true));
    }

    #[test]
    fn test_subjects_are_deduplicated() {
        let cond = Condition::And(vec![
            Condition::equal("a", 1i64),
            Condition::Or(vec![Condition::known("b"), Condition::known("a")]),
            Condition::exit_reached("sub", "done"),
            Condition::True,
        ]);
        assert_eq!(
            cond.subjects(),
            vec![
                Subject::fact("a"),
                Subject::fact("b"),
                Subject::Flow("sub".into())
            ]
        );
        assert!(cond.references(&Subject::fact("b")));
        assert!(!cond.references(&Subject::fact("c")));
    }

    #[test]
    fn test_condition_from_ron() {
        let cond: Condition =
            ron::from_str(r#"And([Equal("x", Int(1)), Not(Known("y"))])"#).unwrap();
        assert_eq!(
            cond,
            Condition::And(vec![
                Condition::equal("x", 1i64),
                Condition::negate(Condition::known("y")),
            ])
        );
    }
}
