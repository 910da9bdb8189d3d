//! Numeric formulas for derived values
//!
//! Action nodes use formulas to compute abstract values from answers. The
//! facts a formula reads make its node backward-dependent: the node is
//! re-run whenever one of them changes.

use crate::condition::EvalContext;
use crate::identity::FactId;
use crate::{Error, Result, Value};
use serde::{Deserialize, Serialize};

/// A numeric expression over facts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Formula {
    /// A literal number
    Lit(f64),
    /// Current numeric value of a fact
    Fact(FactId),
    Add(Box<Formula>, Box<Formula>),
    Sub(Box<Formula>, Box<Formula>),
    Mul(Box<Formula>, Box<Formula>),
    Div(Box<Formula>, Box<Formula>),
    Neg(Box<Formula>),
    Abs(Box<Formula>),
    Min(Box<Formula>, Box<Formula>),
    Max(Box<Formula>, Box<Formula>),
    Round(Box<Formula>),
    Floor(Box<Formula>),
    Ceil(Box<Formula>),
}

impl Formula {
    pub fn fact(id: impl Into<FactId>) -> Self {
        Formula::Fact(id.into())
    }

    /// Evaluate to a number
    pub fn eval<C: EvalContext + ?Sized>(&self, ctx: &C) -> Result<f64> {
        match self {
            Formula::Lit(n) => Ok(*n),
            Formula::Fact(id) => match ctx.value(id) {
                None => Err(Error::NoValue(id.clone())),
                Some(Value::Unknown) => Err(Error::UnknownInput(id.clone())),
                Some(value) => value.as_float().ok_or_else(|| Error::TypeError {
                    expected: "number".to_string(),
                    got: value.type_name().to_string(),
                }),
            },
            Formula::Add(a, b) => Ok(a.eval(ctx)? + b.eval(ctx)?),
            Formula::Sub(a, b) => Ok(a.eval(ctx)? - b.eval(ctx)?),
            Formula::Mul(a, b) => Ok(a.eval(ctx)? * b.eval(ctx)?),
            Formula::Div(a, b) => {
                let divisor = b.eval(ctx)?;
                if divisor == 0.0 {
                    return Err(Error::DivisionByZero);
                }
                Ok(a.eval(ctx)? / divisor)
            }
            Formula::Neg(a) => Ok(-a.eval(ctx)?),
            Formula::Abs(a) => Ok(a.eval(ctx)?.abs()),
            Formula::Min(a, b) => Ok(a.eval(ctx)?.min(b.eval(ctx)?)),
            Formula::Max(a, b) => Ok(a.eval(ctx)?.max(b.eval(ctx)?)),
            Formula::Round(a) => Ok(a.eval(ctx)?.round()),
            Formula::Floor(a) => Ok(a.eval(ctx)?.floor()),
            Formula::Ceil(a) => Ok(a.eval(ctx)?.ceil()),
        }
    }

    /// The facts this formula reads
    pub fn facts(&self) -> Vec<FactId> {
        let mut out = Vec::new();
        self.collect_facts(&mut out);
        out
    }

    fn collect_facts(&self, out: &mut Vec<FactId>) {
        match self {
            Formula::Lit(_) => {}
            Formula::Fact(id) => {
                if !out.contains(id) {
                    out.push(id.clone());
                }
            }
            Formula::Add(a, b)
            | Formula::Sub(a, b)
            | Formula::Mul(a, b)
            | Formula::Div(a, b)
            | Formula::Min(a, b)
            | Formula::Max(a, b) => {
                a.collect_facts(out);
                b.collect_facts(out);
            }
            Formula::Neg(a)
            | Formula::Abs(a)
            | Formula::Round(a)
            | Formula::Floor(a)
            | Formula::Ceil(a) => a.collect_facts(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct Facts(HashMap<FactId, Value>);

    impl EvalContext for Facts {
        fn value(&self, fact: &FactId) -> Option<&Value> {
            self.0.get(fact)
        }
    }

    fn ctx() -> Facts {
        let mut map = HashMap::new();
        map.insert(FactId::new("weight"), Value::Float(80.0));
        map.insert(FactId::new("height"), Value::Int(2));
        map.insert(FactId::new("name"), Value::Text("x".into()));
        map.insert(FactId::new("u"), Value::Unknown);
        Facts(map)
    }

    fn bmi() -> Formula {
        Formula::Div(
            Box::new(Formula::fact("weight")),
            Box::new(Formula::Mul(
                Box::new(Formula::fact("height")),
                Box::new(Formula::fact("height")),
            )),
        )
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(bmi().eval(&ctx()), Ok(20.0));
        let rounded = Formula::Round(Box::new(Formula::Lit(2.6)));
        assert_eq!(rounded.eval(&ctx()), Ok(3.0));
        let clamped = Formula::Min(Box::new(Formula::Lit(5.0)), Box::new(Formula::fact("height")));
        assert_eq!(clamped.eval(&ctx()), Ok(2.0));
    }

    #[test]
    fn test_missing_and_unknown_inputs() {
        assert_eq!(
            Formula::fact("age").eval(&ctx()),
            Err(Error::NoValue(FactId::new("age")))
        );
        assert_eq!(
            Formula::fact("u").eval(&ctx()),
            Err(Error::UnknownInput(FactId::new("u")))
        );
        assert!(matches!(
            Formula::fact("name").eval(&ctx()),
            Err(Error::TypeError { .. })
        ));
    }

    #[test]
    fn test_division_by_zero() {
        let f = Formula::Div(Box::new(Formula::Lit(1.0)), Box::new(Formula::Lit(0.0)));
        assert_eq!(f.eval(&ctx()), Err(Error::DivisionByZero));
    }

    #[test]
    fn test_read_set() {
        assert_eq!(bmi().facts(), vec![FactId::new("weight"), FactId::new("height")]);
    }
}
