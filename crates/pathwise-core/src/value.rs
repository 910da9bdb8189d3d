//! Fact values
//!
//! A fact without any contribution has no value at all (`None` from the store).
//! `Value::Unknown` is different: the user explicitly answered "unknown".

use serde::{Deserialize, Serialize};
use std::fmt;

/// The value of a fact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Explicitly answered "unknown"
    Unknown,
    /// Yes/no answer
    Bool(bool),
    /// Integer answer
    Int(i64),
    /// Floating point answer
    Float(f64),
    /// Free text answer
    Text(String),
    /// Single selected choice
    Choice(String),
    /// Several selected choices
    Choices(Vec<String>),
    /// Rating of a solution
    Rating(Rating),
    /// Indication state of a question
    Indication(Indication),
}

/// Rating state of a solution, ordered from weakest to strongest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Rating {
    Excluded,
    Unclear,
    Suggested,
    Established,
}

impl Rating {
    /// Suggested or established
    pub fn is_positive(self) -> bool {
        matches!(self, Rating::Suggested | Rating::Established)
    }
}

/// Indication state of a question
///
/// The ordering ranks specificity: a more specific indication wins a merge.
/// `ContraIndicated` is handled separately and always wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Indication {
    Neutral,
    Indicated,
    RepeatedIndicated,
    InstantIndicated,
    ContraIndicated,
}

impl Indication {
    pub fn is_contra_indicated(self) -> bool {
        self == Indication::ContraIndicated
    }

    /// Any of the positive indication states
    pub fn is_relevant(self) -> bool {
        matches!(
            self,
            Indication::Indicated | Indication::RepeatedIndicated | Indication::InstantIndicated
        )
    }
}

impl Value {
    /// A single-choice answer
    pub fn choice(choice: impl Into<String>) -> Self {
        Value::Choice(choice.into())
    }

    /// Check if this value is the explicit "unknown" answer
    pub fn is_unknown(&self) -> bool {
        matches!(self, Value::Unknown)
    }

    /// Try to get this value as a boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get this value as an integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Try to get this value as a number (integers widen)
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Try to get this value as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Choice(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_rating(&self) -> Option<Rating> {
        match self {
            Value::Rating(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_indication(&self) -> Option<Indication> {
        match self {
            Value::Indication(i) => Some(*i),
            _ => None,
        }
    }

    /// Whether a choice is selected by this value
    ///
    /// Works for single and multiple choice answers.
    pub fn has_choice(&self, choice: &str) -> bool {
        match self {
            Value::Choice(c) => c == choice,
            Value::Choices(cs) => cs.iter().any(|c| c == choice),
            _ => false,
        }
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Unknown => "unknown",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Choice(_) => "choice",
            Value::Choices(_) => "choices",
            Value::Rating(_) => "rating",
            Value::Indication(_) => "indication",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Unknown => write!(f, "unknown"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(fl) => write!(f, "{}", fl),
            Value::Text(s) => write!(f, "\"{}\"", s),
            Value::Choice(c) => write!(f, "{}", c),
            Value::Choices(cs) => write!(f, "[{}]", cs.join(", ")),
            Value::Rating(r) => write!(f, "{:?}", r),
            Value::Indication(i) => write!(f, "{:?}", i),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<Rating> for Value {
    fn from(r: Rating) -> Self {
        Value::Rating(r)
    }
}

impl From<Indication> for Value {
    fn from(i: Indication) -> Self {
        Value::Indication(i)
    }
}
