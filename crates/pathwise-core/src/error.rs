//! Error types for pathwise-core

use crate::identity::FactId;
use thiserror::Error;

/// Core error type
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("No value for fact: {0}")]
    NoValue(FactId),

    #[error("Fact answered unknown: {0}")]
    UnknownInput(FactId),

    #[error("Division by zero")]
    DivisionByZero,
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
