//! Identity types for facts, derivation sources and change subjects

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a terminology object (a question or a solution)
///
/// Uses a string-based ID so knowledge bases can refer to facts by name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FactId(pub String);

impl FactId {
    /// Create a new fact ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the ID as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for FactId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for FactId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Identifies one derivation source: a flow node inside one flow run
///
/// Two runs activating the same node contribute separate facts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub run: u64,
    pub node: u32,
}

impl SourceId {
    pub fn new(run: u64, node: u32) -> Self {
        Self { run, node }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run:{}/node:{}", self.run, self.node)
    }
}

/// Something whose change can invalidate a condition
///
/// Facts change through the store. Flows change when one of their exit
/// nodes is entered or left.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Subject {
    Fact(FactId),
    Flow(String),
}

impl Subject {
    pub fn fact(id: impl Into<FactId>) -> Self {
        Subject::Fact(id.into())
    }

    pub fn as_fact(&self) -> Option<&FactId> {
        match self {
            Subject::Fact(id) => Some(id),
            Subject::Flow(_) => None,
        }
    }
}

impl fmt::Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subject::Fact(id) => write!(f, "fact:{}", id),
            Subject::Flow(name) => write!(f, "flow:{}", name),
        }
    }
}

impl From<FactId> for Subject {
    fn from(id: FactId) -> Self {
        Subject::Fact(id)
    }
}
