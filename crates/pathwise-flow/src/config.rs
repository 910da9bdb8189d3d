//! Flow engine configuration
//!
//! Controls whether the engine tracks still-open paths for interview
//! strategies, and how many propagation rounds one batch may take.

use crate::error::Result;
use serde::{Deserialize, Serialize};

/// Default bound on propagation rounds per batch
pub const DEFAULT_MAX_ROUNDS: usize = 1000;

/// How the engine tracks paths that may still open up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SuggestMode {
    /// No undefined edges, no suspected solutions
    #[default]
    Ignore,
    /// Suspect every solution behind an undefined edge
    Suggest,
    /// Like `Suggest`, but skip edges whose guard is already false
    Precise,
}

/// Configuration for a flow session
///
/// # Example
///
/// ```
/// use pathwise_flow::{FlowConfig, SuggestMode};
///
/// let config = FlowConfig::default();
/// assert_eq!(config.suggest_mode(), SuggestMode::Ignore);
///
/// let config = FlowConfig::from_ron_str("(suggest_mode: Precise, max_rounds: 50)").unwrap();
/// assert_eq!(config.suggest_mode(), SuggestMode::Precise);
/// assert_eq!(config.max_rounds(), 50);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowConfig {
    suggest_mode: SuggestMode,
    /// Clamped to at least 1
    max_rounds: usize,
}

impl FlowConfig {
    /// Create a configuration with the given suggest mode
    pub fn with_suggest_mode(suggest_mode: SuggestMode) -> Self {
        Self {
            suggest_mode,
            ..Self::default()
        }
    }

    /// Parse a configuration from RON; missing fields take their defaults
    pub fn from_ron_str(source: &str) -> Result<Self> {
        let mut config: FlowConfig = ron::from_str(source)?;
        config.max_rounds = config.max_rounds.max(1);
        Ok(config)
    }

    pub fn suggest_mode(&self) -> SuggestMode {
        self.suggest_mode
    }

    pub fn set_suggest_mode(&mut self, mode: SuggestMode) {
        self.suggest_mode = mode;
    }

    /// Whether undefined edges and suspected solutions are maintained
    pub fn tracks_open_paths(&self) -> bool {
        self.suggest_mode != SuggestMode::Ignore
    }

    pub fn max_rounds(&self) -> usize {
        self.max_rounds
    }

    /// Set the propagation round limit
    ///
    /// The value is clamped to at least 1.
    pub fn set_max_rounds(&mut self, n: usize) {
        self.max_rounds = n.max(1);
    }
}

impl Default for FlowConfig {
    fn default() -> Self {
        Self {
            suggest_mode: SuggestMode::Ignore,
            max_rounds: DEFAULT_MAX_ROUNDS,
        }
    }
}
