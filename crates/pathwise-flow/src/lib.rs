//! Pathwise Flow - Flow-Graph Inference Engine
//!
//! This crate executes flow charts over the facts of a session: guarded edges
//! fire as answers arrive, nodes derive facts while they are active, and
//! checkpoint nodes freeze what has been derived so far.
//!
//! ## Architecture
//!
//! ```text
//! FlowSet (built once, shared read-only via Arc)
//!  │
//!  └── Session (one per consultation)
//!       ├── FactStore ← answers and derived facts (pathwise-core)
//!       └── FlowState
//!            └── FlowRun[] ← supports, fired edges, roots, blocked checkpoints
//! ```
//!
//! ## Key Components
//!
//! - [`FlowSetBuilder`]: builds and checks a [`FlowSet`] with its reverse indices
//! - [`Session`]: open/commit transactions, propagation to a fixpoint, introspection
//! - [`FlowRun`]: one live region of the graph; a node is active while it has a [`Support`]
//! - [`FlowConfig`]: suggest mode and propagation limits, loadable from RON
//!
//! ## Design Principles
//!
//! 1. **Supports decide activity** - enter and leave actions run once per transition
//! 2. **Changes settle first** - checkpoints are only taken once a batch reached its fixpoint
//! 3. **Graphs are immutable** - all mutable state lives in the session

pub mod action;
pub mod builder;
mod checkpoint;
pub mod config;
mod error;
pub mod explain;
pub mod graph;
mod propagation;
pub mod run;
mod session;
mod state;
mod strategy;
pub mod support;

pub use action::{Action, Assignment};
pub use builder::FlowSetBuilder;
pub use config::{FlowConfig, SuggestMode, DEFAULT_MAX_ROUNDS};
pub use error::{Error, Result};
pub use graph::{Edge, EdgeId, Flow, FlowId, FlowSet, Node, NodeId, NodeKind, RuleId, StartRule};
pub use run::{FlowRun, RunId};
pub use session::Session;
pub use state::FlowState;
pub use support::Support;
