//! Workflow graph: a transition table over [`Step`]s, the node functions,
//! and the engine that walks them.
//!
//! [`Step`]: adaptrag_core::types::Step

pub mod edge;
pub mod executor;
pub mod node;

pub use edge::{Edge, TransitionTable};
pub use executor::WorkflowEngine;
pub use node::{decide_to_generate, NodeOutput};
