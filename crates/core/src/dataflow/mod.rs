//! Constant propagation and the result types the resolvers query.
//!
//! This module provides:
//! - Program locations and abstract variables used as lookup keys
//! - Abstract values and the two-level replacement map
//! - The propagation engine contract and a worklist-based implementation
//! - Shared completed-function summaries and a per-function result cache

mod cache;
mod completed;
mod location;
mod propagator;
mod replacements;
mod value;

pub use cache::{fingerprint, PropagationCache};
pub use completed::{CompletedFunctions, FunctionSummary};
pub use location::{CodeLocation, Variable};
pub use propagator::{
    ConstPropagator, PropagationEngine, PropagationError, PropagatorOptions,
    DEFAULT_MAX_BLOCK_VISITS,
};
pub use replacements::ReplacementMap;
pub use value::AbstractValue;
