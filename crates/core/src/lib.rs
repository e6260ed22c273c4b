//! constjump-core
//!
//! Core library for resolving indirect jumps and calls during binary CFG
//! recovery by running whole-function constant propagation and checking
//! whether the jump target folds to a single valid address.
//!
//! This crate defines the lifted IR (model), the propagation engine and its
//! result types (dataflow), the resolver chain and its strategies, and the
//! recovery driver that offers indirect jumps to the chain.
//!
//! The goal is to keep all substantive logic here so it is fully testable and
//! reusable from multiple frontends (CLI, other CFG builders, etc.).

pub mod config;
pub mod dataflow;
pub mod model;
pub mod services;

/// Returns the library version as encoded at compile time.
///
/// Useful for tests and for frontends to report consistent version info.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
